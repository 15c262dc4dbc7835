//! Tube meshes swept along section polylines.

use nalgebra::{Point3, Vector3};

use crate::algo::circle_points;
use crate::algo::primitives::any_perpendicular;
use crate::error::{Result, SomaError};
use crate::mesh::{build_from_polygons, HalfEdgeMesh};
use crate::morphology::{Arbor, Section};

/// Rings never get thinner than this, so zero-radius samples stay non-degenerate.
const MIN_TUBE_RADIUS: f64 = 1e-4;

/// Turns a section into a surface mesh.
pub trait TubeBuilder: Send + Sync {
    /// Build the tube of one section with `sides` vertices per cross-section.
    fn build_tube(&self, section: &Section, sides: usize) -> Result<HalfEdgeMesh>;

    /// Build the tubes of every section of an arbor, depth first.
    fn build_arbor(&self, arbor: &Arbor, sides: usize) -> Result<Vec<HalfEdgeMesh>> {
        arbor
            .iter_depth_first()
            .map(|section| self.build_tube(section, sides))
            .collect()
    }
}

/// Sweeps a ring of sample radius around every sample and joins consecutive
/// rings with quads.
///
/// Ring orientation is carried from one sample to the next, so tubes do not
/// twist around bends.
#[derive(Debug, Clone, Copy)]
pub struct PolylineTubeBuilder {
    /// Close both ends with an n-gon.
    pub caps: bool,
}

impl Default for PolylineTubeBuilder {
    fn default() -> Self {
        Self { caps: true }
    }
}

impl PolylineTubeBuilder {
    /// Create a builder.
    pub fn new(caps: bool) -> Self {
        Self { caps }
    }
}

impl TubeBuilder for PolylineTubeBuilder {
    fn build_tube(&self, section: &Section, sides: usize) -> Result<HalfEdgeMesh> {
        if sides < 3 {
            return Err(SomaError::invalid_param("sides", sides, "must be at least 3"));
        }

        let samples = section.samples();
        let points: Vec<Point3<f64>> = samples.iter().map(|s| s.point).collect();
        let tangents = tangents(&points).ok_or_else(|| {
            SomaError::invalid_param("section", section.id, "all samples coincide")
        })?;

        let mut vertices = Vec::with_capacity(samples.len() * sides);
        let mut start = any_perpendicular(&tangents[0]);
        for (sample, tangent) in samples.iter().zip(&tangents) {
            let ring = circle_points(&sample.point, tangent, sample.radius.max(MIN_TUBE_RADIUS), sides, &start);
            start = ring[0] - sample.point;
            vertices.extend(ring);
        }

        let rings = samples.len();
        let mut faces: Vec<Vec<usize>> = Vec::with_capacity((rings - 1) * sides + 2);
        for r in 0..rings - 1 {
            let a = r * sides;
            let b = a + sides;
            for j in 0..sides {
                let k = (j + 1) % sides;
                faces.push(vec![a + j, a + k, b + k, b + j]);
            }
        }
        if self.caps {
            faces.push((0..sides).rev().collect());
            let last = (rings - 1) * sides;
            faces.push((last..last + sides).collect());
        }

        build_from_polygons(&vertices, &faces)
    }
}

/// Unit tangent per point: segment direction at the ends, the bisector of the
/// adjacent segments inside.
fn tangents(points: &[Point3<f64>]) -> Option<Vec<Vector3<f64>>> {
    let segments: Vec<Vector3<f64>> = points
        .windows(2)
        .map(|w| (w[1] - w[0]).try_normalize(f64::EPSILON))
        .collect::<Option<_>>()?;

    let mut result = Vec::with_capacity(points.len());
    result.push(segments[0]);
    for pair in segments.windows(2) {
        let t = (pair[0] + pair[1]).try_normalize(f64::EPSILON).unwrap_or(pair[1]);
        result.push(t);
    }
    result.push(segments[segments.len() - 1]);
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::{SectionType, SOMA_PARENT_ID};

    fn bent_section() -> Section {
        Section::from_points(
            4,
            SOMA_PARENT_ID,
            SectionType::ApicalDendrite,
            &[
                (Point3::new(0.0, 0.0, 0.0), 1.0),
                (Point3::new(0.0, 0.0, 5.0), 0.8),
                (Point3::new(3.0, 0.0, 8.0), 0.5),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_capped_tube_is_closed() {
        let mesh = PolylineTubeBuilder::default().build_tube(&bent_section(), 8).unwrap();
        assert_eq!(mesh.num_vertices(), 24);
        assert_eq!(mesh.num_faces(), 2 * 8 + 2);
        assert!(mesh.is_closed());
        assert_eq!(mesh.euler_characteristic(), 2);
    }

    #[test]
    fn test_open_tube_and_radii() {
        let section = bent_section();
        let mesh = PolylineTubeBuilder::new(false).build_tube(&section, 6).unwrap();
        assert!(!mesh.is_closed());

        for (i, sample) in section.samples().iter().enumerate() {
            for j in 0..6 {
                let p = mesh.position(crate::mesh::VertexId::new(i * 6 + j));
                assert!(((p - sample.point).norm() - sample.radius).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_normals_point_outward() {
        let mesh = PolylineTubeBuilder::default().build_tube(&bent_section(), 8).unwrap();
        let first = mesh.face_ids().next().unwrap();
        let c = mesh.face_centroid(first);
        // first quad lies on the straight segment along +z
        let radial = Vector3::new(c.x, c.y, 0.0);
        assert!(mesh.face_normal(first).dot(&radial) > 0.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        let builder = PolylineTubeBuilder::default();
        assert!(builder.build_tube(&bent_section(), 2).is_err());

        let p = Point3::new(1.0, 1.0, 1.0);
        let collapsed = Section::from_points(1, SOMA_PARENT_ID, SectionType::Axon, &[(p, 1.0), (p, 1.0)]).unwrap();
        assert!(builder.build_tube(&collapsed, 6).is_err());
    }
}
