//! Keyframed hooks that drag connection faces during relaxation.

use nalgebra::Point3;

use super::options::SomaOptions;
use super::planner::{ConnectionFace, ConnectionKind};
use crate::error::{Result, SomaError};
use crate::mesh::{HalfEdgeMesh, VertexId};

/// A control point of a hook trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    /// Simulation step of the control point.
    pub step: u32,
    /// Position of the hook center.
    pub position: Point3<f64>,
    /// Uniform scale of the bound vertices about the hook center.
    pub scale: f64,
}

impl Keyframe {
    /// Create a keyframe.
    pub fn new(step: u32, position: Point3<f64>, scale: f64) -> Self {
        Self { step, position, scale }
    }
}

/// Binds a set of surface vertices to a keyframed trajectory.
///
/// A bound vertex sits at `position(t) + scale(t) * (rest - bind_center)`.
#[derive(Debug, Clone)]
pub struct Hook {
    /// Bound vertices.
    pub vertex_indices: Vec<VertexId>,
    /// Center the rest positions are measured from.
    pub bind_center: Point3<f64>,
    /// Positions of the bound vertices when the hook was created.
    pub rest_positions: Vec<Point3<f64>>,
    /// Control points, sorted by strictly increasing step.
    pub keyframes: Vec<Keyframe>,
}

impl Hook {
    /// Create a hook.
    ///
    /// # Errors
    /// Returns [`SomaError::InvalidParameter`] if there are no keyframes, the
    /// steps are not strictly increasing, or vertex and rest counts differ.
    pub fn new(
        vertex_indices: Vec<VertexId>,
        rest_positions: Vec<Point3<f64>>,
        bind_center: Point3<f64>,
        keyframes: Vec<Keyframe>,
    ) -> Result<Self> {
        if keyframes.is_empty() {
            return Err(SomaError::invalid_param("keyframes", 0, "a hook needs at least one keyframe"));
        }
        if keyframes.windows(2).any(|w| w[0].step >= w[1].step) {
            return Err(SomaError::invalid_param(
                "keyframes",
                keyframes.len(),
                "steps must be strictly increasing",
            ));
        }
        if vertex_indices.len() != rest_positions.len() {
            return Err(SomaError::invalid_param(
                "rest_positions",
                rest_positions.len(),
                "must match the number of bound vertices",
            ));
        }

        Ok(Self {
            vertex_indices,
            bind_center,
            rest_positions,
            keyframes,
        })
    }

    /// Build the hook for a planned connection face.
    ///
    /// Branch hooks stretch, reach the arbor and then taper so the face ring
    /// ends with radius `extrusion_scale`. Profile hooks only stretch and reach.
    pub fn for_connection(surface: &HalfEdgeMesh, connection: &ConnectionFace, options: &SomaOptions) -> Result<Self> {
        let vertices: Vec<VertexId> = surface.face_vertices(connection.face).collect();
        let rest: Vec<Point3<f64>> = vertices.iter().map(|&v| *surface.position(v)).collect();
        let center = surface.face_centroid(connection.face);
        let normal = surface.face_normal(connection.face);
        let schedule = options.schedule;

        let mut keyframes = vec![
            Keyframe::new(schedule.stretch_step, center + normal * options.pre_stretch, 1.0),
            Keyframe::new(schedule.reach_step, connection.target, 1.0),
        ];

        if connection.kind == ConnectionKind::Arbor {
            let bind_radius = mean_distance(&rest, &center);
            let scale = if bind_radius > f64::EPSILON {
                connection.extrusion_scale / bind_radius
            } else {
                1.0
            };
            keyframes.push(Keyframe::new(schedule.taper_step, connection.target, scale));
        }

        Self::new(vertices, rest, center, keyframes)
    }

    /// Interpolated `(position, scale)` at `step`, clamped to the keyframe range.
    pub fn evaluate(&self, step: u32) -> (Point3<f64>, f64) {
        let (Some(first), Some(last)) = (self.keyframes.first(), self.keyframes.last()) else {
            return (self.bind_center, 1.0);
        };
        if step <= first.step {
            return (first.position, first.scale);
        }

        for pair in self.keyframes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if step <= b.step {
                let t = f64::from(step - a.step) / f64::from(b.step - a.step);
                let position = a.position + (b.position - a.position) * t;
                return (position, a.scale + (b.scale - a.scale) * t);
            }
        }

        (last.position, last.scale)
    }

    /// Positions of the bound vertices at `step`.
    pub fn targets(&self, step: u32) -> impl Iterator<Item = (VertexId, Point3<f64>)> + '_ {
        let (position, scale) = self.evaluate(step);
        self.vertex_indices
            .iter()
            .zip(&self.rest_positions)
            .map(move |(&v, rest)| (v, position + (rest - self.bind_center) * scale))
    }

    /// Mean distance of the rest positions from the bind center.
    pub fn bind_radius(&self) -> f64 {
        mean_distance(&self.rest_positions, &self.bind_center)
    }
}

fn mean_distance(points: &[Point3<f64>], center: &Point3<f64>) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| (p - center).norm()).sum::<f64>() / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::{convert_face_to_circle, create_icosphere};
    use crate::mesh::FaceId;
    use nalgebra::Vector3;

    fn hook() -> Hook {
        Hook::new(
            vec![VertexId::new(0), VertexId::new(1)],
            vec![Point3::new(1.0, 0.0, 0.0), Point3::new(-1.0, 0.0, 0.0)],
            Point3::origin(),
            vec![
                Keyframe::new(1, Point3::new(0.0, 0.0, 0.0), 1.0),
                Keyframe::new(50, Point3::new(0.0, 0.0, 49.0), 1.0),
                Keyframe::new(60, Point3::new(0.0, 0.0, 49.0), 0.5),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_evaluate_interpolates_and_clamps() {
        let h = hook();
        let (p, s) = h.evaluate(0);
        assert_eq!((p, s), (Point3::origin(), 1.0));

        let (p, s) = h.evaluate(25);
        assert!((p.z - 24.0).abs() < 1e-12);
        assert_eq!(s, 1.0);

        let (p, s) = h.evaluate(55);
        assert!((p.z - 49.0).abs() < 1e-12);
        assert!((s - 0.75).abs() < 1e-12);

        assert_eq!(h.evaluate(100), h.evaluate(60));
    }

    #[test]
    fn test_targets_scale_about_center() {
        let h = hook();
        let targets: Vec<_> = h.targets(60).collect();
        assert!((targets[0].1 - Point3::new(0.5, 0.0, 49.0)).norm() < 1e-12);
        assert!((targets[1].1 - Point3::new(-0.5, 0.0, 49.0)).norm() < 1e-12);
        assert!((h.bind_radius() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_unsorted_keyframes() {
        let keyframes = vec![
            Keyframe::new(10, Point3::origin(), 1.0),
            Keyframe::new(10, Point3::origin(), 1.0),
        ];
        assert!(Hook::new(vec![], vec![], Point3::origin(), keyframes).is_err());
        assert!(Hook::new(vec![], vec![], Point3::origin(), vec![]).is_err());
    }

    #[test]
    fn test_branch_hook_tapers_to_extrusion_scale() {
        let mut surface = create_icosphere(2.0, 2).unwrap();
        let face = FaceId::new(0);
        let center = surface.face_centroid(face);
        convert_face_to_circle(&mut surface, face, &center, 0.3).unwrap();

        let connection = ConnectionFace {
            section: None,
            face,
            centroid: center,
            normal: surface.face_normal(face),
            extrusion_scale: 0.1,
            target: Point3::from(center.coords * 2.0),
            kind: ConnectionKind::Arbor,
        };
        let options = SomaOptions::default();
        let h = Hook::for_connection(&surface, &connection, &options).unwrap();

        assert_eq!(h.keyframes.len(), 3);
        assert_eq!(h.keyframes[0].step, 1);
        let stretch: Vector3<f64> = h.keyframes[0].position - center;
        assert!((stretch.norm() - options.pre_stretch).abs() < 1e-12);

        for (_, p) in h.targets(options.schedule.taper_step) {
            assert!(((p - connection.target).norm() - 0.1).abs() < 1e-9);
        }
    }

    #[test]
    fn test_profile_hook_has_no_taper() {
        let surface = create_icosphere(2.0, 2).unwrap();
        let face = FaceId::new(3);
        let connection = ConnectionFace {
            section: None,
            face,
            centroid: surface.face_centroid(face),
            normal: surface.face_normal(face),
            extrusion_scale: 1.0,
            target: surface.face_centroid(face),
            kind: ConnectionKind::ProfilePoint,
        };
        let h = Hook::for_connection(&surface, &connection, &SomaOptions::default()).unwrap();
        assert_eq!(h.keyframes.len(), 2);
    }
}
