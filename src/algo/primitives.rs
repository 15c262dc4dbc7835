//! Primitive mesh construction: icospheres, circles and circle sampling.

use std::collections::HashMap;
use std::f64::consts::TAU;

use nalgebra::{Point3, Vector3};

use crate::error::{Result, SomaError};
use crate::mesh::{build_from_polygons, build_from_triangles, HalfEdgeMesh};

/// Create an icosphere of the given radius centered at the origin.
///
/// Level 1 is the icosahedron; every further level splits each triangle into
/// four and projects the new vertices onto the sphere, so level `n` has
/// `20 * 4^(n - 1)` faces.
///
/// # Errors
/// Returns [`SomaError::InvalidParameter`] for level 0 or a non-positive radius.
///
/// # Example
/// ```
/// use somamesh::algo::create_icosphere;
///
/// let sphere = create_icosphere(2.0, 3).unwrap();
/// assert_eq!(sphere.num_faces(), 320);
/// assert_eq!(sphere.euler_characteristic(), 2);
/// ```
pub fn create_icosphere(radius: f64, subdivision_level: u32) -> Result<HalfEdgeMesh> {
    if subdivision_level == 0 {
        return Err(SomaError::invalid_param(
            "subdivision_level",
            subdivision_level,
            "must be at least 1",
        ));
    }
    if !(radius > 0.0) || !radius.is_finite() {
        return Err(SomaError::invalid_param("radius", radius, "must be positive"));
    }

    let (mut vertices, mut faces) = icosahedron();
    for _ in 1..subdivision_level {
        faces = split_triangles(&mut vertices, &faces);
    }

    let vertices: Vec<Point3<f64>> = vertices
        .iter()
        .map(|v| Point3::from(v.normalize() * radius))
        .collect();
    build_from_triangles(&vertices, &faces)
}

/// Unit-direction icosahedron with outward counter-clockwise faces.
fn icosahedron() -> (Vec<Vector3<f64>>, Vec<[usize; 3]>) {
    let t = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let vertices = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .iter()
    .map(|&[x, y, z]| Vector3::new(x, y, z).normalize())
    .collect();

    let faces = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    (vertices, faces)
}

/// Split every triangle into four, adding one projected midpoint per edge.
fn split_triangles(vertices: &mut Vec<Vector3<f64>>, faces: &[[usize; 3]]) -> Vec<[usize; 3]> {
    let mut midpoints: HashMap<(usize, usize), usize> = HashMap::with_capacity(faces.len() * 3 / 2);
    let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Vector3<f64>>| -> usize {
        let key = if a < b { (a, b) } else { (b, a) };
        *midpoints.entry(key).or_insert_with(|| {
            let mid = ((vertices[a] + vertices[b]) * 0.5).normalize();
            vertices.push(mid);
            vertices.len() - 1
        })
    };

    let mut result = Vec::with_capacity(faces.len() * 4);
    for &[a, b, c] in faces {
        let ab = midpoint(a, b, vertices);
        let bc = midpoint(b, c, vertices);
        let ca = midpoint(c, a, vertices);
        result.push([a, ab, ca]);
        result.push([b, bc, ab]);
        result.push([c, ca, bc]);
        result.push([ab, bc, ca]);
    }
    result
}

/// Create a single planar n-gon in the XY plane around `location`.
///
/// The face normal is +Z and the first vertex lies on the +X side.
///
/// # Errors
/// Returns [`SomaError::InvalidParameter`] for fewer than three sides or a
/// non-positive radius.
pub fn create_circle(radius: f64, location: Point3<f64>, sides: usize) -> Result<HalfEdgeMesh> {
    if sides < 3 {
        return Err(SomaError::invalid_param("sides", sides, "must be at least 3"));
    }
    if !(radius > 0.0) {
        return Err(SomaError::invalid_param("radius", radius, "must be positive"));
    }

    let points = circle_points(&location, &Vector3::z(), radius, sides, &Vector3::x());
    let face: Vec<usize> = (0..sides).collect();
    build_from_polygons(&points, &[face])
}

/// Sample `sides` points evenly on a circle, counter-clockwise about `normal`.
///
/// The first point lies in the direction of `start` projected onto the circle's
/// plane. A `start` parallel to `normal` falls back to an arbitrary
/// perpendicular direction.
pub fn circle_points(
    center: &Point3<f64>,
    normal: &Vector3<f64>,
    radius: f64,
    sides: usize,
    start: &Vector3<f64>,
) -> Vec<Point3<f64>> {
    let n = normal
        .try_normalize(f64::EPSILON)
        .unwrap_or_else(Vector3::z);
    let u = (start - n * start.dot(&n))
        .try_normalize(1e-12)
        .unwrap_or_else(|| any_perpendicular(&n));
    let w = n.cross(&u);

    (0..sides)
        .map(|k| {
            let theta = TAU * k as f64 / sides as f64;
            center + (u * theta.cos() + w * theta.sin()) * radius
        })
        .collect()
}

/// A unit vector perpendicular to the unit vector `n`.
pub(crate) fn any_perpendicular(n: &Vector3<f64>) -> Vector3<f64> {
    let axis = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    n.cross(&axis).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::FaceId;

    #[test]
    fn test_icosahedron_level_one() {
        let mesh = create_icosphere(1.0, 1).unwrap();
        assert_eq!(mesh.num_vertices(), 12);
        assert_eq!(mesh.num_faces(), 20);
        assert_eq!(mesh.num_edges(), 30);
        assert!(mesh.is_closed());
        assert!(mesh.is_manifold());
    }

    #[test]
    fn test_icosphere_face_counts() {
        for level in 1..=4u32 {
            let mesh = create_icosphere(1.0, level).unwrap();
            assert_eq!(mesh.num_faces(), 20 * 4usize.pow(level - 1));
            assert_eq!(mesh.euler_characteristic(), 2);
        }
    }

    #[test]
    fn test_icosphere_on_sphere_and_outward() {
        let mesh = create_icosphere(3.5, 3).unwrap();
        for v in mesh.vertex_ids() {
            assert!((mesh.position(v).coords.norm() - 3.5).abs() < 1e-10);
        }
        for f in mesh.face_ids() {
            let c = mesh.face_centroid(f);
            assert!(mesh.face_normal(f).dot(&c.coords) > 0.0);
        }
    }

    #[test]
    fn test_icosphere_rejects_bad_input() {
        assert!(create_icosphere(1.0, 0).is_err());
        assert!(create_icosphere(0.0, 2).is_err());
        assert!(create_icosphere(-1.0, 2).is_err());
    }

    #[test]
    fn test_create_circle() {
        let location = Point3::new(1.0, 2.0, 3.0);
        let mesh = create_circle(2.0, location, 8).unwrap();
        assert_eq!(mesh.num_faces(), 1);
        assert_eq!(mesh.face_vertex_count(FaceId::new(0)), 8);
        assert!((mesh.face_normal(FaceId::new(0)) - Vector3::z()).norm() < 1e-12);
        for v in mesh.vertex_ids() {
            assert!(((mesh.position(v) - location).norm() - 2.0).abs() < 1e-12);
        }
        assert!(create_circle(1.0, location, 2).is_err());
    }

    #[test]
    fn test_circle_points_start_direction() {
        let center = Point3::new(0.0, 0.0, 1.0);
        let points = circle_points(&center, &Vector3::z(), 1.5, 4, &Vector3::new(0.0, 2.0, 5.0));
        assert!((points[0] - Point3::new(0.0, 1.5, 1.0)).norm() < 1e-12);
        assert!((points[1] - Point3::new(-1.5, 0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_circle_points_parallel_start() {
        let points = circle_points(&Point3::origin(), &Vector3::z(), 1.0, 6, &Vector3::z());
        assert_eq!(points.len(), 6);
        for p in &points {
            assert!(p.z.abs() < 1e-12);
            assert!((p.coords.norm() - 1.0).abs() < 1e-12);
        }
    }
}
