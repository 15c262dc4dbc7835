//! Spatial queries over mesh faces and vertices.

use nalgebra::Point3;

use crate::mesh::{FaceId, HalfEdgeMesh, VertexId};

/// How many of a face's vertices must fall inside the query sphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SphereSelection {
    /// At least one vertex inside.
    AnyVertex,
    /// Every vertex inside.
    AllVertices,
}

/// The face whose centroid is closest to `point`.
///
/// Ties resolve to the lowest face index. Returns `None` for a mesh without faces.
pub fn nearest_face_index(mesh: &HalfEdgeMesh, point: &Point3<f64>) -> Option<FaceId> {
    let mut best: Option<(FaceId, f64)> = None;
    for f in mesh.face_ids() {
        let d = (mesh.face_centroid(f) - point).norm_squared();
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((f, d));
        }
    }
    best.map(|(f, _)| f)
}

/// The vertex closest to `point`, ties resolving to the lowest index.
pub fn nearest_vertex_index(mesh: &HalfEdgeMesh, point: &Point3<f64>) -> Option<VertexId> {
    let mut best: Option<(VertexId, f64)> = None;
    for v in mesh.vertex_ids() {
        let d = (mesh.position(v) - point).norm_squared();
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((v, d));
        }
    }
    best.map(|(v, _)| v)
}

/// Faces with vertices inside the closed ball of `radius` around `center`.
///
/// The result is sorted by face index.
pub fn faces_intersecting_sphere(
    mesh: &HalfEdgeMesh,
    center: &Point3<f64>,
    radius: f64,
    selection: SphereSelection,
) -> Vec<FaceId> {
    let r2 = radius * radius;
    let inside = |v: VertexId| (mesh.position(v) - center).norm_squared() <= r2;

    mesh.face_ids()
        .filter(|&f| match selection {
            SphereSelection::AnyVertex => mesh.face_vertices(f).any(inside),
            SphereSelection::AllVertices => mesh.face_vertices(f).all(inside),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::build_from_polygons;

    /// Two unit squares side by side along +X.
    fn strip() -> HalfEdgeMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
        ];
        build_from_polygons(&vertices, &[vec![0, 1, 4, 3], vec![1, 2, 5, 4]]).unwrap()
    }

    #[test]
    fn test_nearest_face() {
        let mesh = strip();
        assert_eq!(nearest_face_index(&mesh, &Point3::new(1.8, 0.5, 1.0)), Some(FaceId::new(1)));
        // Equidistant from both centroids.
        assert_eq!(nearest_face_index(&mesh, &Point3::new(1.0, 0.5, 0.0)), Some(FaceId::new(0)));
    }

    #[test]
    fn test_nearest_vertex() {
        let mesh = strip();
        assert_eq!(nearest_vertex_index(&mesh, &Point3::new(2.1, 1.2, 0.0)), Some(VertexId::new(5)));
        assert_eq!(nearest_vertex_index(&mesh, &Point3::new(0.5, 0.0, 0.0)), Some(VertexId::new(0)));
    }

    #[test]
    fn test_sphere_selection_modes() {
        let mesh = strip();
        let center = Point3::new(0.0, 0.0, 0.0);

        let any = faces_intersecting_sphere(&mesh, &center, 1.0, SphereSelection::AnyVertex);
        assert_eq!(any, vec![FaceId::new(0), FaceId::new(1)]);

        let all = faces_intersecting_sphere(&mesh, &center, 1.0, SphereSelection::AllVertices);
        assert!(all.is_empty());

        let all = faces_intersecting_sphere(&mesh, &center, 1.5, SphereSelection::AllVertices);
        assert_eq!(all, vec![FaceId::new(0)]);
    }
}
