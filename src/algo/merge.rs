//! Merging face regions and reshaping faces into circles.

use std::collections::{HashSet, VecDeque};

use log::debug;
use nalgebra::{Point3, Vector3};

use super::check_face_ids;
use super::primitives::circle_points;
use crate::error::{Result, SomaError};
use crate::mesh::{build_from_polygons, compact, newell_normal, to_polygons, FaceId, HalfEdgeId, HalfEdgeMesh};

/// Dissolve the internal edges of a face region into a single polygon.
///
/// The region is the edge-connected component of the selection containing
/// `faces[0]`; other selected faces are left untouched. The merged face takes
/// the slot of the lowest face index in the region and interior vertices that
/// no longer belong to any face are removed.
///
/// # Errors
/// - [`SomaError::EmptySelection`] if `faces` is empty
/// - [`SomaError::NonManifold`] if the region is not a topological disk
///   (several boundary loops, a pinched boundary, or no boundary at all)
///
/// # Example
/// ```
/// use somamesh::algo::{create_icosphere, merge_faces_into_one_face};
/// use somamesh::mesh::VertexId;
///
/// let mut sphere = create_icosphere(1.0, 3).unwrap();
/// let fan: Vec<_> = sphere.vertex_faces(VertexId::new(0)).collect();
/// let merged = merge_faces_into_one_face(&mut sphere, &fan).unwrap();
/// assert_eq!(sphere.face_vertex_count(merged), 5);
/// assert_eq!(sphere.euler_characteristic(), 2);
/// ```
pub fn merge_faces_into_one_face(mesh: &mut HalfEdgeMesh, faces: &[FaceId]) -> Result<FaceId> {
    if faces.is_empty() {
        return Err(SomaError::EmptySelection);
    }
    check_face_ids(mesh, faces)?;

    let region = connected_region(mesh, faces);
    let target = region.iter().copied().min().unwrap_or(faces[0]);
    if region.len() == 1 {
        return Ok(target);
    }

    let in_region = |he: HalfEdgeId| {
        let f = mesh.face_of(he);
        f.is_valid() && region.contains(&f)
    };

    // Boundary half-edges of the region, in index order
    let boundary: Vec<HalfEdgeId> = mesh
        .halfedge_ids()
        .filter(|&he| in_region(he) && !in_region(mesh.twin(he)))
        .collect();

    let Some(&start) = boundary.first() else {
        return Err(SomaError::NonManifold {
            details: "merged region has no boundary".to_string(),
        });
    };

    let mut ring = Vec::with_capacity(boundary.len());
    let mut seen = HashSet::with_capacity(boundary.len());
    let mut he = start;
    loop {
        let v = mesh.origin(he);
        if !seen.insert(v) {
            return Err(SomaError::NonManifold {
                details: format!("merged region boundary is pinched at vertex {}", v.index()),
            });
        }
        ring.push(v.index());

        // Rotate around dest(he) through region faces to the next boundary edge
        let mut next = mesh.next(he);
        let mut guard = mesh.num_halfedges();
        while in_region(mesh.twin(next)) {
            next = mesh.next(mesh.twin(next));
            guard -= 1;
            if guard == 0 {
                return Err(SomaError::NonManifold {
                    details: "merged region boundary does not close".to_string(),
                });
            }
        }
        he = next;
        if he == start || ring.len() > boundary.len() {
            break;
        }
    }

    if ring.len() != boundary.len() {
        return Err(SomaError::NonManifold {
            details: format!(
                "merged region has {} boundary edges but its outer loop has {}",
                boundary.len(),
                ring.len()
            ),
        });
    }

    let (vertices, polygons) = to_polygons(mesh);
    if region_euler_characteristic(&polygons, &region) != 1 {
        return Err(SomaError::NonManifold {
            details: "merged region is not a disk".to_string(),
        });
    }

    let mut merged: Vec<Vec<usize>> = Vec::with_capacity(polygons.len() - region.len() + 1);
    for (fi, face) in polygons.into_iter().enumerate() {
        let f = FaceId::new(fi);
        if f == target {
            merged.push(ring.clone());
        } else if !region.contains(&f) {
            merged.push(face);
        }
    }

    let vertices = compact(&vertices, &mut merged);
    debug!(
        "merged {} faces into a {}-gon at face {}",
        region.len(),
        ring.len(),
        target.index()
    );
    *mesh = build_from_polygons(&vertices, &merged)?;
    Ok(target)
}

/// Edge-connected component of the selection containing `faces[0]`.
fn connected_region(mesh: &HalfEdgeMesh, faces: &[FaceId]) -> HashSet<FaceId> {
    let selected: HashSet<FaceId> = faces.iter().copied().collect();
    let mut region = HashSet::with_capacity(selected.len());
    let mut queue = VecDeque::from([faces[0]]);
    region.insert(faces[0]);

    while let Some(f) = queue.pop_front() {
        for he in mesh.face_halfedges(f) {
            let neighbour = mesh.face_of(mesh.twin(he));
            if neighbour.is_valid() && selected.contains(&neighbour) && region.insert(neighbour) {
                queue.push_back(neighbour);
            }
        }
    }
    region
}

fn region_euler_characteristic(polygons: &[Vec<usize>], region: &HashSet<FaceId>) -> i64 {
    let mut vertices = HashSet::new();
    let mut edges = HashSet::new();
    for f in region {
        let face = &polygons[f.index()];
        for i in 0..face.len() {
            let (a, b) = (face[i], face[(i + 1) % face.len()]);
            vertices.insert(a);
            edges.insert(if a < b { (a, b) } else { (b, a) });
        }
    }
    vertices.len() as i64 - edges.len() as i64 + region.len() as i64
}

/// Move a face's vertices onto a circle in the face's own plane.
///
/// The plane normal is the face's Newell normal. The first vertex keeps its
/// angular position and the rest are spaced evenly in winding order.
///
/// # Errors
/// - [`SomaError::InvalidParameter`] for an unknown face or non-positive radius
/// - [`SomaError::DegenerateFace`] if the face has no well-defined normal
pub fn convert_face_to_circle(
    mesh: &mut HalfEdgeMesh,
    face: FaceId,
    center: &Point3<f64>,
    radius: f64,
) -> Result<()> {
    check_face_ids(mesh, &[face])?;
    if !(radius > 0.0) {
        return Err(SomaError::invalid_param("radius", radius, "must be positive"));
    }

    let vertices: Vec<_> = mesh.face_vertices(face).collect();
    let positions = mesh.face_positions(face);
    let normal = newell_normal(&positions)
        .try_normalize(1e-300)
        .ok_or(SomaError::DegenerateFace { face: face.index() })?;

    let start: Vector3<f64> = positions[0] - center;
    let ring = circle_points(center, &normal, radius, vertices.len(), &start);
    for (v, p) in vertices.into_iter().zip(ring) {
        mesh.set_position(v, p);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::{create_icosphere, nearest_vertex_index};

    /// A 3x3 grid of unit quads in the XY plane.
    fn grid() -> HalfEdgeMesh {
        let mut vertices = Vec::new();
        for y in 0..4 {
            for x in 0..4 {
                vertices.push(Point3::new(x as f64, y as f64, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..3 {
            for x in 0..3 {
                let v = y * 4 + x;
                faces.push(vec![v, v + 1, v + 5, v + 4]);
            }
        }
        build_from_polygons(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_merge_two_quads() {
        let mut mesh = grid();
        let merged = merge_faces_into_one_face(&mut mesh, &[FaceId::new(1), FaceId::new(0)]).unwrap();

        assert_eq!(merged, FaceId::new(0));
        assert_eq!(mesh.num_faces(), 8);
        assert_eq!(mesh.face_vertex_count(merged), 6);
        assert!((mesh.face_area(merged) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_merge_removes_interior_vertex() {
        let mut mesh = grid();
        let all: Vec<FaceId> = mesh.face_ids().collect();
        let before = mesh.num_vertices();
        let merged = merge_faces_into_one_face(&mut mesh, &all).unwrap();

        assert_eq!(mesh.num_faces(), 1);
        assert_eq!(mesh.face_vertex_count(merged), 12);
        assert_eq!(mesh.num_vertices(), before - 4);
        assert!(mesh.face_normal(merged).z > 0.0);
    }

    #[test]
    fn test_merge_uses_component_of_first_face() {
        let mut mesh = grid();
        let merged =
            merge_faces_into_one_face(&mut mesh, &[FaceId::new(6), FaceId::new(7), FaceId::new(2)])
                .unwrap();
        assert_eq!(merged, FaceId::new(6));
        assert_eq!(mesh.num_faces(), 8);
        assert_eq!(mesh.face_vertex_count(FaceId::new(2)), 4);
    }

    #[test]
    fn test_merge_rejects_annulus() {
        let mut mesh = grid();
        let ring: Vec<FaceId> = mesh.face_ids().filter(|f| f.index() != 4).collect();
        let err = merge_faces_into_one_face(&mut mesh, &ring).unwrap_err();
        assert!(matches!(err, SomaError::NonManifold { .. }));
        assert_eq!(mesh.num_faces(), 9);
    }

    #[test]
    fn test_merge_rejects_pinch() {
        let mut mesh = grid();
        // A C-shaped strip around face 4 whose ends (3 and 7) touch at one corner.
        let strip: Vec<FaceId> = [0, 1, 2, 5, 8, 7, 3].into_iter().map(FaceId::new).collect();
        let err = merge_faces_into_one_face(&mut mesh, &strip).unwrap_err();
        assert!(matches!(err, SomaError::NonManifold { .. }));
    }

    #[test]
    fn test_merge_empty_selection() {
        let mut mesh = grid();
        assert!(matches!(
            merge_faces_into_one_face(&mut mesh, &[]),
            Err(SomaError::EmptySelection)
        ));
    }

    #[test]
    fn test_merge_on_sphere_keeps_topology() {
        let mut mesh = create_icosphere(1.0, 3).unwrap();
        let v = nearest_vertex_index(&mesh, &Point3::new(1.0, 0.0, 0.0)).unwrap();
        let mut region: Vec<FaceId> = mesh.vertex_faces(v).collect();
        region.extend(mesh.vertex_faces(v).collect::<Vec<_>>());
        let lowest = region.iter().copied().min().unwrap();
        let valence = mesh.valence(v);

        let merged = merge_faces_into_one_face(&mut mesh, &region).unwrap();
        assert_eq!(merged, lowest);
        assert_eq!(mesh.face_vertex_count(merged), valence);
        assert_eq!(mesh.euler_characteristic(), 2);
        assert!(mesh.is_closed());
        assert!(mesh.is_manifold());
    }

    #[test]
    fn test_convert_face_to_circle() {
        let mut mesh = grid();
        let merged = merge_faces_into_one_face(&mut mesh, &[FaceId::new(4)]).unwrap();
        let center = Point3::new(1.5, 1.5, 0.0);
        convert_face_to_circle(&mut mesh, merged, &center, 0.25).unwrap();

        let positions = mesh.face_positions(merged);
        for p in &positions {
            assert!(((p - center).norm() - 0.25).abs() < 1e-12);
            assert!(p.z.abs() < 1e-12);
        }
        // Evenly spaced: consecutive chord lengths are equal.
        let chord = (positions[1] - positions[0]).norm();
        for i in 1..positions.len() {
            let c = (positions[(i + 1) % positions.len()] - positions[i]).norm();
            assert!((c - chord).abs() < 1e-12);
        }
        assert!(mesh.face_normal(merged).z > 0.0);
    }

    #[test]
    fn test_convert_face_to_circle_rejects_radius() {
        let mut mesh = grid();
        let center = Point3::new(0.5, 0.5, 0.0);
        assert!(convert_face_to_circle(&mut mesh, FaceId::new(0), &center, 0.0).is_err());
    }
}
