//! Mesh construction utilities.
//!
//! Structural edits in this crate follow one idiom: export the mesh as
//! face-vertex lists, edit the lists, and rebuild the half-edge mesh. This module
//! provides both directions of that round trip plus the list-level helpers
//! (triangulation, compaction) the edits share.

use std::collections::{HashMap, HashSet};

use nalgebra::{Point3, Vector3};

use super::halfedge::{Face, HalfEdge, HalfEdgeMesh};
use super::index::{FaceId, HalfEdgeId, VertexId};
use crate::error::{Result, SomaError};

/// Build a half-edge mesh from vertices and polygon faces.
///
/// Each face is a list of at least three distinct vertex indices in
/// counter-clockwise order. Half-edge, face and boundary ordering depend only on
/// the input order, so identical input always yields an identical mesh.
///
/// # Errors
/// - [`SomaError::EmptyMesh`] if `faces` is empty
/// - [`SomaError::InvalidVertexIndex`] for out-of-range indices
/// - [`SomaError::DegenerateFace`] for faces with fewer than three or repeated vertices
/// - [`SomaError::NonManifoldEdge`] if a directed edge is used by two faces
///
/// # Example
/// ```
/// use somamesh::mesh::{build_from_polygons, FaceId, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(1.0, 1.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let mesh: HalfEdgeMesh = build_from_polygons(&vertices, &[vec![0, 1, 2, 3]]).unwrap();
/// assert_eq!(mesh.num_faces(), 1);
/// assert_eq!(mesh.face_vertex_count(FaceId::new(0)), 4);
/// ```
pub fn build_from_polygons(vertices: &[Point3<f64>], faces: &[Vec<usize>]) -> Result<HalfEdgeMesh> {
    if faces.is_empty() {
        return Err(SomaError::EmptyMesh);
    }

    for (fi, face) in faces.iter().enumerate() {
        if face.len() < 3 {
            return Err(SomaError::DegenerateFace { face: fi });
        }
        for (i, &vi) in face.iter().enumerate() {
            if vi >= vertices.len() {
                return Err(SomaError::InvalidVertexIndex { face: fi, vertex: vi });
            }
            if face[i + 1..].contains(&vi) {
                return Err(SomaError::DegenerateFace { face: fi });
            }
        }
    }

    let interior: usize = faces.iter().map(Vec::len).sum();
    let mut mesh = HalfEdgeMesh::with_capacity(vertices.len(), interior + interior / 8, faces.len());

    for &pos in vertices {
        mesh.add_vertex(pos);
    }

    // Directed edge (v0, v1) -> interior half-edge
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId> = HashMap::with_capacity(interior);

    // First pass: interior half-edges and faces
    for (fi, face) in faces.iter().enumerate() {
        let face_id = FaceId::new(fi);
        let base = mesh.num_halfedges();
        let n = face.len();

        mesh.faces.push(Face {
            halfedge: HalfEdgeId::new(base),
        });

        for i in 0..n {
            let v0 = face[i];
            let v1 = face[(i + 1) % n];
            let he = HalfEdgeId::new(base + i);

            mesh.halfedges.push(HalfEdge {
                origin: VertexId::new(v0),
                twin: HalfEdgeId::invalid(),
                next: HalfEdgeId::new(base + (i + 1) % n),
                prev: HalfEdgeId::new(base + (i + n - 1) % n),
                face: face_id,
            });
            mesh.vertices[v0].halfedge = he;

            if edge_map.insert((v0, v1), he).is_some() {
                return Err(SomaError::NonManifoldEdge { v0, v1 });
            }
        }
    }

    // Second pass: link twins in creation order, adding boundary half-edges
    for hi in 0..interior {
        let he = HalfEdgeId::new(hi);
        let v0 = mesh.origin(he).index();
        let v1 = mesh.origin(mesh.next(he)).index();

        if let Some(&twin) = edge_map.get(&(v1, v0)) {
            mesh.halfedge_mut(he).twin = twin;
        } else {
            let boundary = HalfEdgeId::new(mesh.num_halfedges());
            mesh.halfedges.push(HalfEdge {
                origin: VertexId::new(v1),
                twin: he,
                ..HalfEdge::default()
            });
            mesh.halfedge_mut(he).twin = boundary;
        }
    }

    link_boundary_loops(&mut mesh, interior);
    fix_boundary_vertex_halfedges(&mut mesh);

    Ok(mesh)
}

/// Build a half-edge mesh from vertices and triangle faces.
pub fn build_from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<HalfEdgeMesh> {
    let polygons: Vec<Vec<usize>> = faces.iter().map(|f| f.to_vec()).collect();
    build_from_polygons(vertices, &polygons)
}

/// Link boundary half-edges (stored after `first_boundary`) into loops.
fn link_boundary_loops(mesh: &mut HalfEdgeMesh, first_boundary: usize) {
    let mut outgoing: HashMap<usize, HalfEdgeId> = HashMap::new();
    for hi in first_boundary..mesh.num_halfedges() {
        let he = HalfEdgeId::new(hi);
        outgoing.entry(mesh.origin(he).index()).or_insert(he);
    }

    for hi in first_boundary..mesh.num_halfedges() {
        let he = HalfEdgeId::new(hi);
        let dest = mesh.dest(he).index();
        if let Some(&next_he) = outgoing.get(&dest) {
            mesh.halfedge_mut(he).next = next_he;
            mesh.halfedge_mut(next_he).prev = he;
        }
    }
}

/// Ensure boundary vertices point to a boundary half-edge.
fn fix_boundary_vertex_halfedges(mesh: &mut HalfEdgeMesh) {
    for vid in 0..mesh.num_vertices() {
        let v = VertexId::new(vid);
        let boundary = mesh
            .vertex_halfedges(v)
            .find(|&he| mesh.is_boundary_halfedge(he));
        if let Some(he) = boundary {
            mesh.vertex_mut(v).halfedge = he;
        }
    }
}

/// Convert a half-edge mesh back to a face-vertex representation.
///
/// Returns `(vertices, faces)`; the face list preserves face order and winding.
pub fn to_polygons(mesh: &HalfEdgeMesh) -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
    let vertices = mesh.positions();
    let faces = mesh
        .face_ids()
        .map(|f| mesh.face_vertices(f).map(|v| v.index()).collect())
        .collect();
    (vertices, faces)
}

/// Triangulate polygon faces. Triangles pass through unchanged.
///
/// A polygon is fanned from its first corner whose diagonals are not already
/// edges of the mesh or of an earlier fan. When no corner qualifies the
/// polygon is fanned around a new centroid vertex appended to `vertices`.
pub fn triangulate(vertices: &mut Vec<Point3<f64>>, faces: &[Vec<usize>]) -> Vec<[usize; 3]> {
    let mut edges: HashSet<(usize, usize)> = HashSet::new();
    for face in faces {
        for (i, &v) in face.iter().enumerate() {
            edges.insert(undirected(v, face[(i + 1) % face.len()]));
        }
    }

    let mut triangles = Vec::with_capacity(faces.len() * 2);
    for face in faces {
        let n = face.len();
        if n < 3 {
            continue;
        }

        let corner = |apex: usize, k: usize| face[(apex + k) % n];
        let apex = (0..n).find(|&a| (2..n - 1).all(|k| !edges.contains(&undirected(face[a], corner(a, k)))));

        match apex {
            Some(a) => {
                for k in 2..n - 1 {
                    edges.insert(undirected(face[a], corner(a, k)));
                }
                for k in 1..n - 1 {
                    triangles.push([face[a], corner(a, k), corner(a, k + 1)]);
                }
            }
            None => {
                let sum = face.iter().fold(Vector3::zeros(), |acc, &v| acc + vertices[v].coords);
                let center = vertices.len();
                vertices.push(Point3::from(sum / n as f64));
                for k in 0..n {
                    triangles.push([face[k], corner(k, 1), center]);
                }
            }
        }
    }
    triangles
}

#[inline]
fn undirected(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Remove vertices no face references and remap face indices.
///
/// Surviving vertices keep their relative order.
pub fn compact(vertices: &[Point3<f64>], faces: &mut [Vec<usize>]) -> Vec<Point3<f64>> {
    let mut used = vec![false; vertices.len()];
    for face in faces.iter() {
        for &v in face {
            used[v] = true;
        }
    }

    let mut remap = vec![usize::MAX; vertices.len()];
    let mut kept = Vec::with_capacity(vertices.len());
    for (i, p) in vertices.iter().enumerate() {
        if used[i] {
            remap[i] = kept.len();
            kept.push(*p);
        }
    }

    for face in faces.iter_mut() {
        for v in face.iter_mut() {
            *v = remap[*v];
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
        (vertices, faces)
    }

    fn cube() -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let faces = vec![
            vec![0, 3, 2, 1],
            vec![4, 5, 6, 7],
            vec![0, 1, 5, 4],
            vec![1, 2, 6, 5],
            vec![2, 3, 7, 6],
            vec![3, 0, 4, 7],
        ];
        (vertices, faces)
    }

    #[test]
    fn test_closed_tetrahedron() {
        let (vertices, faces) = tetrahedron();
        let mesh = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_halfedges(), 12);
        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        assert!(mesh.is_manifold());
        assert_eq!(mesh.euler_characteristic(), 2);
    }

    #[test]
    fn test_closed_cube_of_quads() {
        let (vertices, faces) = cube();
        let mesh = build_from_polygons(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_edges(), 12);
        assert!(mesh.is_closed());
        assert_eq!(mesh.euler_characteristic(), 2);
        assert!(!mesh.is_triangle_mesh());

        let f = FaceId::new(1);
        assert!((mesh.face_area(f) - 1.0).abs() < 1e-12);
        assert!((mesh.face_normal(f).z - 1.0).abs() < 1e-12);
        let c = mesh.face_centroid(f);
        assert!((c - Point3::new(0.5, 0.5, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_open_polygon_has_boundary_loop() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(-0.5, 0.5, 0.0),
        ];
        let mesh = build_from_polygons(&vertices, &[vec![0, 1, 2, 3, 4]]).unwrap();

        assert_eq!(mesh.num_halfedges(), 10);
        assert!(mesh.is_valid());
        assert!(!mesh.is_closed());
        assert!(mesh.vertex_ids().all(|v| mesh.is_boundary_vertex(v)));
        assert_eq!(mesh.euler_characteristic(), 1);
    }

    #[test]
    fn test_rejects_degenerate_and_out_of_range() {
        let (vertices, _) = tetrahedron();
        assert!(matches!(
            build_from_polygons(&vertices, &[vec![0, 1]]),
            Err(SomaError::DegenerateFace { face: 0 })
        ));
        assert!(matches!(
            build_from_polygons(&vertices, &[vec![0, 1, 0]]),
            Err(SomaError::DegenerateFace { face: 0 })
        ));
        assert!(matches!(
            build_from_polygons(&vertices, &[vec![0, 1, 9]]),
            Err(SomaError::InvalidVertexIndex { face: 0, vertex: 9 })
        ));
        assert!(matches!(build_from_polygons(&vertices, &[]), Err(SomaError::EmptyMesh)));
    }

    #[test]
    fn test_rejects_duplicated_directed_edge() {
        let (vertices, _) = tetrahedron();
        let faces = vec![vec![0, 1, 2], vec![0, 1, 3]];
        assert!(matches!(
            build_from_polygons(&vertices, &faces),
            Err(SomaError::NonManifoldEdge { v0: 0, v1: 1 })
        ));
    }

    #[test]
    fn test_polygon_roundtrip_preserves_order() {
        let (vertices, faces) = cube();
        let mesh = build_from_polygons(&vertices, &faces).unwrap();
        let (out_vertices, out_faces) = to_polygons(&mesh);

        assert_eq!(out_vertices, vertices);
        assert_eq!(out_faces, faces);
    }

    #[test]
    fn test_triangulate_fans_polygons() {
        let mut vertices = vec![Point3::origin(); 8];
        let triangles = triangulate(&mut vertices, &[vec![0, 1, 2, 3, 4], vec![5, 6, 7]]);
        assert_eq!(triangles, vec![[0, 1, 2], [0, 2, 3], [0, 3, 4], [5, 6, 7]]);
        assert_eq!(vertices.len(), 8);
    }

    #[test]
    fn test_triangulate_avoids_existing_chord() {
        // Hexagon 0..6 whose corners 0 and 3 are already joined through apex 6.
        let mut vertices: Vec<Point3<f64>> = (0..6)
            .map(|i| {
                let t = i as f64 / 6.0 * std::f64::consts::TAU;
                Point3::new(t.cos(), t.sin(), 0.0)
            })
            .collect();
        vertices.push(Point3::new(0.0, 0.0, 1.0));
        let faces = vec![vec![0, 1, 2, 3, 4, 5], vec![3, 0, 6]];

        let triangles = triangulate(&mut vertices, &faces);
        assert_eq!(triangles.len(), 5);
        assert_eq!(triangles[0], [1, 2, 3]);
        let chords = triangles[..4]
            .iter()
            .flat_map(|t| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])])
            .filter(|&(a, b)| undirected(a, b) == (0, 3))
            .count();
        assert_eq!(chords, 0);
    }

    #[test]
    fn test_triangulate_centroid_fan_when_every_corner_is_chorded() {
        // Square whose both diagonals already exist as edges.
        let mut vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        let faces = vec![vec![0, 1, 2, 3], vec![0, 2, 4], vec![1, 3, 4]];

        let triangles = triangulate(&mut vertices, &faces);
        assert_eq!(vertices.len(), 6);
        assert!((vertices[5] - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
        assert_eq!(&triangles[..4], &[[0, 1, 5], [1, 2, 5], [2, 3, 5], [3, 0, 5]]);
    }

    #[test]
    fn test_compact_drops_unreferenced_vertices() {
        let vertices: Vec<Point3<f64>> = (0..5).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let mut faces = vec![vec![4, 2, 0]];
        let kept = compact(&vertices, &mut faces);

        assert_eq!(kept.len(), 3);
        assert_eq!(faces, vec![vec![2, 1, 0]]);
        assert_eq!(kept[2].x, 4.0);
    }
}
