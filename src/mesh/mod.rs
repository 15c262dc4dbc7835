//! Core mesh data structures.
//!
//! This module provides the half-edge polygon mesh used both as the deformable
//! soma surface and as the static output mesh.
//!
//! # Overview
//!
//! [`HalfEdgeMesh`] stores vertices, half-edges and faces with full connectivity,
//! giving O(1) adjacency queries. Faces are arbitrary simple polygons: the soma
//! surface starts as an all-triangle icosphere and gains n-gon connection faces
//! during planning.
//!
//! Elements are addressed by u32 newtypes ([`VertexId`], [`HalfEdgeId`],
//! [`FaceId`]) so ids of different kinds cannot be mixed up.
//!
//! # Editing
//!
//! Structural edits do not patch links in place. They export the face loops,
//! change the lists and rebuild:
//!
//! ```
//! use somamesh::mesh::{build_from_polygons, to_polygons};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let quad = build_from_polygons(&vertices, &[vec![0, 1, 2, 3]]).unwrap();
//! assert_eq!(quad.face_vertex_count(quad.face_ids().next().unwrap()), 4);
//!
//! let (positions, mut faces) = to_polygons(&quad);
//! faces = vec![vec![faces[0][0], faces[0][1], faces[0][2]], vec![faces[0][0], faces[0][2], faces[0][3]]];
//! let split = build_from_polygons(&positions, &faces).unwrap();
//! assert!(split.is_triangle_mesh());
//! assert!(!split.is_closed());
//! ```

mod builder;
mod halfedge;
mod index;

pub use builder::{build_from_polygons, build_from_triangles, compact, to_polygons, triangulate};
pub(crate) use halfedge::newell_normal;
pub use halfedge::{Face, FaceHalfEdgeIter, HalfEdge, HalfEdgeMesh, Vertex, VertexHalfEdgeIter};
pub use index::{FaceId, HalfEdgeId, VertexId};
