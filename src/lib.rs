//! # somamesh
//!
//! Watertight soma meshes for skeletal neuron morphologies.
//!
//! A soma starts as an icosphere sized to the traced soma profile. One face per
//! soma-connected arbor is merged out of the faces around the arbor's root,
//! reshaped into a circle and dragged toward the root by a keyframed hook while
//! a mass-spring relaxation pulls the rest of the surface along. The relaxed
//! surface is baked into a static mesh that can be joined with arbor tubes and
//! spines into a full neuron mesh.
//!
//! ## Features
//!
//! - **Half-edge polygon mesh**: O(1) adjacency queries with type-safe indices
//! - **Morphology model**: arena-backed arbors of sections and samples
//! - **Local mesh edits**: subdivision, region merging and circle remapping
//! - **Deterministic relaxation**: the same inputs give bit-identical meshes
//! - **Batch reconstruction**: independent morphologies in parallel with rayon
//!
//! ## Quick Start
//!
//! ```
//! use somamesh::prelude::*;
//! use nalgebra::Point3;
//!
//! let soma = Soma::from_profile_points(vec![
//!     Point3::new(5.0, 0.0, 0.0),
//!     Point3::new(-5.0, 0.0, 0.0),
//!     Point3::new(0.0, 5.0, 0.0),
//!     Point3::new(0.0, -5.0, 0.0),
//! ])
//! .unwrap();
//!
//! let root = Section::from_points(
//!     1,
//!     SOMA_PARENT_ID,
//!     SectionType::BasalDendrite,
//!     &[(Point3::new(0.0, 0.0, 6.0), 0.8), (Point3::new(0.0, 0.0, 16.0), 0.4)],
//! )
//! .unwrap();
//! let mut morphology = Morphology::new("cell", soma).with_basal_dendrite(Arbor::from_root(root));
//! morphology.update_soma_connectivity(2.0);
//!
//! let options = SomaOptions::default().with_subdivision_level(3);
//! let soma_mesh = SomaBuilder::new(options).build(&mut morphology).unwrap();
//!
//! assert!(soma_mesh.mesh.is_closed());
//! assert_eq!(soma_mesh.mesh.euler_characteristic(), 2);
//! ```
//!
//! ## Working With Meshes
//!
//! ```
//! use somamesh::prelude::*;
//! use somamesh::algo::{create_icosphere, nearest_face_index};
//! use nalgebra::Point3;
//!
//! let mesh = create_icosphere(1.0, 2).unwrap();
//! assert_eq!(mesh.num_faces(), 80);
//!
//! let f = nearest_face_index(&mesh, &Point3::new(0.0, 0.0, 2.0)).unwrap();
//! assert!(mesh.face_normal(f).z > 0.9);
//!
//! for v in mesh.face_vertices(f) {
//!     assert!((mesh.position(v).coords.norm() - 1.0).abs() < 1e-12);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod assembly;
pub mod error;
pub mod mesh;
pub mod morphology;
pub mod soma;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use somamesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Result, SomaError};
    pub use crate::mesh::{
        build_from_polygons, build_from_triangles, FaceId, HalfEdgeId, HalfEdgeMesh, VertexId,
    };
    pub use crate::morphology::{
        Arbor, ExtraRootPolicy, Morphology, Sample, Section, SectionType, Soma, SOMA_PARENT_ID,
    };
    pub use crate::soma::{reconstruct_batch, SomaBuilder, SomaOptions, SomaProfile, StaticMesh};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::algo::{decimate, DecimateOptions};
    use crate::assembly::{AssemblyOptions, NeuronAssembler, PolylineTubeBuilder};
    use nalgebra::{Point3, Vector3};

    fn pyramidal(label: &str) -> Morphology {
        let profile = (0..12)
            .map(|i| {
                let t = i as f64 / 12.0 * std::f64::consts::TAU;
                Point3::new(6.0 * t.cos(), 6.0 * t.sin(), 0.5 * (2.0 * t).sin())
            })
            .collect();
        let soma = Soma::from_profile_points(profile).unwrap();

        let root = |id: usize, kind: SectionType, dir: Vector3<f64>, radius: f64| {
            let dir = dir.normalize();
            Section::from_points(
                id,
                SOMA_PARENT_ID,
                kind,
                &[
                    (Point3::from(dir * 7.0), radius),
                    (Point3::from(dir * 15.0), radius * 0.7),
                    (Point3::from(dir * 25.0), radius * 0.5),
                ],
            )
            .unwrap()
        };

        let sections = vec![
            root(1, SectionType::Axon, Vector3::new(0.0, 0.0, -1.0), 0.6),
            root(2, SectionType::ApicalDendrite, Vector3::new(0.0, 0.2, 1.0), 1.5),
            root(3, SectionType::BasalDendrite, Vector3::new(1.0, 0.0, 0.0), 0.9),
            root(4, SectionType::BasalDendrite, Vector3::new(-1.0, 0.3, 0.0), 0.9),
        ];
        let mut morphology = Morphology::from_sections(label, soma, sections, ExtraRootPolicy::Reject).unwrap();
        morphology.update_soma_connectivity(2.0);
        morphology
    }

    #[test]
    fn test_full_pipeline() {
        let mut morphology = pyramidal("pyr");
        let options = SomaOptions::default().with_subdivision_level(3);
        let soma = SomaBuilder::new(options).build(&mut morphology).unwrap();

        assert!(soma.mesh.is_closed());
        assert!(soma.mesh.is_manifold());
        assert_eq!(soma.mesh.euler_characteristic(), 2);
        assert_eq!(morphology.connected_arbor_count(), 4);
        for arbor in morphology.arbors() {
            assert!(arbor.root_section().soma_face_centroid.is_some());
        }

        let neuron = NeuronAssembler::new(PolylineTubeBuilder::default(), AssemblyOptions::default())
            .assemble(&morphology, &soma)
            .unwrap();
        assert!(neuron.mesh.num_faces() > soma.mesh.num_faces());
    }

    #[test]
    fn test_decimated_soma_stays_closed() {
        let mut morphology = pyramidal("pyr");
        let options = SomaOptions::default().with_subdivision_level(3);
        let soma = SomaBuilder::new(options).build(&mut morphology).unwrap();

        let mut mesh = soma.mesh.clone();
        let before = mesh.num_faces();
        decimate(&mut mesh, &DecimateOptions::with_target_ratio(0.5)).unwrap();
        assert!(mesh.num_faces() < before);
        assert!(mesh.is_closed());
        assert_eq!(mesh.euler_characteristic(), 2);
    }

    #[test]
    fn test_batch_matches_single_builds() {
        let options = SomaOptions::default().with_subdivision_level(3).with_steps(1, 70);
        let mut batch = vec![pyramidal("a"), pyramidal("b")];
        let results = reconstruct_batch(&mut batch, &options);

        let mut single = pyramidal("a");
        let expected = SomaBuilder::new(options).build(&mut single).unwrap();

        let first = results[0].as_ref().unwrap();
        assert_eq!(first.name, "a_soma");
        assert_eq!(first.mesh.positions(), expected.mesh.positions());
        assert!(results[1].is_ok());
    }
}
