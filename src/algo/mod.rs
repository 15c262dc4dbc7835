//! Geometric operations on polygon meshes.
//!
//! - **Primitives**: icospheres, circles, circle sampling
//! - **Queries**: nearest face/vertex, faces inside a sphere
//! - **Local edits**: face subdivision, region merging, circle remapping
//! - **Post-processing**: QEM decimation, seeded surface roughness
//!
//! Structural edits follow the same idiom throughout: export the mesh as
//! face-vertex lists, edit the lists, rebuild the half-edge mesh.

pub mod decimate;
pub mod merge;
pub mod primitives;
pub mod progress;
pub mod query;
pub mod roughness;
pub mod subdivide;

pub use decimate::{decimate, DecimateOptions};
pub use merge::{convert_face_to_circle, merge_faces_into_one_face};
pub use primitives::{circle_points, create_circle, create_icosphere};
pub use progress::{CancelToken, Progress};
pub use query::{faces_intersecting_sphere, nearest_face_index, nearest_vertex_index, SphereSelection};
pub use roughness::{add_surface_roughness, RoughnessOptions};
pub use subdivide::subdivide_faces;

use crate::error::{Result, SomaError};
use crate::mesh::{FaceId, HalfEdgeMesh};

/// Reject face ids that do not exist in `mesh`.
pub(crate) fn check_face_ids(mesh: &HalfEdgeMesh, faces: &[FaceId]) -> Result<()> {
    match faces
        .iter()
        .find(|f| !f.is_valid() || f.index() >= mesh.num_faces())
    {
        Some(f) => Err(SomaError::invalid_param("face", f.index(), "no such face")),
        None => Ok(()),
    }
}
