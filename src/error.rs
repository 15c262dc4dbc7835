//! Error types for somamesh.
//!
//! Planning-stage failures surface as [`SomaError`]; geometric degeneracies and
//! simulation artifacts are handled locally and only logged.

use thiserror::Error;

/// Result type alias using [`SomaError`].
pub type Result<T> = std::result::Result<T, SomaError>;

/// Errors that can occur while building meshes or reconstructing a soma.
#[derive(Error, Debug)]
pub enum SomaError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has fewer than three distinct vertices.
    #[error("face {face} is degenerate (fewer than three distinct vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// The mesh or a face region has non-manifold topology.
    #[error("non-manifold topology: {details}")]
    NonManifold {
        /// Description of the non-manifold condition.
        details: String,
    },

    /// A directed edge is used by more than one face.
    #[error("edge ({v0}, {v1}) has more than two incident faces")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// The morphology cannot be reconstructed.
    #[error("invalid morphology '{label}': {reason}")]
    InvalidMorphology {
        /// Label of the offending morphology.
        label: String,
        /// What is wrong with it.
        reason: String,
    },

    /// More than one root was found where a single-rooted arbor is required.
    #[error("expected a single root for {kind} arbor, found {count}")]
    MultipleRoots {
        /// Arbor type name.
        kind: &'static str,
        /// Number of roots found.
        count: usize,
    },

    /// A face operation received an empty selection.
    #[error("face selection is empty")]
    EmptySelection,

    /// Operation is not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl SomaError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        SomaError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create an invalid morphology error.
    pub fn invalid_morphology(label: &str, reason: impl Into<String>) -> Self {
        SomaError::InvalidMorphology {
            label: label.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error signals bad input rather than a geometric fallback case.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SomaError::InvalidMorphology { .. }
                | SomaError::MultipleRoots { .. }
                | SomaError::InvalidParameter { .. }
        )
    }
}
