//! Skeletal neuron morphology: soma, arbors, sections and samples.
//!
//! A [`Morphology`] owns its arbors. Each [`Arbor`] is an arena of
//! [`Section`]s whose parent/child links are indices into that arena, so the
//! tree never holds references into itself.
//!
//! # Example
//!
//! ```
//! use somamesh::morphology::{Morphology, Section, SectionType, Soma, SOMA_PARENT_ID};
//! use somamesh::morphology::ExtraRootPolicy;
//! use nalgebra::Point3;
//!
//! let soma = Soma::from_profile_points(vec![
//!     Point3::new(5.0, 0.0, 0.0),
//!     Point3::new(-5.0, 0.0, 0.0),
//!     Point3::new(0.0, 5.0, 0.0),
//!     Point3::new(0.0, -5.0, 0.0),
//! ]).unwrap();
//!
//! let axon = Section::from_points(1, SOMA_PARENT_ID, SectionType::Axon, &[
//!     (Point3::new(6.0, 0.0, 0.0), 1.0),
//!     (Point3::new(20.0, 0.0, 0.0), 0.5),
//! ]).unwrap();
//!
//! let mut morphology =
//!     Morphology::from_sections("cell", soma, vec![axon], ExtraRootPolicy::Reject).unwrap();
//! morphology.update_soma_connectivity(2.0);
//! assert!(morphology.axon.as_ref().unwrap().is_connected_to_soma());
//! ```

mod arbor;
mod section;
mod soma;
pub mod tree;

pub use arbor::{Arbor, DepthFirstIter};
pub use section::{Sample, Section, SectionType, SOMA_PARENT_ID};
pub use soma::Soma;
pub use tree::{build_multiple_arbors, build_single_arbor, build_tree, ExtraRootPolicy, SingleArbor};

use log::{debug, info};

use crate::error::{Result, SomaError};

/// A neuron skeleton: one soma plus its arbors.
#[derive(Debug, Clone)]
pub struct Morphology {
    /// Name used in logs, errors and output mesh names.
    pub label: String,
    /// The cell body.
    pub soma: Soma,
    /// The axon, if traced.
    pub axon: Option<Arbor>,
    /// The apical dendrite, if traced.
    pub apical_dendrite: Option<Arbor>,
    /// Basal dendrites, in source order.
    pub basal_dendrites: Vec<Arbor>,
}

impl Morphology {
    /// Create a morphology with a soma and no arbors.
    pub fn new(label: impl Into<String>, soma: Soma) -> Self {
        Self {
            label: label.into(),
            soma,
            axon: None,
            apical_dendrite: None,
            basal_dendrites: Vec::new(),
        }
    }

    /// Set the axon.
    pub fn with_axon(mut self, axon: Arbor) -> Self {
        self.axon = Some(axon);
        self
    }

    /// Set the apical dendrite.
    pub fn with_apical_dendrite(mut self, apical: Arbor) -> Self {
        self.apical_dendrite = Some(apical);
        self
    }

    /// Append a basal dendrite.
    pub fn with_basal_dendrite(mut self, basal: Arbor) -> Self {
        self.basal_dendrites.push(basal);
        self
    }

    /// Build a morphology from a flat list of sections.
    ///
    /// Sections are partitioned by [`SectionType`]; axon and apical dendrite
    /// must be single-rooted unless `policy` folds the extra roots into the
    /// basal dendrites.
    pub fn from_sections(
        label: impl Into<String>,
        soma: Soma,
        sections: Vec<Section>,
        policy: ExtraRootPolicy,
    ) -> Result<Self> {
        let mut axons = Vec::new();
        let mut apicals = Vec::new();
        let mut basals = Vec::new();
        for section in sections {
            match section.kind {
                SectionType::Axon => axons.push(section),
                SectionType::ApicalDendrite => apicals.push(section),
                SectionType::BasalDendrite => basals.push(section),
            }
        }

        let axon = build_single_arbor(axons, policy)?;
        let apical = build_single_arbor(apicals, policy)?;
        let mut basal_dendrites = build_multiple_arbors(basals);

        for mut folded in axon.folded.into_iter().chain(apical.folded) {
            info!(
                "treating extra {} root {} as a basal dendrite",
                folded.kind,
                folded.root_section().id
            );
            folded.relabel(SectionType::BasalDendrite);
            basal_dendrites.push(folded);
        }

        let morphology = Self {
            label: label.into(),
            soma,
            axon: axon.arbor,
            apical_dendrite: apical.arbor,
            basal_dendrites,
        };
        debug!(
            "morphology '{}': {} arbors",
            morphology.label,
            morphology.arbor_count()
        );
        Ok(morphology)
    }

    /// All arbors in canonical order: axon, apical dendrite, basal dendrites.
    pub fn arbors(&self) -> impl Iterator<Item = &Arbor> {
        self.axon
            .iter()
            .chain(self.apical_dendrite.iter())
            .chain(self.basal_dendrites.iter())
    }

    /// Mutable arbors in canonical order.
    pub fn arbors_mut(&mut self) -> impl Iterator<Item = &mut Arbor> {
        self.axon
            .iter_mut()
            .chain(self.apical_dendrite.iter_mut())
            .chain(self.basal_dendrites.iter_mut())
    }

    /// Number of arbors.
    pub fn arbor_count(&self) -> usize {
        self.arbors().count()
    }

    /// Flag every root whose first sample lies within `max_distance` of the
    /// soma surface and refresh the soma's arbor profile points.
    pub fn update_soma_connectivity(&mut self, max_distance: f64) {
        let soma = &self.soma;
        let mut profile = Vec::new();

        let arbors = self
            .axon
            .iter_mut()
            .chain(self.apical_dendrite.iter_mut())
            .chain(self.basal_dendrites.iter_mut());
        for arbor in arbors {
            let root = arbor.root_section_mut();
            let point = root.first_sample().point;
            root.connected_to_soma = soma.radial_gap(&point) <= max_distance;
            if root.connected_to_soma {
                profile.push(point);
            } else {
                debug!("{} root {} is too far from the soma", root.kind, root.id);
            }
        }

        self.soma.arbor_profile_points = profile;
    }

    /// Number of roots currently flagged as connected to the soma.
    pub fn connected_arbor_count(&self) -> usize {
        self.arbors().filter(|a| a.is_connected_to_soma()).count()
    }

    /// Reject morphologies that cannot be reconstructed.
    ///
    /// # Errors
    /// Returns [`SomaError::InvalidMorphology`] on an unusable soma profile,
    /// a zero-length root or a negative or non-finite radius.
    pub fn validate(&self) -> Result<()> {
        if self.soma.profile_points.is_empty() {
            return Err(SomaError::invalid_morphology(&self.label, "soma has no profile points"));
        }
        if !self.soma.mean_radius.is_finite() || self.soma.mean_radius <= 0.0 {
            return Err(SomaError::invalid_morphology(
                &self.label,
                format!("soma mean radius {} is not positive", self.soma.mean_radius),
            ));
        }

        for arbor in self.arbors() {
            let root = arbor.root_section();
            if root.samples().len() < 2 || root.length() <= 0.0 {
                return Err(SomaError::invalid_morphology(
                    &self.label,
                    format!("{} root {} has zero length", root.kind, root.id),
                ));
            }
            for section in &arbor.sections {
                let bad = section.samples().iter().any(|s| {
                    !s.radius.is_finite()
                        || s.radius < 0.0
                        || !s.point.coords.iter().all(|c| c.is_finite())
                });
                if bad {
                    return Err(SomaError::invalid_morphology(
                        &self.label,
                        format!("section {} has an invalid sample", section.id),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Forget the connection faces recorded by a previous reconstruction.
    pub fn clear_soma_connections(&mut self) {
        for arbor in self.arbors_mut() {
            arbor.root_section_mut().clear_soma_connection();
        }
    }
}
