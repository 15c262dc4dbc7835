//! Samples and sections of a neurite arbor.

use std::fmt;

use nalgebra::Point3;

use crate::error::{Result, SomaError};

/// Parent id marking a section attached directly to the soma.
pub const SOMA_PARENT_ID: usize = 0;

/// A point along a section with its local radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Position in morphology coordinates.
    pub point: Point3<f64>,
    /// Neurite radius at this sample.
    pub radius: f64,
    /// Index of the sample within its section.
    pub index: usize,
}

impl Sample {
    /// Create a new sample.
    pub fn new(point: Point3<f64>, radius: f64, index: usize) -> Self {
        Self { point, radius, index }
    }
}

/// Neurite type of a section and its arbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionType {
    /// Axon.
    Axon,
    /// Basal dendrite.
    BasalDendrite,
    /// Apical dendrite.
    ApicalDendrite,
}

impl SectionType {
    /// Short lowercase name, used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            SectionType::Axon => "axon",
            SectionType::BasalDendrite => "basal dendrite",
            SectionType::ApicalDendrite => "apical dendrite",
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A polyline segment of a neurite between two branch points.
#[derive(Debug, Clone)]
pub struct Section {
    /// Stable section id from the source morphology.
    pub id: usize,
    /// Id of the parent section, or [`SOMA_PARENT_ID`] for soma-attached roots.
    pub parent_id: usize,
    /// Ids of the child sections as read from the source.
    pub children_ids: Vec<usize>,
    /// Resolved parent, as an index into the owning arena.
    pub parent: Option<usize>,
    /// Resolved children, as indices into the owning arena.
    pub children: Vec<usize>,
    /// Neurite type.
    pub kind: SectionType,
    /// Whether the section's first sample is close enough to the soma to be
    /// connected to it. Only meaningful on roots.
    pub connected_to_soma: bool,
    /// Index of the connection face on the soma surface, set by the planner.
    pub soma_face_index: Option<usize>,
    /// Centroid of the connection face, set by the planner.
    pub soma_face_centroid: Option<Point3<f64>>,
    samples: Vec<Sample>,
}

impl Section {
    /// Create a section from its samples.
    ///
    /// # Errors
    /// Returns [`SomaError::InvalidParameter`] if fewer than two samples are given.
    pub fn new(id: usize, parent_id: usize, kind: SectionType, samples: Vec<Sample>) -> Result<Self> {
        if samples.len() < 2 {
            return Err(SomaError::invalid_param(
                "samples",
                samples.len(),
                "a section needs at least two samples",
            ));
        }

        Ok(Self {
            id,
            parent_id,
            children_ids: Vec::new(),
            parent: None,
            children: Vec::new(),
            kind,
            connected_to_soma: false,
            soma_face_index: None,
            soma_face_centroid: None,
            samples,
        })
    }

    /// Create a section from `(point, radius)` pairs, indexing samples in order.
    pub fn from_points(
        id: usize,
        parent_id: usize,
        kind: SectionType,
        points: &[(Point3<f64>, f64)],
    ) -> Result<Self> {
        let samples = points
            .iter()
            .enumerate()
            .map(|(i, &(p, r))| Sample::new(p, r, i))
            .collect();
        Self::new(id, parent_id, kind, samples)
    }

    /// Set the child ids read from the source file.
    pub fn with_children_ids(mut self, children_ids: Vec<usize>) -> Self {
        self.children_ids = children_ids;
        self
    }

    /// All samples, in order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// The sample connecting this section to its parent (or to the soma).
    pub fn first_sample(&self) -> &Sample {
        &self.samples[0]
    }

    /// The last sample of the section.
    pub fn last_sample(&self) -> &Sample {
        &self.samples[self.samples.len() - 1]
    }

    /// Whether this section is attached to the soma.
    pub fn is_root(&self) -> bool {
        self.parent_id == SOMA_PARENT_ID
    }

    /// Polyline length of the section.
    pub fn length(&self) -> f64 {
        self.samples
            .windows(2)
            .map(|w| (w[1].point - w[0].point).norm())
            .sum()
    }

    /// Forget any soma connection recorded by a previous reconstruction.
    pub fn clear_soma_connection(&mut self) {
        self.soma_face_index = None;
        self.soma_face_centroid = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_needs_two_samples() {
        let one = vec![Sample::new(Point3::origin(), 1.0, 0)];
        assert!(Section::new(1, SOMA_PARENT_ID, SectionType::Axon, one).is_err());
    }

    #[test]
    fn test_section_length_and_root() {
        let section = Section::from_points(
            3,
            SOMA_PARENT_ID,
            SectionType::BasalDendrite,
            &[
                (Point3::new(0.0, 0.0, 0.0), 1.0),
                (Point3::new(3.0, 0.0, 0.0), 0.8),
                (Point3::new(3.0, 4.0, 0.0), 0.5),
            ],
        )
        .unwrap();

        assert!(section.is_root());
        assert!((section.length() - 7.0).abs() < 1e-12);
        assert_eq!(section.last_sample().index, 2);
        assert_eq!(section.first_sample().radius, 1.0);
    }
}
