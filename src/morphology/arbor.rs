//! A rooted tree of sections.

use super::section::{Section, SectionType};

/// One rooted neurite tree stored as an arena of sections.
///
/// `parent` and `children` of every section index into [`Arbor::sections`].
#[derive(Debug, Clone)]
pub struct Arbor {
    /// Neurite type of the whole arbor.
    pub kind: SectionType,
    /// Sections of the tree, root first, in depth-first order.
    pub sections: Vec<Section>,
    /// Index of the root section.
    pub root: usize,
}

impl Arbor {
    /// Wrap a single root section with no children.
    pub fn from_root(mut section: Section) -> Self {
        section.parent = None;
        section.children.clear();
        Self {
            kind: section.kind,
            sections: vec![section],
            root: 0,
        }
    }

    /// The section attached to the soma.
    #[inline]
    pub fn root_section(&self) -> &Section {
        &self.sections[self.root]
    }

    /// Mutable access to the root section.
    #[inline]
    pub fn root_section_mut(&mut self) -> &mut Section {
        &mut self.sections[self.root]
    }

    /// Whether the root of this arbor reaches the soma.
    #[inline]
    pub fn is_connected_to_soma(&self) -> bool {
        self.root_section().connected_to_soma
    }

    /// Number of sections in the arbor.
    #[inline]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Iterate over sections in depth-first pre-order, children in stored order.
    pub fn iter_depth_first(&self) -> DepthFirstIter<'_> {
        DepthFirstIter {
            arbor: self,
            stack: vec![self.root],
        }
    }

    /// Total polyline length of all sections.
    pub fn total_length(&self) -> f64 {
        self.sections.iter().map(Section::length).sum()
    }

    /// Relabel the arbor and all of its sections.
    pub(crate) fn relabel(&mut self, kind: SectionType) {
        self.kind = kind;
        for section in &mut self.sections {
            section.kind = kind;
        }
    }
}

/// Depth-first iterator over an [`Arbor`].
pub struct DepthFirstIter<'a> {
    arbor: &'a Arbor,
    stack: Vec<usize>,
}

impl<'a> Iterator for DepthFirstIter<'a> {
    type Item = &'a Section;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.stack.pop()?;
        let section = self.arbor.sections.get(index)?;
        self.stack.extend(section.children.iter().rev().copied());
        Some(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::section::SOMA_PARENT_ID;
    use crate::morphology::tree::build_multiple_arbors;
    use nalgebra::Point3;

    fn section(id: usize, parent: usize, x: f64) -> Section {
        Section::from_points(
            id,
            parent,
            SectionType::Axon,
            &[(Point3::new(x, 0.0, 0.0), 1.0), (Point3::new(x + 1.0, 0.0, 0.0), 1.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_depth_first_order() {
        let sections = vec![
            section(1, SOMA_PARENT_ID, 0.0),
            section(2, 1, 1.0),
            section(3, 1, 1.0),
            section(4, 2, 2.0),
        ];
        let arbors = build_multiple_arbors(sections);
        assert_eq!(arbors.len(), 1);

        let ids: Vec<usize> = arbors[0].iter_depth_first().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 4, 3]);
        assert_eq!(arbors[0].section_count(), 4);
        assert!((arbors[0].total_length() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_root() {
        let arbor = Arbor::from_root(section(7, SOMA_PARENT_ID, 0.0));
        assert_eq!(arbor.root_section().id, 7);
        assert!(!arbor.is_connected_to_soma());
        assert_eq!(arbor.iter_depth_first().count(), 1);
    }
}
