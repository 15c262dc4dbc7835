//! Linking flat section lists into arbors.

use std::collections::HashMap;

use log::{info, warn};

use super::arbor::Arbor;
use super::section::{Section, SOMA_PARENT_ID};
use crate::error::{Result, SomaError};

/// What to do with extra roots when a single-rooted arbor is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtraRootPolicy {
    /// Fail with [`SomaError::MultipleRoots`].
    Reject,
    /// Keep the first root and hand the rest back as basal dendrites.
    #[default]
    FoldIntoBasal,
}

/// Result of [`build_single_arbor`].
#[derive(Debug, Clone, Default)]
pub struct SingleArbor {
    /// The canonical arbor, if any root was found.
    pub arbor: Option<Arbor>,
    /// Extra arbors that were folded out under [`ExtraRootPolicy::FoldIntoBasal`].
    pub folded: Vec<Arbor>,
}

/// Resolve `parent` and `children` of every section from their ids.
///
/// Returns the number of links that could not be resolved. Unresolved links
/// leave the tree incompletely linked and are logged.
pub fn build_tree(sections: &mut [Section]) -> usize {
    let lookup: HashMap<usize, usize> = sections
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id, i))
        .collect();

    let mut unresolved = 0;
    for section in sections.iter_mut() {
        section.children.clear();
        section.parent = None;
    }

    for i in 0..sections.len() {
        let parent_id = sections[i].parent_id;
        if parent_id == SOMA_PARENT_ID {
            continue;
        }
        match lookup.get(&parent_id) {
            Some(&p) if p != i => {
                sections[i].parent = Some(p);
                sections[p].children.push(i);
            }
            _ => {
                warn!(
                    "section {} references missing parent {}",
                    sections[i].id, parent_id
                );
                unresolved += 1;
            }
        }
    }

    for section in sections.iter() {
        for child_id in &section.children_ids {
            if !lookup.contains_key(child_id) {
                warn!("section {} references missing child {}", section.id, child_id);
                unresolved += 1;
            }
        }
    }

    for i in 0..sections.len() {
        if sections[i].children_ids.is_empty() && !sections[i].children.is_empty() {
            let ids = sections[i]
                .children
                .iter()
                .map(|&c| sections[c].id)
                .collect();
            sections[i].children_ids = ids;
        }
    }

    unresolved
}

/// Build one arbor for every soma-attached section.
///
/// Sections whose ancestry does not reach a root are dropped with a warning.
pub fn build_multiple_arbors(mut sections: Vec<Section>) -> Vec<Arbor> {
    build_tree(&mut sections);

    let roots: Vec<usize> = (0..sections.len())
        .filter(|&i| sections[i].is_root())
        .collect();

    let mut slots: Vec<Option<Section>> = sections.into_iter().map(Some).collect();
    let arbors: Vec<Arbor> = roots
        .into_iter()
        .filter_map(|root| extract_subtree(&mut slots, root))
        .collect();

    let orphans = slots.iter().filter(|s| s.is_some()).count();
    if orphans > 0 {
        warn!("dropping {} sections not attached to any root", orphans);
    }

    arbors
}

/// Build a single-rooted arbor (axon or apical dendrite).
///
/// # Errors
/// Returns [`SomaError::MultipleRoots`] when several roots exist and the policy
/// is [`ExtraRootPolicy::Reject`].
pub fn build_single_arbor(sections: Vec<Section>, policy: ExtraRootPolicy) -> Result<SingleArbor> {
    let mut arbors = build_multiple_arbors(sections);
    if arbors.len() <= 1 {
        return Ok(SingleArbor {
            arbor: arbors.pop(),
            folded: Vec::new(),
        });
    }

    let kind = arbors[0].kind;
    match policy {
        ExtraRootPolicy::Reject => Err(SomaError::MultipleRoots {
            kind: kind.name(),
            count: arbors.len(),
        }),
        ExtraRootPolicy::FoldIntoBasal => {
            let folded = arbors.split_off(1);
            info!(
                "{} has {} roots, folding {} into basal dendrites",
                kind,
                folded.len() + 1,
                folded.len()
            );
            Ok(SingleArbor {
                arbor: arbors.pop(),
                folded,
            })
        }
    }
}

/// Move the subtree under `root` out of `slots` into a re-indexed arena.
fn extract_subtree(slots: &mut [Option<Section>], root: usize) -> Option<Arbor> {
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(index) = stack.pop() {
        let Some(section) = slots.get(index).and_then(Option::as_ref) else {
            continue;
        };
        if order.contains(&index) {
            continue;
        }
        order.push(index);
        stack.extend(section.children.iter().rev().copied());
    }

    let remap: HashMap<usize, usize> = order
        .iter()
        .enumerate()
        .map(|(new, &old)| (old, new))
        .collect();

    let mut sections = Vec::with_capacity(order.len());
    for &old in &order {
        let mut section = slots[old].take()?;
        section.parent = section.parent.and_then(|p| remap.get(&p).copied());
        section.children = section
            .children
            .iter()
            .filter_map(|c| remap.get(c).copied())
            .collect();
        sections.push(section);
    }

    let kind = sections.first()?.kind;
    Some(Arbor {
        kind,
        sections,
        root: 0,
    })
}
