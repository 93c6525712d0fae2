//! Visible-queue projection and optimistic exclusion.
//!
//! The exclusion set is the mechanism that makes the UI feel instantaneous:
//! the moment an operator acts on an item both its own key and its case
//! alt-key are inserted, so the visible queue shrinks before any network
//! round-trip completes, and the other representation of the same case
//! cannot flicker in behind it. Entries are only ever removed by the
//! reconciler (or by an explicit undo/failed-mutation restore).

use crate::model::{ExcludeKey, ItemKind, Snapshot, WorkItem};
use std::collections::BTreeSet;

/// Process-local set of keys hidden from the visible queue regardless of
/// what the latest snapshot says.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    keys: BTreeSet<ExcludeKey>,
}

impl ExclusionSet {
    /// Hide an item: inserts its identity key and its case alt-key.
    pub fn exclude(&mut self, item: &WorkItem) {
        self.keys.insert(ExcludeKey::Item(item.key()));
        self.keys.insert(ExcludeKey::Case(item.case_id()));
    }

    /// Restore full visibility for an item: removes both keys.
    pub fn restore(&mut self, item: &WorkItem) {
        self.keys.remove(&ExcludeKey::Item(item.key()));
        self.keys.remove(&ExcludeKey::Case(item.case_id()));
    }

    /// Whether this item is hidden, by its own key or its case alt-key.
    #[must_use]
    pub fn hides(&self, item: &WorkItem) -> bool {
        self.keys.contains(&ExcludeKey::Item(item.key()))
            || self.keys.contains(&ExcludeKey::Case(item.case_id()))
    }

    /// Direct membership test for a single key.
    #[must_use]
    pub fn contains(&self, key: &ExcludeKey) -> bool {
        self.keys.contains(key)
    }

    /// Keep only the keys the predicate accepts (reconciler hook).
    pub fn retain(&mut self, keep: impl FnMut(&ExcludeKey) -> bool) {
        self.keys.retain(keep);
    }

    /// Number of keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when nothing is hidden.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate held keys in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &ExcludeKey> {
        self.keys.iter()
    }
}

/// Project the visible queue from a snapshot.
///
/// Pure and synchronous: all proposals in snapshot order, then all review
/// cases in snapshot order, minus anything the exclusion set hides and
/// anything failing the optional kind filter. Given an unchanged snapshot
/// the output is stable across re-projections.
#[must_use]
pub fn project(
    snapshot: &Snapshot,
    exclusions: &ExclusionSet,
    kind_filter: Option<ItemKind>,
) -> Vec<WorkItem> {
    let proposals = snapshot
        .proposals
        .iter()
        .cloned()
        .map(WorkItem::Proposal);
    let reviews = snapshot.reviews.iter().cloned().map(WorkItem::Review);

    proposals
        .chain(reviews)
        .filter(|item| kind_filter.is_none_or(|kind| item.kind() == kind))
        .filter(|item| !exclusions.hides(item))
        .collect()
}
