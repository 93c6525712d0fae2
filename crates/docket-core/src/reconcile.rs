//! Exclusion pruning against server truth.
//!
//! An exclusion key is only a local *prediction* that the server will soon
//! stop reporting the item. Once a fresh snapshot no longer contains the key
//! (or, for a case alt-key, no item carrying that case id) the server has
//! confirmed the removal and the key is safe to forget. Keys the snapshot
//! still contains are kept; dropping them early is what causes acted-on
//! items to bounce back into the queue.
//!
//! Pruning only ever runs against the *newest* snapshot; a failed poll must
//! leave the set untouched (over-hiding is recoverable, flicker is not).

use crate::model::{ExcludeKey, Snapshot};
use crate::queue::ExclusionSet;

/// Drop every exclusion key the fresh snapshot no longer contains.
///
/// Returns the number of keys pruned.
pub fn prune(snapshot: &Snapshot, exclusions: &mut ExclusionSet) -> usize {
    let before = exclusions.len();

    exclusions.retain(|key| match key {
        ExcludeKey::Item(item_key) => snapshot.contains_key(*item_key),
        ExcludeKey::Case(case_id) => snapshot.contains_case(*case_id),
    });

    let pruned = before - exclusions.len();
    if pruned > 0 {
        tracing::debug!(pruned, remaining = exclusions.len(), "reconciled exclusions");
    }
    pruned
}
