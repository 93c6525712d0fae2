//! Single-slot undo scheduling for destructive operator actions.
//!
//! A destructive action does not hit the backend immediately: it is *armed*
//! with a grace deadline, during which the operator may cancel it with no
//! side effect at all. The lifecycle is strictly
//!
//! ```text
//! Idle -> Armed -> Committed   (deadline reached, bound mutation runs)
//!               -> Cancelled   (operator undo, visibility restored)
//! ```
//!
//! At most one action may be Armed at a time. Arming while Armed *flushes*
//! the incumbent, handing it back to the caller for immediate commit,
//! rather than silently discarding it, which would leave its exclusion keys
//! orphaned and the item permanently hidden.
//!
//! The slot holds no timer of its own: the engine's `tick` asks for expired
//! work with the host-supplied clock, so tests drive the deadline with
//! virtual time. Cancellation is race-free by construction: the armed
//! action lives in one `Option`, and whichever of cancel/expiry takes it
//! first wins.

use crate::model::{ActionRef, Millis, WorkItem};
use std::fmt;

/// Opaque handle identifying one staged destructive action.
///
/// Tokens are never reused within an engine's lifetime, so a late commit
/// result can always be matched to the action that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UndoToken(u64);

impl fmt::Display for UndoToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "undo#{}", self.0)
    }
}

/// A destructive action inside its undo grace window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUndo {
    pub token: UndoToken,
    /// Human-readable label shown next to the undo affordance.
    pub label: String,
    /// The item the action targets; kept whole so a cancel or failed commit
    /// can restore both of its exclusion keys.
    pub item: WorkItem,
    /// The bound backend operation, committed on expiry.
    pub action: ActionRef,
    /// Absolute deadline: arm time plus the configured grace period.
    pub deadline: Millis,
}

impl PendingUndo {
    /// Milliseconds left in the grace window; zero once expired.
    #[must_use]
    pub fn remaining(&self, now: Millis) -> Millis {
        (self.deadline - now).max(0)
    }
}

/// Outcome of arming a destructive action.
#[derive(Debug, PartialEq, Eq)]
pub struct ArmOutcome {
    /// Token for the newly armed action.
    pub token: UndoToken,
    /// The previously armed action, if one had to be flushed for immediate
    /// commit to make room.
    pub flushed: Option<PendingUndo>,
}

/// Owns the at-most-one armed action.
#[derive(Debug, Default)]
pub struct UndoSlot {
    armed: Option<PendingUndo>,
    next_token: u64,
}

impl UndoSlot {
    /// Arm a destructive action with a deadline of `now + grace`.
    ///
    /// If an action is already armed it is returned in
    /// [`ArmOutcome::flushed`]; the caller must commit it immediately.
    pub fn arm(
        &mut self,
        label: impl Into<String>,
        item: WorkItem,
        action: ActionRef,
        now: Millis,
        grace: Millis,
    ) -> ArmOutcome {
        let flushed = self.armed.take();

        let token = UndoToken(self.next_token);
        self.next_token += 1;

        self.armed = Some(PendingUndo {
            token,
            label: label.into(),
            item,
            action,
            deadline: now + grace,
        });

        ArmOutcome { token, flushed }
    }

    /// Cancel the armed action, if any, returning it so the caller can
    /// restore the item's visibility. No mutation is ever issued for a
    /// cancelled action.
    pub fn cancel(&mut self) -> Option<PendingUndo> {
        self.armed.take()
    }

    /// Take the armed action if its deadline has passed. The caller must
    /// commit whatever is returned.
    pub fn take_expired(&mut self, now: Millis) -> Option<PendingUndo> {
        if self.armed.as_ref().is_some_and(|p| p.deadline <= now) {
            self.armed.take()
        } else {
            None
        }
    }

    /// Currently armed action, if any.
    #[must_use]
    pub const fn armed(&self) -> Option<&PendingUndo> {
        self.armed.as_ref()
    }

    /// Deadline of the armed action, for the engine's timer bookkeeping.
    #[must_use]
    pub fn deadline(&self) -> Option<Millis> {
        self.armed.as_ref().map(|p| p.deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::UndoSlot;
    use crate::model::{ActionKind, ActionRef, Proposal, WorkItem};

    fn item(id: u64, case_id: u64) -> WorkItem {
        WorkItem::Proposal(Proposal {
            id,
            case_id,
            case_name: format!("Case {case_id}"),
            proposed_action: "close_request".to_string(),
            ..Proposal::default()
        })
    }

    fn action(item: &WorkItem) -> ActionRef {
        ActionRef::new(ActionKind::Dismiss, item)
    }

    #[test]
    fn arm_sets_deadline_from_grace() {
        let mut slot = UndoSlot::default();
        let target = item(1, 10);
        let outcome = slot.arm("Dismiss Case 10", target.clone(), action(&target), 1_000, 5_000);

        assert!(outcome.flushed.is_none());
        let armed = slot.armed().expect("armed");
        assert_eq!(armed.deadline, 6_000);
        assert_eq!(armed.token, outcome.token);
        assert_eq!(armed.remaining(3_000), 3_000);
        assert_eq!(armed.remaining(9_000), 0);
    }

    #[test]
    fn cancel_before_deadline_returns_action_once() {
        let mut slot = UndoSlot::default();
        let target = item(1, 10);
        slot.arm("Dismiss", target.clone(), action(&target), 0, 5_000);

        let cancelled = slot.cancel().expect("cancel wins");
        assert_eq!(cancelled.item, target);

        // The race is settled: a later expiry check finds nothing.
        assert!(slot.take_expired(10_000).is_none());
        assert!(slot.cancel().is_none());
    }

    #[test]
    fn expiry_takes_the_action_exactly_once() {
        let mut slot = UndoSlot::default();
        let target = item(1, 10);
        slot.arm("Dismiss", target.clone(), action(&target), 0, 5_000);

        assert!(slot.take_expired(4_999).is_none(), "not yet due");
        let expired = slot.take_expired(5_000).expect("due at deadline");
        assert_eq!(expired.item, target);

        assert!(slot.take_expired(5_000).is_none());
        assert!(slot.cancel().is_none(), "expiry settled the race");
    }

    #[test]
    fn arming_while_armed_flushes_the_incumbent() {
        let mut slot = UndoSlot::default();
        let first = item(1, 10);
        let second = item(2, 20);

        let a = slot.arm("Dismiss first", first.clone(), action(&first), 0, 5_000);
        let b = slot.arm("Dismiss second", second.clone(), action(&second), 2_000, 5_000);

        let flushed = b.flushed.expect("first action handed back");
        assert_eq!(flushed.token, a.token);
        assert_eq!(flushed.item, first);

        let armed = slot.armed().expect("second is armed");
        assert_eq!(armed.token, b.token);
        assert_eq!(armed.deadline, 7_000);
    }

    #[test]
    fn tokens_are_never_reused() {
        let mut slot = UndoSlot::default();
        let target = item(1, 10);

        let a = slot.arm("x", target.clone(), action(&target), 0, 1_000);
        slot.cancel();
        let b = slot.arm("y", target.clone(), action(&target), 0, 1_000);
        slot.take_expired(1_000);
        let c = slot.arm("z", target.clone(), action(&target), 0, 1_000);

        assert_ne!(a.token, b.token);
        assert_ne!(b.token, c.token);
    }
}
