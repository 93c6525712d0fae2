//! The synchronization engine: one owned instance per monitor view.
//!
//! The engine is sans-I/O. Every entry point takes the host's clock and
//! returns a list of [`Effect`]s the host must perform: fetch a snapshot,
//! open the push subscription, run a mutation, publish the selected case.
//! The host reports completions back through the `handle_*` methods. All
//! state (snapshot, exclusions, cursor, armed undo) is exclusively owned
//! here; the rendering layer only reads the view accessors and dispatches
//! operations.
//!
//! Handlers run to completion between suspension points, so no generation
//! bookkeeping is needed for anything except polls, whose responses can
//! complete out of order on a real network.

use crate::config::EngineConfig;
use crate::cursor::{self, Cursor};
use crate::error::ErrorCode;
use crate::model::{
    ActionKind, ActionRef, ConnectionState, ItemKey, ItemKind, Millis, SignalKind, Snapshot,
    WorkItem,
};
use crate::push::PushChannel;
use crate::queue::{self, ExclusionSet};
use crate::reconcile;
use crate::undo::{PendingUndo, UndoSlot, UndoToken};
use anyhow::Result;
use std::collections::BTreeMap;

/// A side effect the host must perform after an engine call.
///
/// Effects are returned, never executed: the engine stays single-threaded
/// and deterministic, and tests can assert on exactly what was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch a full snapshot and report it via [`Engine::handle_poll`] with
    /// the same generation.
    FetchSnapshot { generation: u64 },
    /// Open the push subscription (closing any prior connection first) and
    /// report lifecycle via [`Engine::handle_push`].
    Connect,
    /// Run the bound mutation of a committed destructive action and report
    /// via [`Engine::handle_commit`].
    Commit { token: UndoToken, action: ActionRef },
    /// Run an immediate mutation and report via [`Engine::handle_mutation`].
    Mutate { seq: u64, action: ActionRef },
    /// The selected case changed; publish it as the external reference
    /// (deep-link export). Idempotent on the host side.
    PublishSelection { case_id: Option<u64> },
}

/// Host-reported push channel event. Signals carry a category and nothing
/// else; their payloads are never trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEvent {
    Opened,
    Closed,
    Signal(SignalKind),
}

/// Severity of a surfaced notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A dismissible, user-visible notice (mutation failure, deep-link miss).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub seq: u64,
    pub severity: Severity,
    pub code: ErrorCode,
    pub text: String,
}

/// Render-layer view of the currently armed undo action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedUndo {
    pub label: String,
    pub remaining_millis: Millis,
}

/// Optimistic work-queue synchronization engine.
pub struct Engine {
    cfg: EngineConfig,
    started: bool,
    disposed: bool,

    snapshot: Option<Snapshot>,
    exclusions: ExclusionSet,
    visible: Vec<WorkItem>,
    kind_filter: Option<ItemKind>,

    cursor: Cursor,
    deep_link: Option<u64>,
    deep_link_done: bool,
    published_case: Option<u64>,

    undo: UndoSlot,
    commits_in_flight: BTreeMap<UndoToken, WorkItem>,
    mutations_in_flight: BTreeMap<u64, WorkItem>,
    next_mutation_seq: u64,

    push: PushChannel,
    next_poll_at: Millis,
    next_generation: u64,
    applied_generation: u64,
    stale: bool,

    notices: Vec<Notice>,
    next_notice_seq: u64,
}

impl Engine {
    /// Create an engine. `deep_link` is an external case id to select on
    /// the first queue population.
    ///
    /// # Errors
    ///
    /// Returns an error when the config fails validation.
    pub fn new(cfg: EngineConfig, deep_link: Option<u64>) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            push: PushChannel::new(cfg.reconnect_delay_millis),
            cfg,
            started: false,
            disposed: false,
            snapshot: None,
            exclusions: ExclusionSet::default(),
            visible: Vec::new(),
            kind_filter: None,
            cursor: Cursor::default(),
            deep_link,
            deep_link_done: false,
            published_case: None,
            undo: UndoSlot::default(),
            commits_in_flight: BTreeMap::new(),
            mutations_in_flight: BTreeMap::new(),
            next_mutation_seq: 0,
            next_poll_at: 0,
            next_generation: 0,
            applied_generation: 0,
            stale: false,
            notices: Vec::new(),
            next_notice_seq: 0,
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the engine: kicks off the first poll and the push connection.
    pub fn start(&mut self, now: Millis) -> Vec<Effect> {
        if self.disposed || self.started {
            return Vec::new();
        }
        self.started = true;
        self.next_poll_at = now + self.cfg.poll_interval_millis;

        let mut effects = vec![self.request_poll()];
        if self.push.start() {
            effects.push(Effect::Connect);
        }
        effects
    }

    /// Tear down. Cancels the reconnect timer and guarantees every later
    /// input is a no-op, so no callback can fire into a disposed view.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.push.dispose();
        self.undo.cancel();
        self.commits_in_flight.clear();
        self.mutations_in_flight.clear();
    }

    /// Fire due timers: undo expiry, reconnect, and the recurring poll.
    pub fn tick(&mut self, now: Millis) -> Vec<Effect> {
        if self.disposed || !self.started {
            return Vec::new();
        }
        let mut effects = Vec::new();

        if let Some(expired) = self.undo.take_expired(now) {
            tracing::debug!(token = %expired.token, "undo grace expired, committing");
            self.push_commit(expired, &mut effects);
        }

        if self.push.tick(now) {
            effects.push(Effect::Connect);
        }

        if now >= self.next_poll_at {
            self.next_poll_at = now + self.cfg.poll_interval_millis;
            effects.push(self.request_poll());
        }

        effects
    }

    // -----------------------------------------------------------------------
    // Host completions
    // -----------------------------------------------------------------------

    /// Apply a completed poll.
    ///
    /// A success replaces the snapshot wholesale, prunes the exclusion set
    /// against it, and re-projects. A failure only raises the stale flag;
    /// exclusions are deliberately left untouched (over-hiding beats
    /// flicker) and the next scheduled poll retries.
    pub fn handle_poll(
        &mut self,
        _now: Millis,
        generation: u64,
        result: Result<Snapshot, String>,
    ) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let mut effects = Vec::new();

        match result {
            Ok(snapshot) => {
                if generation <= self.applied_generation {
                    tracing::debug!(generation, "discarding stale poll response");
                    return effects;
                }
                self.applied_generation = generation;
                self.stale = false;

                reconcile::prune(&snapshot, &mut self.exclusions);
                self.snapshot = Some(snapshot);
                self.reproject();
                self.import_deep_link_once();
                self.publish_selection(&mut effects);
            }
            Err(err) => {
                if generation <= self.applied_generation {
                    tracing::debug!(generation, "discarding stale poll failure");
                    return effects;
                }
                tracing::warn!(error = %err, "snapshot poll failed; data may be stale");
                self.stale = true;
            }
        }
        effects
    }

    /// Apply a push channel event. Any recognized signal requests a fresh
    /// poll; its payload is never inspected.
    pub fn handle_push(&mut self, now: Millis, event: PushEvent) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let mut effects = Vec::new();
        match event {
            PushEvent::Opened => self.push.on_opened(),
            PushEvent::Closed => self.push.on_closed(now),
            PushEvent::Signal(kind) => {
                tracing::debug!(signal = %kind, "push invalidation, refreshing");
                effects.push(self.request_poll());
            }
        }
        effects
    }

    /// Apply the result of a committed destructive action's mutation.
    pub fn handle_commit(
        &mut self,
        _now: Millis,
        token: UndoToken,
        result: Result<(), String>,
    ) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let Some(item) = self.commits_in_flight.remove(&token) else {
            tracing::warn!(token = %token, "commit result for unknown action");
            return Vec::new();
        };

        let mut effects = Vec::new();
        match result {
            // Success: the item stays hidden; reconcile against fresh truth.
            Ok(()) => effects.push(self.request_poll()),
            Err(err) => {
                self.exclusions.restore(&item);
                self.notice(
                    Severity::Error,
                    ErrorCode::CommitFailed,
                    format!("'{}' failed: {err}", item.case_name()),
                );
                self.reproject();
                self.publish_selection(&mut effects);
            }
        }
        effects
    }

    /// Apply the result of an immediate (non-undoable) mutation.
    pub fn handle_mutation(
        &mut self,
        _now: Millis,
        seq: u64,
        result: Result<(), String>,
    ) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let Some(item) = self.mutations_in_flight.remove(&seq) else {
            tracing::warn!(seq, "mutation result for unknown action");
            return Vec::new();
        };

        let mut effects = Vec::new();
        match result {
            Ok(()) => effects.push(self.request_poll()),
            Err(err) => {
                self.exclusions.restore(&item);
                self.notice(
                    Severity::Error,
                    ErrorCode::MutationFailed,
                    format!("'{}' failed: {err}", item.case_name()),
                );
                self.reproject();
                self.publish_selection(&mut effects);
            }
        }
        effects
    }

    // -----------------------------------------------------------------------
    // Operator operations
    // -----------------------------------------------------------------------

    /// Stage a destructive action with an undo grace window.
    ///
    /// The item is excluded immediately (both keys) so the queue shrinks
    /// before any network round-trip. If another action is already armed it
    /// is flushed (committed right now) before the new one arms; nothing
    /// is ever silently dropped.
    pub fn stage(
        &mut self,
        now: Millis,
        key: ItemKey,
        kind: ActionKind,
        params: serde_json::Value,
    ) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let Some(item) = self.visible_item(key) else {
            self.notice(
                Severity::Error,
                ErrorCode::ItemNotFound,
                format!("{key} is no longer in the queue"),
            );
            return Vec::new();
        };

        let mut effects = Vec::new();
        self.exclusions.exclude(&item);

        let mut action = ActionRef::new(kind, &item);
        action.params = params;
        let label = undo_label(kind, item.case_name());

        let outcome = self
            .undo
            .arm(label, item, action, now, self.cfg.undo_grace_millis);
        if let Some(flushed) = outcome.flushed {
            tracing::debug!(token = %flushed.token, "flushing armed action for new stage");
            self.push_commit(flushed, &mut effects);
        }

        self.reproject();
        self.publish_selection(&mut effects);
        effects
    }

    /// Run a non-destructive action immediately (no undo window). The item
    /// is still excluded optimistically; a failure restores it.
    pub fn apply_now(
        &mut self,
        _now: Millis,
        key: ItemKey,
        kind: ActionKind,
        params: serde_json::Value,
    ) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let Some(item) = self.visible_item(key) else {
            self.notice(
                Severity::Error,
                ErrorCode::ItemNotFound,
                format!("{key} is no longer in the queue"),
            );
            return Vec::new();
        };

        let mut effects = Vec::new();
        self.exclusions.exclude(&item);

        let mut action = ActionRef::new(kind, &item);
        action.params = params;

        let seq = self.next_mutation_seq;
        self.next_mutation_seq += 1;
        self.mutations_in_flight.insert(seq, item);
        effects.push(Effect::Mutate { seq, action });

        self.reproject();
        self.publish_selection(&mut effects);
        effects
    }

    /// Cancel the armed undo action: restores full visibility, no network
    /// call is ever made. The item reappears wherever the projection places
    /// it, not necessarily its prior screen position.
    pub fn cancel_undo(&mut self, _now: Millis) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let Some(pending) = self.undo.cancel() else {
            return Vec::new();
        };

        self.exclusions.restore(&pending.item);
        let mut effects = Vec::new();
        self.reproject();
        self.publish_selection(&mut effects);
        effects
    }

    /// Force an immediate snapshot refresh.
    pub fn refresh(&mut self, now: Millis) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        self.next_poll_at = now + self.cfg.poll_interval_millis;
        vec![self.request_poll()]
    }

    /// Step the selection by `delta`, wrapping.
    pub fn step(&mut self, delta: isize) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        self.cursor.step(delta, self.visible.len());
        let mut effects = Vec::new();
        self.publish_selection(&mut effects);
        effects
    }

    /// Jump the selection to an explicit queue index.
    pub fn select(&mut self, index: usize) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        self.cursor.select(index, self.visible.len());
        let mut effects = Vec::new();
        self.publish_selection(&mut effects);
        effects
    }

    /// Restrict the queue to one variant, or clear the restriction.
    pub fn set_kind_filter(&mut self, filter: Option<ItemKind>) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        self.kind_filter = filter;
        let mut effects = Vec::new();
        self.reproject();
        self.publish_selection(&mut effects);
        effects
    }

    /// Dismiss a surfaced notice by sequence number.
    pub fn dismiss_notice(&mut self, seq: u64) {
        self.notices.retain(|n| n.seq != seq);
    }

    // -----------------------------------------------------------------------
    // Views (read-only; the rendering layer never mutates engine state)
    // -----------------------------------------------------------------------

    /// The visible queue in projection order.
    #[must_use]
    pub fn queue(&self) -> &[WorkItem] {
        &self.visible
    }

    /// Index of the selected item; `None` when the queue is empty.
    #[must_use]
    pub fn selected_index(&self) -> Option<usize> {
        if self.visible.is_empty() {
            None
        } else {
            Some(self.cursor.index())
        }
    }

    /// The selected item, if any.
    #[must_use]
    pub fn selected(&self) -> Option<&WorkItem> {
        self.selected_index().and_then(|i| self.visible.get(i))
    }

    /// Push-channel liveness.
    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        self.push.connection()
    }

    /// The armed undo action, with time remaining, for the undo affordance.
    #[must_use]
    pub fn armed_undo(&self, now: Millis) -> Option<ArmedUndo> {
        self.undo.armed().map(|p| ArmedUndo {
            label: p.label.clone(),
            remaining_millis: p.remaining(now),
        })
    }

    /// True when the most recent poll failed and the data shown may be stale.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// Currently surfaced notices, oldest first.
    #[must_use]
    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Exclusion set size (diagnostics).
    #[must_use]
    pub fn excluded_len(&self) -> usize {
        self.exclusions.len()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn request_poll(&mut self) -> Effect {
        self.next_generation += 1;
        Effect::FetchSnapshot {
            generation: self.next_generation,
        }
    }

    fn push_commit(&mut self, pending: PendingUndo, effects: &mut Vec<Effect>) {
        self.commits_in_flight
            .insert(pending.token, pending.item.clone());
        effects.push(Effect::Commit {
            token: pending.token,
            action: pending.action,
        });
    }

    fn visible_item(&self, key: ItemKey) -> Option<WorkItem> {
        self.visible.iter().find(|i| i.key() == key).cloned()
    }

    /// Recompute the visible queue and re-clamp the cursor. Called after
    /// every snapshot apply, exclusion, restore, and filter change.
    fn reproject(&mut self) {
        self.visible = self.snapshot.as_ref().map_or_else(Vec::new, |snap| {
            queue::project(snap, &self.exclusions, self.kind_filter)
        });
        self.cursor.clamp_to(self.visible.len());
    }

    /// On first queue population only: select the deep-linked case if it is
    /// present, otherwise fall back to the first item with a non-fatal
    /// notice.
    fn import_deep_link_once(&mut self) {
        if self.deep_link_done || self.visible.is_empty() {
            return;
        }
        self.deep_link_done = true;

        let Some(case_id) = self.deep_link else {
            return;
        };
        if let Some(index) = cursor::find_case(&self.visible, case_id) {
            self.cursor.select(index, self.visible.len());
            return;
        }
        self.notice(
            Severity::Info,
            ErrorCode::DeepLinkNotFound,
            format!("case {case_id} is not in the queue"),
        );
    }

    /// Publish the selected case id whenever it changes (deep-link export).
    fn publish_selection(&mut self, effects: &mut Vec<Effect>) {
        let current = self.selected().map(WorkItem::case_id);
        if current != self.published_case {
            self.published_case = current;
            effects.push(Effect::PublishSelection { case_id: current });
        }
    }

    fn notice(&mut self, severity: Severity, code: ErrorCode, text: String) {
        let seq = self.next_notice_seq;
        self.next_notice_seq += 1;
        tracing::info!(code = %code, %text, "notice");
        self.notices.push(Notice {
            seq,
            severity,
            code,
            text,
        });
    }
}

fn undo_label(kind: ActionKind, case_name: &str) -> String {
    let verb = match kind {
        ActionKind::Approve => "Approve",
        ActionKind::Adjust => "Adjust",
        ActionKind::Dismiss => "Dismiss",
        ActionKind::Withdraw => "Withdraw",
    };
    format!("{verb} '{case_name}'")
}

#[cfg(test)]
mod tests {
    use super::{Effect, Engine, PushEvent, Severity};
    use crate::config::EngineConfig;
    use crate::error::ErrorCode;
    use crate::model::{ActionKind, ItemKey, ItemKind, Proposal, ReviewCase, Snapshot};

    fn engine() -> Engine {
        Engine::new(EngineConfig::default(), None).expect("valid config")
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            proposals: vec![
                Proposal {
                    id: 1,
                    case_id: 10,
                    case_name: "Adams PD".to_string(),
                    ..Proposal::default()
                },
                Proposal {
                    id: 2,
                    case_id: 42,
                    case_name: "Odessa".to_string(),
                    ..Proposal::default()
                },
            ],
            reviews: vec![ReviewCase {
                id: 42,
                case_id: 42,
                case_name: "Odessa".to_string(),
                ..ReviewCase::default()
            }],
            open_requests: 3,
            pending_reviews: 1,
        }
    }

    fn key(kind: ItemKind, id: u64) -> ItemKey {
        ItemKey { kind, id }
    }

    /// Start, deliver the first snapshot, return the engine.
    fn started_engine() -> Engine {
        let mut engine = engine();
        let effects = engine.start(0);
        assert!(matches!(effects[0], Effect::FetchSnapshot { generation: 1 }));
        assert!(effects.contains(&Effect::Connect));
        engine.handle_poll(0, 1, Ok(snapshot()));
        engine
    }

    fn fetch_generation(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::FetchSnapshot { generation } => Some(*generation),
                _ => None,
            })
            .expect("a poll was requested")
    }

    #[test]
    fn start_polls_and_connects_once() {
        let mut engine = engine();
        let effects = engine.start(0);
        assert_eq!(effects.len(), 2);
        assert!(engine.start(0).is_empty(), "start is idempotent");
    }

    #[test]
    fn first_poll_populates_queue_and_publishes_selection() {
        let mut engine = engine();
        engine.start(0);
        let effects = engine.handle_poll(0, 1, Ok(snapshot()));

        assert_eq!(engine.queue().len(), 3);
        assert_eq!(engine.selected_index(), Some(0));
        assert!(effects.contains(&Effect::PublishSelection { case_id: Some(10) }));
    }

    #[test]
    fn stale_poll_response_is_discarded() {
        let mut engine = started_engine();
        let effects = engine.refresh(100);
        let first_gen = fetch_generation(&effects);
        let effects = engine.refresh(200);
        let second_gen = fetch_generation(&effects);
        assert!(second_gen > first_gen);

        // Newer poll completes first.
        engine.handle_poll(300, second_gen, Ok(snapshot()));
        // The older response must not clobber it.
        let empty = Snapshot::default();
        engine.handle_poll(400, first_gen, Ok(empty));
        assert_eq!(engine.queue().len(), 3, "stale response discarded");
    }

    #[test]
    fn poll_failure_sets_stale_and_keeps_state() {
        let mut engine = started_engine();
        engine.stage(
            1_000,
            key(ItemKind::Proposal, 2),
            ActionKind::Dismiss,
            serde_json::Value::Null,
        );
        let hidden = engine.excluded_len();

        engine.handle_poll(2_000, 99, Err("connection refused".to_string()));
        assert!(engine.is_stale());
        assert_eq!(engine.excluded_len(), hidden, "exclusions untouched");
        assert_eq!(engine.queue().len(), 1);
    }

    #[test]
    fn stale_poll_failure_does_not_raise_stale_flag() {
        let mut engine = started_engine();
        let effects = engine.refresh(100);
        let first_gen = fetch_generation(&effects);
        let effects = engine.refresh(200);
        let second_gen = fetch_generation(&effects);

        // Newer poll succeeds first, then the older poll's failure arrives.
        engine.handle_poll(300, second_gen, Ok(snapshot()));
        assert!(!engine.is_stale());
        engine.handle_poll(400, first_gen, Err("timeout".to_string()));
        assert!(!engine.is_stale(), "stale failure discarded");
    }

    #[test]
    fn stage_hides_both_representations_immediately() {
        let mut engine = started_engine();
        let effects = engine.stage(
            1_000,
            key(ItemKind::Proposal, 2),
            ActionKind::Dismiss,
            serde_json::Value::Null,
        );

        // No network effect yet: only the deferred commit is armed.
        assert!(
            !effects
                .iter()
                .any(|e| matches!(e, Effect::Commit { .. } | Effect::Mutate { .. })),
            "destructive stage must not mutate before the grace expires"
        );
        // Proposal 2 and review 42 share case 42; both vanish.
        assert_eq!(engine.queue().len(), 1);
        assert_eq!(engine.queue()[0].case_id(), 10);
        assert!(engine.armed_undo(1_000).is_some());
    }

    #[test]
    fn undo_cancel_restores_visibility_with_no_mutation() {
        let mut engine = started_engine();
        engine.stage(
            0,
            key(ItemKind::Proposal, 2),
            ActionKind::Dismiss,
            serde_json::Value::Null,
        );

        let effects = engine.cancel_undo(2_000);
        assert!(
            !effects
                .iter()
                .any(|e| matches!(e, Effect::Commit { .. } | Effect::Mutate { .. }))
        );
        assert_eq!(engine.queue().len(), 3, "item visible immediately");
        assert!(engine.armed_undo(2_000).is_none());

        // The timer slot is empty: nothing fires later.
        let effects = engine.tick(10_000);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Commit { .. })));
    }

    #[test]
    fn undo_commits_exactly_once_on_expiry() {
        let mut engine = started_engine();
        engine.stage(
            0,
            key(ItemKind::Proposal, 2),
            ActionKind::Dismiss,
            serde_json::Value::Null,
        );

        let effects = engine.tick(4_999);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Commit { .. })));

        let effects = engine.tick(5_000);
        let commits: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, Effect::Commit { .. }))
            .collect();
        assert_eq!(commits.len(), 1);

        let effects = engine.tick(5_001);
        assert!(
            !effects.iter().any(|e| matches!(e, Effect::Commit { .. })),
            "commit fires exactly once"
        );
    }

    #[test]
    fn commit_success_keeps_item_hidden_and_repolls() {
        let mut engine = started_engine();
        engine.stage(
            0,
            key(ItemKind::Proposal, 2),
            ActionKind::Dismiss,
            serde_json::Value::Null,
        );
        let effects = engine.tick(5_000);
        let Some(Effect::Commit { token, .. }) = effects
            .iter()
            .find(|e| matches!(e, Effect::Commit { .. }))
            .cloned()
        else {
            panic!("expected commit effect");
        };

        let effects = engine.handle_commit(5_100, token, Ok(()));
        assert!(
            effects
                .iter()
                .any(|e| matches!(e, Effect::FetchSnapshot { .. })),
            "successful commit triggers reconciliation poll"
        );
        assert_eq!(engine.queue().len(), 1, "item stays hidden");

        // Server confirms removal: reconciler forgets the keys.
        let confirmed = Snapshot {
            proposals: vec![Proposal {
                id: 1,
                case_id: 10,
                case_name: "Adams PD".to_string(),
                ..Proposal::default()
            }],
            ..Snapshot::default()
        };
        let generation = engine.next_generation;
        engine.handle_poll(5_200, generation, Ok(confirmed));
        assert_eq!(engine.excluded_len(), 0, "reconciled to server truth");
    }

    #[test]
    fn commit_failure_restores_item_and_surfaces_error() {
        let mut engine = started_engine();
        engine.stage(
            0,
            key(ItemKind::Proposal, 2),
            ActionKind::Dismiss,
            serde_json::Value::Null,
        );
        let effects = engine.tick(5_000);
        let Some(Effect::Commit { token, .. }) = effects
            .iter()
            .find(|e| matches!(e, Effect::Commit { .. }))
            .cloned()
        else {
            panic!("expected commit effect");
        };

        engine.handle_commit(5_100, token, Err("backend 500".to_string()));
        assert_eq!(engine.queue().len(), 3, "visibility restored");
        assert_eq!(engine.excluded_len(), 0);

        let notice = engine.notices().last().expect("error surfaced");
        assert_eq!(notice.code, ErrorCode::CommitFailed);
        assert_eq!(notice.severity, Severity::Error);
    }

    #[test]
    fn second_stage_flushes_first_instead_of_orphaning_it() {
        let mut engine = started_engine();
        engine.stage(
            0,
            key(ItemKind::Proposal, 2),
            ActionKind::Dismiss,
            serde_json::Value::Null,
        );
        // Arm a second action well inside the first one's grace window.
        let effects = engine.stage(
            2_000,
            key(ItemKind::Proposal, 1),
            ActionKind::Withdraw,
            serde_json::Value::Null,
        );

        // The first action is committed immediately, not dropped.
        let Some(Effect::Commit { token, action }) = effects
            .iter()
            .find(|e| matches!(e, Effect::Commit { .. }))
            .cloned()
        else {
            panic!("first action must be flushed to commit");
        };
        assert_eq!(action.case_id, 42);

        // Its success path reconciles the exclusion away like any commit.
        engine.handle_commit(2_100, token, Ok(()));
        let generation = engine.next_generation;
        engine.handle_poll(2_200, generation, Ok(Snapshot::default()));
        assert_eq!(
            engine.excluded_len(),
            0,
            "no key is left permanently hidden without its commit running"
        );
    }

    #[test]
    fn immediate_action_mutates_at_once_and_failure_restores() {
        let mut engine = started_engine();
        let effects = engine.apply_now(
            0,
            key(ItemKind::Proposal, 1),
            ActionKind::Approve,
            serde_json::Value::Null,
        );
        let Some(Effect::Mutate { seq, action }) = effects
            .iter()
            .find(|e| matches!(e, Effect::Mutate { .. }))
            .cloned()
        else {
            panic!("immediate action emits a mutation");
        };
        assert_eq!(action.kind, ActionKind::Approve);
        assert_eq!(engine.queue().len(), 1, "optimistically hidden (case 10)");

        engine.handle_mutation(100, seq, Err("timeout".to_string()));
        assert_eq!(engine.queue().len(), 3, "restored on failure");
        assert_eq!(
            engine.notices().last().expect("notice").code,
            ErrorCode::MutationFailed
        );
    }

    #[test]
    fn acting_on_a_vanished_item_raises_not_found() {
        let mut engine = started_engine();
        let effects = engine.stage(
            0,
            key(ItemKind::Review, 999),
            ActionKind::Dismiss,
            serde_json::Value::Null,
        );
        assert!(effects.is_empty());
        assert_eq!(
            engine.notices().last().expect("notice").code,
            ErrorCode::ItemNotFound
        );
    }

    #[test]
    fn push_signal_triggers_refresh_poll() {
        let mut engine = started_engine();
        let effects = engine.handle_push(
            1_000,
            PushEvent::Signal(crate::model::SignalKind::CaseChanged),
        );
        assert!(
            effects
                .iter()
                .any(|e| matches!(e, Effect::FetchSnapshot { .. }))
        );
    }

    #[test]
    fn channel_reconnects_once_after_fixed_delay() {
        let mut engine = started_engine();
        engine.handle_push(0, PushEvent::Opened);
        assert!(engine.connection().connected);

        engine.handle_push(1_000, PushEvent::Closed);
        assert!(!engine.connection().connected);

        let effects = engine.tick(5_999);
        assert!(!effects.contains(&Effect::Connect), "not due yet");

        let effects = engine.tick(6_000);
        assert_eq!(
            effects.iter().filter(|e| **e == Effect::Connect).count(),
            1,
            "exactly one reconnect at closed + 5s"
        );

        let effects = engine.tick(6_100);
        assert!(!effects.contains(&Effect::Connect), "no duplicate dials");
    }

    #[test]
    fn recurring_poll_fires_on_interval() {
        let mut engine = started_engine();
        let effects = engine.tick(14_999);
        assert!(
            !effects
                .iter()
                .any(|e| matches!(e, Effect::FetchSnapshot { .. }))
        );

        let effects = engine.tick(15_000);
        assert!(
            effects
                .iter()
                .any(|e| matches!(e, Effect::FetchSnapshot { .. }))
        );

        // Rescheduled relative to the fire time.
        let effects = engine.tick(29_000);
        assert!(
            !effects
                .iter()
                .any(|e| matches!(e, Effect::FetchSnapshot { .. }))
        );
    }

    #[test]
    fn deep_link_selects_matching_case_on_first_population() {
        let mut engine = Engine::new(EngineConfig::default(), Some(42)).expect("valid config");
        engine.start(0);
        let effects = engine.handle_poll(0, 1, Ok(snapshot()));

        // First item with case 42 is proposal 2 at index 1.
        assert_eq!(engine.selected_index(), Some(1));
        assert!(effects.contains(&Effect::PublishSelection { case_id: Some(42) }));
        assert!(engine.notices().is_empty());
    }

    #[test]
    fn deep_link_miss_is_non_fatal() {
        let mut engine = Engine::new(EngineConfig::default(), Some(999)).expect("valid config");
        engine.start(0);
        engine.handle_poll(0, 1, Ok(snapshot()));

        assert_eq!(engine.selected_index(), Some(0), "falls back to first item");
        let notice = engine.notices().last().expect("non-fatal notice");
        assert_eq!(notice.code, ErrorCode::DeepLinkNotFound);
        assert_eq!(notice.severity, Severity::Info);

        // Import happens once: a later snapshot containing the case does
        // not yank the selection.
        let mut later = snapshot();
        later.reviews.push(crate::model::ReviewCase {
            id: 999,
            case_id: 999,
            ..crate::model::ReviewCase::default()
        });
        engine.handle_poll(1_000, 2, Ok(later));
        assert_eq!(engine.selected_index(), Some(0));
    }

    #[test]
    fn selection_publishes_only_on_change() {
        let mut engine = started_engine();
        let effects = engine.step(1);
        assert_eq!(
            effects,
            vec![Effect::PublishSelection { case_id: Some(42) }]
        );

        // Stepping across the two case-42 representations is not a change.
        let effects = engine.step(1);
        assert!(effects.is_empty(), "same case id republished nowhere");

        let effects = engine.step(1);
        assert_eq!(
            effects,
            vec![Effect::PublishSelection { case_id: Some(10) }]
        );
    }

    #[test]
    fn kind_filter_restricts_queue_and_reclamps() {
        let mut engine = started_engine();
        engine.step(1);
        engine.step(1); // index 2 (review:42)

        engine.set_kind_filter(Some(ItemKind::Proposal));
        assert_eq!(engine.queue().len(), 2);
        assert_eq!(engine.selected_index(), Some(1), "cursor clamped");

        engine.set_kind_filter(None);
        assert_eq!(engine.queue().len(), 3);
    }

    #[test]
    fn dismiss_notice_removes_it() {
        let mut engine = started_engine();
        engine.stage(
            0,
            key(ItemKind::Review, 999),
            ActionKind::Dismiss,
            serde_json::Value::Null,
        );
        let seq = engine.notices().last().expect("notice").seq;
        engine.dismiss_notice(seq);
        assert!(engine.notices().is_empty());
    }

    #[test]
    fn disposed_engine_ignores_every_input() {
        let mut engine = started_engine();
        engine.stage(
            0,
            key(ItemKind::Proposal, 2),
            ActionKind::Dismiss,
            serde_json::Value::Null,
        );
        engine.dispose();

        assert!(engine.tick(60_000).is_empty(), "no timer fires post-dispose");
        assert!(engine.handle_poll(0, 99, Ok(snapshot())).is_empty());
        assert!(engine.handle_push(0, PushEvent::Opened).is_empty());
        assert!(
            engine
                .stage(
                    0,
                    key(ItemKind::Proposal, 1),
                    ActionKind::Dismiss,
                    serde_json::Value::Null,
                )
                .is_empty()
        );
        assert!(!engine.connection().connected);
    }

    #[test]
    fn empty_queue_has_no_selection() {
        let mut engine = engine();
        engine.start(0);
        engine.handle_poll(0, 1, Ok(Snapshot::default()));
        assert!(engine.selected_index().is_none());
        assert!(engine.selected().is_none());
        assert!(engine.step(1).is_empty());
    }
}
