use docket_core::engine::Engine;
use docket_core::queue::{self, ExclusionSet};

use crate::backend::SimulatedBackend;

// ── Core result types ────────────────────────────────────────────────────────

/// Oracle result for an invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    /// Detailed description of every invariant that was violated.
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn fail(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: false,
            violations,
        }
    }

    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// After quiescence the visible queue differs from server truth.
    ///
    /// Emitted by `check_convergence`.
    Convergence {
        /// Items the engine shows that the server no longer has.
        phantom: Vec<String>,
        /// Items the server has that the engine hides.
        missing: Vec<String>,
    },

    /// An exclusion key survived quiescence; some item is hidden forever.
    ///
    /// Emitted by `check_no_orphans`.
    OrphanedExclusion {
        /// Display form of the surviving keys.
        keys: Vec<String>,
    },

    /// The cursor points outside the visible queue.
    ///
    /// Emitted by `check_cursor`.
    CursorOutOfBounds { index: usize, len: usize },

    /// A case had a decision applied more than once in a single session.
    ///
    /// Emitted by `check_commit_once`.
    DoubleCommit { case_ids: Vec<u64> },

    /// An undo token was handed to the host for commit more than once.
    ///
    /// Emitted by `check_commit_once`.
    DuplicateCommitEffect { tokens: Vec<String> },

    /// More than one push connection was live at the same instant.
    ///
    /// Emitted by `check_single_connection`.
    ConcurrentConnections { peak: usize },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Convergence { phantom, missing } => write!(
                f,
                "queue diverged from server truth (phantom: {phantom:?}, missing: {missing:?})"
            ),
            Self::OrphanedExclusion { keys } => {
                write!(f, "exclusions survived reconciliation: {keys:?}")
            }
            Self::CursorOutOfBounds { index, len } => {
                write!(f, "cursor at {index} outside queue of {len}")
            }
            Self::DoubleCommit { case_ids } => {
                write!(f, "cases decided more than once: {case_ids:?}")
            }
            Self::DuplicateCommitEffect { tokens } => {
                write!(f, "commit effects reused tokens: {tokens:?}")
            }
            Self::ConcurrentConnections { peak } => {
                write!(f, "{peak} push connections were live at once")
            }
        }
    }
}

/// Host-side counters the harness accumulates for the oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostLedger {
    /// Undo tokens handed out in `Commit` effects more than once.
    pub duplicate_commit_tokens: Vec<String>,
    /// Highest number of simultaneously live push connections.
    pub peak_connections: usize,
}

// ── Checks ───────────────────────────────────────────────────────────────────

/// End-of-run invariant oracle. Call only after quiescence: no in-flight
/// requests, no armed undo, and a final successful poll applied.
pub struct SessionOracle;

impl SessionOracle {
    /// Run every invariant check and accumulate failures.
    #[must_use]
    pub fn check_all(
        engine: &Engine,
        backend: &SimulatedBackend,
        ledger: &HostLedger,
    ) -> OracleResult {
        Self::check_convergence(engine, backend)
            .merge(Self::check_no_orphans(engine))
            .merge(Self::check_cursor(engine))
            .merge(Self::check_commit_once(backend, ledger))
            .merge(Self::check_single_connection(ledger))
    }

    /// The visible queue equals the projection of server truth.
    #[must_use]
    pub fn check_convergence(engine: &Engine, backend: &SimulatedBackend) -> OracleResult {
        let truth = backend.snapshot();
        let expected = queue::project(&truth, &ExclusionSet::default(), None);
        let visible = engine.queue();

        if visible == expected.as_slice() {
            return OracleResult::pass();
        }
        let phantom = visible
            .iter()
            .filter(|i| !expected.contains(i))
            .map(|i| i.key().to_string())
            .collect();
        let missing = expected
            .iter()
            .filter(|i| !visible.contains(i))
            .map(|i| i.key().to_string())
            .collect();
        OracleResult::fail(vec![InvariantViolation::Convergence { phantom, missing }])
    }

    /// No exclusion outlives reconciliation.
    #[must_use]
    pub fn check_no_orphans(engine: &Engine) -> OracleResult {
        if engine.excluded_len() == 0 {
            OracleResult::pass()
        } else {
            OracleResult::fail(vec![InvariantViolation::OrphanedExclusion {
                keys: vec![format!("{} surviving keys", engine.excluded_len())],
            }])
        }
    }

    /// The cursor is a valid index or absent on an empty queue.
    #[must_use]
    pub fn check_cursor(engine: &Engine) -> OracleResult {
        let len = engine.queue().len();
        match engine.selected_index() {
            None if len == 0 => OracleResult::pass(),
            Some(index) if index < len => OracleResult::pass(),
            Some(index) => {
                OracleResult::fail(vec![InvariantViolation::CursorOutOfBounds { index, len }])
            }
            None => OracleResult::fail(vec![InvariantViolation::CursorOutOfBounds {
                index: 0,
                len,
            }]),
        }
    }

    /// Every decision lands at most once, and every commit effect carries a
    /// fresh token.
    #[must_use]
    pub fn check_commit_once(backend: &SimulatedBackend, ledger: &HostLedger) -> OracleResult {
        let mut violations = Vec::new();
        let doubled = backend.double_decided_cases();
        if !doubled.is_empty() {
            violations.push(InvariantViolation::DoubleCommit { case_ids: doubled });
        }
        if !ledger.duplicate_commit_tokens.is_empty() {
            violations.push(InvariantViolation::DuplicateCommitEffect {
                tokens: ledger.duplicate_commit_tokens.clone(),
            });
        }
        if violations.is_empty() {
            OracleResult::pass()
        } else {
            OracleResult::fail(violations)
        }
    }

    /// At most one push connection is ever live.
    #[must_use]
    pub fn check_single_connection(ledger: &HostLedger) -> OracleResult {
        if ledger.peak_connections <= 1 {
            OracleResult::pass()
        } else {
            OracleResult::fail(vec![InvariantViolation::ConcurrentConnections {
                peak: ledger.peak_connections,
            }])
        }
    }
}
