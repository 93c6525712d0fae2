use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use docket_core::model::{ActionRef, Proposal, ReviewCase, Snapshot};

use crate::rng::DeterministicRng;

/// Fault injection configuration for the simulated backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPlan {
    /// Percentage of snapshot polls that fail.
    pub poll_fail_percent: u8,
    /// Percentage of mutations (commits and immediate actions) that fail.
    pub mutate_fail_percent: u8,
    /// Percentage chance per step that a live push connection drops.
    pub disconnect_percent: u8,
    /// Percentage chance per step of server-side churn (a case resolving
    /// on its own or a new one arriving).
    pub churn_percent: u8,
    /// Minimum simulated request latency.
    pub min_latency_millis: i64,
    /// Maximum simulated request latency.
    pub max_latency_millis: i64,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            poll_fail_percent: 10,
            mutate_fail_percent: 10,
            disconnect_percent: 3,
            churn_percent: 8,
            min_latency_millis: 20,
            max_latency_millis: 900,
        }
    }
}

impl FaultPlan {
    /// A plan with no faults and fixed latency, used for the quiescence
    /// phase so every in-flight operation settles cleanly.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            poll_fail_percent: 0,
            mutate_fail_percent: 0,
            disconnect_percent: 0,
            churn_percent: 0,
            min_latency_millis: 20,
            max_latency_millis: 20,
        }
    }
}

/// Authoritative server state plus an application ledger.
///
/// The backend resolves actions at case granularity: applying any decision
/// to an item removes every work item belonging to that case, mirroring
/// how the real service closes out a records request.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    proposals: Vec<Proposal>,
    reviews: Vec<ReviewCase>,
    next_id: u64,
    /// Times each case had a decision applied. The oracle asserts no case
    /// is decided twice by the same session.
    applied: BTreeMap<u64, u32>,
}

impl SimulatedBackend {
    /// Seed the backend with `case_count` cases. Every third case gets a
    /// review representation alongside its proposal.
    #[must_use]
    pub fn new(case_count: u64) -> Self {
        let mut backend = Self {
            proposals: Vec::new(),
            reviews: Vec::new(),
            next_id: 1,
            applied: BTreeMap::new(),
        };
        for _ in 0..case_count {
            backend.add_case();
        }
        backend
    }

    /// Add a fresh case; returns its id.
    pub fn add_case(&mut self) -> u64 {
        let case_id = self.next_id;
        self.next_id += 1;
        let name = format!("case-{case_id}");
        self.proposals.push(Proposal {
            id: case_id,
            case_id,
            case_name: name.clone(),
            ..Proposal::default()
        });
        if case_id % 3 == 0 {
            self.reviews.push(ReviewCase {
                id: case_id,
                case_id,
                case_name: name,
                ..ReviewCase::default()
            });
        }
        case_id
    }

    /// Remove a case outright (server-side churn).
    pub fn remove_case(&mut self, case_id: u64) {
        self.proposals.retain(|p| p.case_id != case_id);
        self.reviews.retain(|r| r.case_id != case_id);
    }

    /// Pick a random live case id, if any.
    #[must_use]
    pub fn random_case(&self, rng: &mut DeterministicRng) -> Option<u64> {
        let mut ids: Vec<u64> = self.proposals.iter().map(|p| p.case_id).collect();
        ids.extend(self.reviews.iter().map(|r| r.case_id));
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            None
        } else {
            Some(ids[rng.next_index(ids.len())])
        }
    }

    /// Serve a full snapshot of current truth.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            proposals: self.proposals.clone(),
            reviews: self.reviews.clone(),
            open_requests: u32::try_from(self.proposals.len()).unwrap_or(u32::MAX),
            pending_reviews: u32::try_from(self.reviews.len()).unwrap_or(u32::MAX),
        }
    }

    /// Apply a decision. Resolving an already-resolved case succeeds as a
    /// no-op, the way the real service treats a repeated decision.
    pub fn apply(&mut self, action: &ActionRef) -> Result<(), String> {
        let case_id = action.case_id;
        let live = self.proposals.iter().any(|p| p.case_id == case_id)
            || self.reviews.iter().any(|r| r.case_id == case_id);
        if live {
            *self.applied.entry(case_id).or_insert(0) += 1;
            self.remove_case(case_id);
        }
        Ok(())
    }

    /// Cases decided more than once.
    #[must_use]
    pub fn double_decided_cases(&self) -> Vec<u64> {
        self.applied
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(case_id, _)| *case_id)
            .collect()
    }

    /// Number of live work items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proposals.len() + self.reviews.len()
    }

    /// True when no work items remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty() && self.reviews.is_empty()
    }
}
