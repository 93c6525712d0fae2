//! Seeded single-session simulation.
//!
//! One virtual operator works a queue against a simulated backend while
//! faults land: failed polls, failed mutations, dropped push connections,
//! variable latency, out-of-order responses, server-side churn. The run
//! ends with a quiescence phase (faults off, everything in flight allowed
//! to settle, one final refresh) and the [`SessionOracle`] verdict.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use docket_core::config::EngineConfig;
use docket_core::engine::{Effect, Engine, PushEvent};
use docket_core::model::{ActionKind, Millis, SignalKind, Snapshot};
use docket_core::undo::UndoToken;

use crate::backend::{FaultPlan, SimulatedBackend};
use crate::oracle::{HostLedger, OracleResult, SessionOracle};
use crate::rng::DeterministicRng;

/// Virtual time per simulation step.
const STEP_MILLIS: Millis = 250;

/// Parameters for a single seeded run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed; fully determines the run.
    pub seed: u64,
    /// Length of the scripted phase in virtual milliseconds.
    pub duration_millis: Millis,
    /// Cases seeded into the backend.
    pub case_count: u64,
    /// Percentage chance per step that the operator does something.
    pub operator_action_percent: u8,
    /// Fault injection knobs.
    pub fault: FaultPlan,
    /// Engine timing configuration.
    pub engine: EngineConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            duration_millis: 120_000,
            case_count: 12,
            operator_action_percent: 35,
            fault: FaultPlan::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.duration_millis <= 0 {
            bail!("duration_millis must be > 0");
        }
        if self.case_count == 0 {
            bail!("case_count must be > 0");
        }
        if self.fault.max_latency_millis < self.fault.min_latency_millis {
            bail!("max_latency_millis must be >= min_latency_millis");
        }
        self.engine.validate()
    }
}

/// Outcome of a single seeded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    pub seed: u64,
    pub steps: u64,
    pub polls_served: u64,
    pub polls_failed: u64,
    pub commits_run: u64,
    pub mutations_run: u64,
    pub disconnects: u64,
    pub oracle: OracleResult,
}

/// A backend response or push event in flight.
#[derive(Debug, Clone)]
enum Arrival {
    PollDone {
        generation: u64,
        result: Result<Snapshot, String>,
    },
    CommitDone {
        token: UndoToken,
        result: Result<(), String>,
    },
    MutateDone {
        seq: u64,
        result: Result<(), String>,
    },
    PushOpened,
    Signal(SignalKind),
}

#[derive(Debug, Clone)]
struct Scheduled {
    at: Millis,
    seq: u64,
    arrival: Arrival,
}

// Heap ordering is by arrival time, ties broken by issue order.
impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap pops the earliest arrival first.
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

/// One seeded session: engine, backend, virtual clock, in-flight traffic.
pub struct Simulation {
    cfg: SimulationConfig,
    rng: DeterministicRng,
    backend: SimulatedBackend,
    engine: Engine,
    in_flight: BinaryHeap<Scheduled>,
    next_arrival_seq: u64,
    now: Millis,
    fault: FaultPlan,
    scripted: bool,
    connection_live: bool,
    live_connections: usize,
    seen_commit_tokens: BTreeSet<UndoToken>,
    ledger: HostLedger,
    steps: u64,
    polls_served: u64,
    polls_failed: u64,
    commits_run: u64,
    mutations_run: u64,
    disconnects: u64,
}

impl Simulation {
    /// Build a simulation from config.
    ///
    /// # Errors
    ///
    /// Returns an error when the config fails validation.
    pub fn new(cfg: SimulationConfig) -> Result<Self> {
        cfg.validate()?;
        let engine = Engine::new(cfg.engine, None)?;
        Ok(Self {
            rng: DeterministicRng::new(cfg.seed),
            backend: SimulatedBackend::new(cfg.case_count),
            engine,
            in_flight: BinaryHeap::new(),
            next_arrival_seq: 0,
            now: 0,
            fault: cfg.fault,
            scripted: true,
            connection_live: false,
            live_connections: 0,
            seen_commit_tokens: BTreeSet::new(),
            ledger: HostLedger::default(),
            steps: 0,
            polls_served: 0,
            polls_failed: 0,
            commits_run: 0,
            mutations_run: 0,
            disconnects: 0,
            cfg,
        })
    }

    /// Run the full session and return the oracle verdict.
    ///
    /// # Errors
    ///
    /// Returns an error if the run fails to quiesce.
    pub fn run(mut self) -> Result<SimulationResult> {
        let effects = self.engine.start(self.now);
        self.perform(effects);

        while self.now < self.cfg.duration_millis {
            self.advance();
        }

        self.quiesce()?;

        let oracle = SessionOracle::check_all(&self.engine, &self.backend, &self.ledger);
        Ok(SimulationResult {
            seed: self.cfg.seed,
            steps: self.steps,
            polls_served: self.polls_served,
            polls_failed: self.polls_failed,
            commits_run: self.commits_run,
            mutations_run: self.mutations_run,
            disconnects: self.disconnects,
            oracle,
        })
    }

    /// Faults off, operator idle; drain everything in flight, then refresh
    /// once so the last applied snapshot is current truth.
    fn quiesce(&mut self) -> Result<()> {
        self.scripted = false;
        self.fault = FaultPlan::quiet();
        let effects = self.engine.set_kind_filter(None);
        self.perform(effects);

        self.drain()?;
        let effects = self.engine.refresh(self.now);
        self.perform(effects);
        self.drain()
    }

    fn drain(&mut self) -> Result<()> {
        let mut budget = 10_000_u32;
        while !self.in_flight.is_empty() || self.engine.armed_undo(self.now).is_some() {
            self.advance();
            budget -= 1;
            if budget == 0 {
                bail!("simulation failed to quiesce (seed {})", self.cfg.seed);
            }
        }
        Ok(())
    }

    /// One virtual step: deliver due traffic, fire timers, inject faults,
    /// maybe act as the operator.
    fn advance(&mut self) {
        self.now += STEP_MILLIS;
        self.steps += 1;

        while let Some(head) = self.in_flight.peek() {
            if head.at > self.now {
                break;
            }
            let scheduled = self.in_flight.pop().expect("peeked entry exists");
            self.deliver(scheduled.arrival);
        }

        let effects = self.engine.tick(self.now);
        self.perform(effects);

        if self.connection_live && self.rng.hit_rate_percent(self.fault.disconnect_percent) {
            self.disconnects += 1;
            self.connection_live = false;
            self.live_connections = self.live_connections.saturating_sub(1);
            let effects = self.engine.handle_push(self.now, PushEvent::Closed);
            self.perform(effects);
        }

        if self.rng.hit_rate_percent(self.fault.churn_percent) {
            self.churn();
        }

        if self.scripted && self.rng.hit_rate_percent(self.cfg.operator_action_percent) {
            self.operator_action();
        }
    }

    fn deliver(&mut self, arrival: Arrival) {
        let effects = match arrival {
            Arrival::PollDone { generation, result } => {
                self.engine.handle_poll(self.now, generation, result)
            }
            Arrival::CommitDone { token, result } => {
                self.engine.handle_commit(self.now, token, result)
            }
            Arrival::MutateDone { seq, result } => {
                self.engine.handle_mutation(self.now, seq, result)
            }
            Arrival::PushOpened => {
                self.connection_live = true;
                self.live_connections += 1;
                self.ledger.peak_connections = self.ledger.peak_connections.max(self.live_connections);
                self.engine.handle_push(self.now, PushEvent::Opened)
            }
            Arrival::Signal(kind) => self.engine.handle_push(self.now, PushEvent::Signal(kind)),
        };
        self.perform(effects);
    }

    /// Perform effects the way a real host would, with injected faults and
    /// latency. Backend mutations land at request time; only the response
    /// is delayed.
    fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::FetchSnapshot { generation } => {
                    let result = if self.rng.hit_rate_percent(self.fault.poll_fail_percent) {
                        self.polls_failed += 1;
                        Err("injected poll failure".to_string())
                    } else {
                        self.polls_served += 1;
                        Ok(self.backend.snapshot())
                    };
                    self.schedule(Arrival::PollDone { generation, result });
                }
                Effect::Connect => {
                    self.schedule(Arrival::PushOpened);
                }
                Effect::Commit { token, action } => {
                    self.commits_run += 1;
                    if !self.seen_commit_tokens.insert(token) {
                        self.ledger.duplicate_commit_tokens.push(token.to_string());
                    }
                    let result = if self.rng.hit_rate_percent(self.fault.mutate_fail_percent) {
                        Err("injected commit failure".to_string())
                    } else {
                        let result = self.backend.apply(&action);
                        self.emit_signal(SignalKind::CaseChanged);
                        result
                    };
                    self.schedule(Arrival::CommitDone { token, result });
                }
                Effect::Mutate { seq, action } => {
                    self.mutations_run += 1;
                    let result = if self.rng.hit_rate_percent(self.fault.mutate_fail_percent) {
                        Err("injected mutation failure".to_string())
                    } else {
                        let result = self.backend.apply(&action);
                        self.emit_signal(SignalKind::ProposalChanged);
                        result
                    };
                    self.schedule(Arrival::MutateDone { seq, result });
                }
                Effect::PublishSelection { .. } => {}
            }
        }
    }

    fn schedule(&mut self, arrival: Arrival) {
        let latency = self
            .rng
            .latency_millis(self.fault.min_latency_millis, self.fault.max_latency_millis);
        let seq = self.next_arrival_seq;
        self.next_arrival_seq += 1;
        self.in_flight.push(Scheduled {
            at: self.now + latency,
            seq,
            arrival,
        });
    }

    fn emit_signal(&mut self, kind: SignalKind) {
        if self.connection_live {
            self.schedule(Arrival::Signal(kind));
        }
    }

    /// Server-side churn: a case resolves elsewhere or a new one arrives.
    fn churn(&mut self) {
        if self.rng.next_bounded(2) == 0 {
            self.backend.add_case();
        } else if let Some(case_id) = self.backend.random_case(&mut self.rng) {
            self.backend.remove_case(case_id);
        }
        self.emit_signal(SignalKind::ProposalChanged);
    }

    /// One weighted operator action against the current view.
    fn operator_action(&mut self) {
        let selected_key = self.engine.selected().map(docket_core::model::WorkItem::key);
        let effects = match self.rng.next_bounded(12) {
            0..=3 => self.engine.step(1),
            4 | 5 => self.engine.step(-1),
            6 | 7 => selected_key.map_or_else(Vec::new, |key| {
                self.engine
                    .stage(self.now, key, ActionKind::Dismiss, serde_json::Value::Null)
            }),
            8 => self.engine.cancel_undo(self.now),
            9 => selected_key.map_or_else(Vec::new, |key| {
                self.engine
                    .apply_now(self.now, key, ActionKind::Approve, serde_json::Value::Null)
            }),
            10 => self.engine.refresh(self.now),
            _ => {
                let filter = match self.rng.next_bounded(3) {
                    0 => Some(docket_core::model::ItemKind::Proposal),
                    1 => Some(docket_core::model::ItemKind::Review),
                    _ => None,
                };
                self.engine.set_kind_filter(filter)
            }
        };
        self.perform(effects);
    }
}
