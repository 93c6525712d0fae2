//! docket-sim: deterministic simulation harness for the synchronization
//! engine.
//!
//! A seed fully determines a run: the operator script, server churn, fault
//! injection, and every latency draw come from one [`rng::DeterministicRng`].
//! A failing campaign seed can therefore be replayed exactly.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for return types.
//! - **Logging**: `tracing` macros; the campaign runner logs one line per
//!   failing seed.

pub mod backend;
pub mod campaign;
pub mod harness;
pub mod oracle;
pub mod rng;

pub use backend::{FaultPlan, SimulatedBackend};
pub use campaign::{CampaignConfig, CampaignReport, run_campaign};
pub use harness::{Simulation, SimulationConfig, SimulationResult};
pub use oracle::{OracleResult, SessionOracle};
