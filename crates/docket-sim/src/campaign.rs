//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds, collecting pass/fail results and identifying the
//! first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use docket_core::config::EngineConfig;

use crate::backend::FaultPlan;
use crate::harness::{Simulation, SimulationConfig};

/// Campaign-level configuration: how many seeds, and what parameters each
/// seeded session runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g. `0..100`.
    pub seed_range: Range<u64>,
    /// Scripted-phase length per seed in virtual milliseconds.
    pub duration_millis: i64,
    /// Cases seeded into each backend.
    pub case_count: u64,
    /// Percentage chance per step that the operator acts.
    pub operator_action_percent: u8,
    /// Fault injection knobs shared by every seed.
    pub fault: FaultPlan,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..100,
            duration_millis: 60_000,
            case_count: 12,
            operator_action_percent: 40,
            fault: FaultPlan::default(),
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            duration_millis: self.duration_millis,
            case_count: self.case_count,
            operator_action_percent: self.operator_action_percent,
            fault: self.fault,
            engine: EngineConfig::default(),
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    /// The seed that failed.
    pub seed: u64,
    /// Invariant violations found.
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Total seeds executed.
    pub seeds_run: usize,
    /// Seeds that passed all invariants.
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    /// Every failing seed with its violations.
    pub failures: Vec<SeedFailure>,
}

impl CampaignReport {
    /// True when every seed passed.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.first_failure.is_none()
    }
}

/// Run every seed in the range and aggregate the verdicts.
///
/// # Errors
///
/// Returns an error for an invalid config or a seed that fails to quiesce.
pub fn run_campaign(cfg: &CampaignConfig) -> Result<CampaignReport> {
    cfg.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
    };

    for seed in cfg.seed_range.clone() {
        let result = Simulation::new(cfg.sim_config_for_seed(seed))?.run()?;
        report.seeds_run += 1;

        if result.oracle.passed {
            report.seeds_passed += 1;
        } else {
            tracing::warn!(seed, violations = result.oracle.violations.len(), "seed failed");
            if report.first_failure.is_none() {
                report.first_failure = Some(seed);
            }
            report.failures.push(SeedFailure {
                seed,
                violations: result
                    .oracle
                    .violations
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            });
        }
    }

    tracing::info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed,
        "campaign complete"
    );
    Ok(report)
}
