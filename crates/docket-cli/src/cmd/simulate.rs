//! `dk simulate`: deterministic simulation campaigns against the engine.
//!
//! Runs many seeded sessions with fault injection and reports invariant
//! verdicts; a failing seed can be replayed exactly with `--seed`.

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;

use docket_sim::backend::FaultPlan;
use docket_sim::campaign::{CampaignConfig, run_campaign};
use docket_sim::harness::{Simulation, SimulationConfig};

use crate::output::{OutputMode, pretty_kv, pretty_section};

/// Arguments for `dk simulate`.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of seeds to run (starting from --seed-start).
    #[arg(long, default_value = "100", conflicts_with = "seed")]
    pub seeds: u64,

    /// Starting seed value.
    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    /// Replay a single seed with full statistics.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Scripted-phase length per seed, in virtual seconds.
    #[arg(long, default_value = "60")]
    pub duration_secs: u32,

    /// Cases seeded into each simulated backend.
    #[arg(long, default_value = "12")]
    pub cases: u64,

    /// Overall fault probability between 0.0 and 1.0 (scales poll
    /// failures, mutation failures, disconnects, and churn).
    #[arg(long, default_value = "0.2")]
    pub faults: f64,
}

/// JSON output for a campaign run.
#[derive(Debug, Serialize)]
struct CampaignOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    all_passed: bool,
    failures: Vec<FailureOutput>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    seed: u64,
    violations: Vec<String>,
}

/// JSON output for a single-seed replay.
#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    steps: u64,
    polls_served: u64,
    polls_failed: u64,
    commits_run: u64,
    mutations_run: u64,
    disconnects: u64,
    oracle_passed: bool,
    violations: Vec<String>,
}

fn fault_plan(faults: f64) -> FaultPlan {
    FaultPlan {
        poll_fail_percent: scale_fault(faults, 50),
        mutate_fail_percent: scale_fault(faults, 50),
        disconnect_percent: scale_fault(faults, 15),
        churn_percent: scale_fault(faults, 40),
        ..FaultPlan::default()
    }
}

/// Scale a base fault probability (0.0-1.0) by a weight to a percent.
fn scale_fault(base: f64, weight_pct: u8) -> u8 {
    let raw = (base * f64::from(weight_pct)).clamp(0.0, 100.0);
    // Percent fits in u8 after the clamp.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = raw as u8;
    percent
}

/// Execute `dk simulate`.
///
/// # Errors
///
/// Returns an error for invalid parameters, a seed that fails to quiesce,
/// or when any seed violates an invariant.
pub fn run_simulate(args: &SimulateArgs, output: OutputMode) -> Result<()> {
    if !(0.0..=1.0).contains(&args.faults) {
        bail!("--faults must be between 0.0 and 1.0");
    }
    let duration_millis = i64::from(args.duration_secs) * 1_000;

    if let Some(seed) = args.seed {
        return replay_seed(args, seed, duration_millis, output);
    }

    let config = CampaignConfig {
        seed_range: args.seed_start..(args.seed_start + args.seeds),
        duration_millis,
        case_count: args.cases,
        operator_action_percent: 40,
        fault: fault_plan(args.faults),
    };
    let report = run_campaign(&config)?;

    let out = CampaignOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        all_passed: report.all_passed(),
        failures: report
            .failures
            .iter()
            .map(|f| FailureOutput {
                seed: f.seed,
                violations: f.violations.clone(),
            })
            .collect(),
    };

    if output.is_json() {
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let mut stdout = std::io::stdout();
        pretty_section(&mut stdout, "Simulation campaign")?;
        pretty_kv(&mut stdout, "seeds", format!("{}", out.seeds_run))?;
        pretty_kv(&mut stdout, "passed", format!("{}", out.seeds_passed))?;
        pretty_kv(&mut stdout, "failed", format!("{}", out.seeds_failed))?;
        if let Some(first) = out.first_failure {
            pretty_kv(&mut stdout, "replay", format!("dk simulate --seed {first}"))?;
            for failure in out.failures.iter().take(5) {
                for violation in &failure.violations {
                    pretty_kv(&mut stdout, "violation", format!("seed {}: {violation}", failure.seed))?;
                }
            }
        }
    }

    if !out.all_passed {
        bail!(
            "{} of {} seeds failed invariants",
            out.seeds_failed,
            out.seeds_run
        );
    }
    Ok(())
}

fn replay_seed(
    args: &SimulateArgs,
    seed: u64,
    duration_millis: i64,
    output: OutputMode,
) -> Result<()> {
    let config = SimulationConfig {
        seed,
        duration_millis,
        case_count: args.cases,
        fault: fault_plan(args.faults),
        ..SimulationConfig::default()
    };
    let result = Simulation::new(config)?.run()?;

    let out = ReplayOutput {
        seed: result.seed,
        steps: result.steps,
        polls_served: result.polls_served,
        polls_failed: result.polls_failed,
        commits_run: result.commits_run,
        mutations_run: result.mutations_run,
        disconnects: result.disconnects,
        oracle_passed: result.oracle.passed,
        violations: result
            .oracle
            .violations
            .iter()
            .map(ToString::to_string)
            .collect(),
    };

    if output.is_json() {
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let mut stdout = std::io::stdout();
        pretty_section(&mut stdout, &format!("Seed {seed} replay"))?;
        pretty_kv(&mut stdout, "steps", format!("{}", out.steps))?;
        pretty_kv(&mut stdout, "polls", format!("{} ok, {} failed", out.polls_served, out.polls_failed))?;
        pretty_kv(&mut stdout, "commits", format!("{}", out.commits_run))?;
        pretty_kv(&mut stdout, "mutations", format!("{}", out.mutations_run))?;
        pretty_kv(&mut stdout, "disconnects", format!("{}", out.disconnects))?;
        pretty_kv(&mut stdout, "oracle", if out.oracle_passed { "passed" } else { "FAILED" })?;
        for violation in &out.violations {
            pretty_kv(&mut stdout, "violation", violation)?;
        }
    }

    if !out.oracle_passed {
        bail!("seed {seed} violated invariants");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{fault_plan, scale_fault};

    #[test]
    fn fault_scaling_clamps() {
        assert_eq!(scale_fault(0.0, 50), 0);
        assert_eq!(scale_fault(1.0, 50), 50);
        assert_eq!(scale_fault(1.0, 100), 100);
    }

    #[test]
    fn zero_faults_means_quiet_knobs() {
        let plan = fault_plan(0.0);
        assert_eq!(plan.poll_fail_percent, 0);
        assert_eq!(plan.mutate_fail_percent, 0);
        assert_eq!(plan.disconnect_percent, 0);
        assert_eq!(plan.churn_percent, 0);
    }
}
