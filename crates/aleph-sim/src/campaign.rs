//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with the same parameters, collecting pass/fail
//! results and identifying the first failing seed for replay.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::oracle::{InvariantViolation, OracleResult, OrderingOracle};
use crate::{CampaignConfig, SimulationResult, Simulator};

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    /// Human-readable invariant violations.
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that hit a drop, partition or equivocation.
    pub interesting_states_reached: usize,
    /// Shortest converged linear order over all seeds.
    pub min_final_order_len: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Detailed outcome of replaying a single seed.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Outcome of one seed: the simulation plus the oracle verdict.
#[derive(Debug, Clone)]
pub struct SeedOutcome {
    pub result: SimulationResult,
    pub verdict: std::result::Result<(), Vec<InvariantViolation>>,
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut seeds_run = 0_usize;
    let mut seeds_passed = 0_usize;
    let mut first_failure: Option<u64> = None;
    let mut failures = Vec::new();
    let mut interesting_states_reached = 0_usize;
    let mut min_final_order_len = usize::MAX;

    for seed in config.seed_range.clone() {
        seeds_run += 1;

        let outcome = run_single_seed(seed, config)?;
        if outcome.result.interesting_state_reached {
            interesting_states_reached += 1;
        }
        min_final_order_len = min_final_order_len.min(outcome.result.final_order_len());

        match outcome.verdict {
            Ok(()) => seeds_passed += 1,
            Err(violations) => {
                warn!(seed, violations = violations.len(), "seed failed");
                first_failure.get_or_insert(seed);
                failures.push(SeedFailure {
                    seed,
                    violations: violations.iter().map(format_violation).collect(),
                });
            }
        }
    }

    info!(seeds_run, seeds_passed, "campaign complete");
    Ok(CampaignReport {
        seeds_run,
        seeds_passed,
        first_failure,
        failures,
        interesting_states_reached,
        min_final_order_len: if seeds_run == 0 { 0 } else { min_final_order_len },
    })
}

/// Run one seed and judge it with the oracle.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself fails (invalid
/// config, node construction bug). Invariant violations are reported in
/// [`SeedOutcome::verdict`].
pub fn run_single_seed(seed: u64, config: &CampaignConfig) -> Result<SeedOutcome> {
    let simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = OrderingOracle::check_all(&result);

    let verdict = if oracle.passed {
        Ok(())
    } else {
        Err(oracle.violations)
    };
    Ok(SeedOutcome { result, verdict })
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;

    let simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = OrderingOracle::check_all(&result);

    Ok(DetailedTrace { result, oracle })
}

/// Format an invariant violation into a human-readable string.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::Closure {
            participant,
            node,
            missing_parent,
        } => match missing_parent {
            Some(parent) => format!(
                "Closure: participant {participant} holds node {node} without parent {parent}"
            ),
            None => format!("Closure: participant {participant} view failed the closure check"),
        },
        InvariantViolation::OrderExtension {
            participant,
            node,
            parent,
        } => format!(
            "OrderExtension: participant {participant} ordered node {node} before parent {parent}"
        ),
        InvariantViolation::Finality {
            participant,
            snapshot,
        } => format!(
            "Finality: participant {participant} order #{} rewrote order #{snapshot}",
            snapshot + 1
        ),
        InvariantViolation::WellDefinedness {
            participant_a,
            participant_b,
            position,
        } => format!(
            "WellDefinedness: orders of participants {participant_a} and {participant_b} \
             differ at position {position}"
        ),
        InvariantViolation::Convergence {
            participant_a,
            participant_b,
            only_in_a,
            only_in_b,
            orders_differ,
        } => format!(
            "Convergence: participants {participant_a} and {participant_b} diverge \
             (only_in_a={only_in_a:?}, only_in_b={only_in_b:?}, orders_differ={orders_differ})"
        ),
        InvariantViolation::UndetectedEquivocation {
            participant,
            creator,
        } => format!(
            "UndetectedEquivocation: participant {participant} did not flag creator {creator}"
        ),
        InvariantViolation::HonestCreatorFlagged {
            participant,
            creator,
        } => format!(
            "HonestCreatorFlagged: participant {participant} flagged honest creator {creator}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulationConfig;
    use crate::network::FaultConfig;

    fn lossless(seeds: std::ops::Range<u64>) -> CampaignConfig {
        CampaignConfig {
            seed_range: seeds,
            simulation: SimulationConfig {
                participants: 4,
                byzantine: 1,
                steps: 16,
                equivocation_percent: 30,
                gossip_fanout: 1,
                fault: FaultConfig {
                    max_delay_steps: 2,
                    drop_rate_percent: 0,
                    duplicate_rate_percent: 5,
                    reorder_rate_percent: 10,
                    partition_rate_percent: 0,
                },
                ..SimulationConfig::default()
            },
        }
    }

    #[test]
    fn run_single_seed_passes() {
        let outcome = run_single_seed(0, &lossless(0..1)).expect("sim should not error");
        assert!(outcome.verdict.is_ok(), "seed 0 should pass: {:?}", outcome.verdict);
    }

    #[test]
    fn run_campaign_all_seeds_pass() {
        let report = run_campaign(&lossless(0..10)).expect("campaign should not error");
        assert_eq!(report.seeds_run, 10);
        assert_eq!(report.seeds_passed, 10);
        assert!(report.all_passed());
        assert!(report.first_failure.is_none());
        assert!(report.min_final_order_len > 0);
    }

    #[test]
    fn replay_seed_produces_detailed_trace() {
        let trace = replay_seed(42, &lossless(0..1)).expect("replay should not error");
        assert!(!trace.result.trace.is_empty());
        assert!(!trace.result.nodes.is_empty());
        assert!(trace.oracle.passed, "oracle should pass: {:?}", trace.oracle.violations);
    }

    #[test]
    fn replay_is_deterministic() {
        let config = CampaignConfig::default();
        let first = replay_seed(7, &config).expect("replay 1");
        let second = replay_seed(7, &config).expect("replay 2");
        assert_eq!(first.result, second.result);
    }

    #[test]
    fn invalid_campaign_is_rejected() {
        let config = CampaignConfig {
            seed_range: 3..3,
            ..CampaignConfig::default()
        };
        assert!(run_campaign(&config).is_err());
        assert!(replay_seed(3, &config).is_err());
    }

    #[test]
    fn campaign_report_serializes_to_json() {
        let report = CampaignReport {
            seeds_run: 10,
            seeds_passed: 9,
            first_failure: Some(7),
            failures: vec![SeedFailure {
                seed: 7,
                violations: vec!["Convergence: participants 0 and 1 diverge".into()],
            }],
            interesting_states_reached: 5,
            min_final_order_len: 12,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"seeds_run\":10"));
        assert!(json.contains("\"first_failure\":7"));
    }

    #[test]
    fn format_violation_produces_readable_strings() {
        let v = InvariantViolation::Convergence {
            participant_a: 0,
            participant_b: 1,
            only_in_a: vec![42],
            only_in_b: vec![],
            orders_differ: false,
        };
        let s = format_violation(&v);
        assert!(s.contains("Convergence"));
        assert!(s.contains("participants 0 and 1"));
    }
}
