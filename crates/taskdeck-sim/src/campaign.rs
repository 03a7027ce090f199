//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with one fault profile, collecting pass/fail results
//! and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::network::FaultConfig;
use crate::oracle::{ConvergenceOracle, InvariantViolation, OracleResult};
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: which seeds to run and the simulation
/// parameters shared by all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    /// Number of simulation rounds per seed.
    pub rounds: u64,
    /// Workspaces on the simulated server.
    pub workspace_count: usize,
    /// Maximum delivery delay in rounds.
    pub fault_max_delay: u8,
    /// Fetch response reordering probability (percent, 0–100).
    pub fault_reorder_percent: u8,
    /// Push message duplication probability (percent, 0–100).
    pub fault_duplicate_percent: u8,
    /// Fetch failure probability (percent, 0–100).
    pub fault_fetch_failure_percent: u8,
    /// Local write failure probability (percent, 0–100).
    pub fault_write_failure_percent: u8,
    /// Push transport drop probability per idle round (percent, 0–100).
    pub fault_disconnect_percent: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let fault = FaultConfig::default();
        Self {
            seed_range: 0..100,
            rounds: 40,
            workspace_count: 3,
            fault_max_delay: fault.max_delay_rounds,
            fault_reorder_percent: fault.reorder_rate_percent,
            fault_duplicate_percent: fault.duplicate_rate_percent,
            fault_fetch_failure_percent: fault.fetch_failure_percent,
            fault_write_failure_percent: fault.write_failure_percent,
            fault_disconnect_percent: fault.disconnect_rate_percent,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            rounds: self.rounds,
            workspace_count: self.workspace_count,
            fault: FaultConfig {
                max_delay_rounds: self.fault_max_delay,
                reorder_rate_percent: self.fault_reorder_percent,
                duplicate_rate_percent: self.fault_duplicate_percent,
                fetch_failure_percent: self.fault_fetch_failure_percent,
                write_failure_percent: self.fault_write_failure_percent,
                disconnect_rate_percent: self.fault_disconnect_percent,
            },
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
        if self.workspace_count == 0 {
            bail!("workspace_count must be > 0");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        let percents = [
            ("reorder", self.fault_reorder_percent),
            ("duplicate", self.fault_duplicate_percent),
            ("fetch failure", self.fault_fetch_failure_percent),
            ("write failure", self.fault_write_failure_percent),
            ("disconnect", self.fault_disconnect_percent),
        ];
        if let Some((name, value)) = percents.iter().find(|(_, v)| *v > 100) {
            bail!("{name} rate must be a percentage, got {value}");
        }
        Ok(())
    }
}

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
    /// Seeds whose run discarded a stale response while a push raced a
    /// channel change or a move rolled back.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Detailed trace produced by replaying a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
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

    for seed in config.seed_range.clone() {
        seeds_run += 1;
        let trace = run_seed(seed, config)?;
        if trace.result.interesting_state_reached {
            interesting_states_reached += 1;
        }

        if trace.oracle.passed {
            seeds_passed += 1;
        } else {
            first_failure.get_or_insert(seed);
            failures.push(SeedFailure {
                seed,
                violations: trace.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    Ok(CampaignReport {
        seeds_run,
        seeds_passed,
        first_failure,
        failures,
        interesting_states_reached,
    })
}

/// Run a single seed and return Ok(()) on pass, Err(violations) on failure.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself encounters an internal
/// error (invalid config, etc). The inner `Result` distinguishes pass from
/// invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let trace = run_seed(seed, config)?;
    if trace.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(trace.oracle.violations))
    }
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    run_seed(seed, config)
}

fn run_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = ConvergenceOracle::check_all(&result);
    Ok(DetailedTrace { result, oracle })
}

/// Format an invariant violation into a human-readable string.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::StaleResponseApplied {
            key,
            generation,
            newest,
        } => format!(
            "StaleResponseApplied: {key} applied generation {generation} \
             although generation {newest} was current"
        ),
        InvariantViolation::GenerationRegressed {
            key,
            previous,
            observed,
        } => format!(
            "GenerationRegressed: listener on {key} saw generation {observed} after {previous}"
        ),
        InvariantViolation::DuplicateTask {
            round,
            workspace_id,
            task_id,
        } => format!(
            "DuplicateTask: workspace {workspace_id} listed task {task_id} twice in round {round}"
        ),
        InvariantViolation::RollbackLeak {
            task_id,
            origin,
            found,
        } => format!(
            "RollbackLeak: failed move left task {task_id} in {found} instead of {origin}"
        ),
        InvariantViolation::Divergence {
            workspace_id,
            missing,
            unexpected,
            mismatched,
        } => format!(
            "Divergence: workspace {workspace_id} cache differs from server \
             (missing={missing:?}, unexpected={unexpected:?}, mismatched={mismatched:?})"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_config_default_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn campaign_config_empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn campaign_config_zero_rounds_rejected() {
        let config = CampaignConfig {
            rounds: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn campaign_config_rate_over_100_rejected() {
        let config = CampaignConfig {
            fault_fetch_failure_percent: 101,
            ..CampaignConfig::default()
        };
        let err = config.validate().expect_err("invalid rate");
        assert!(err.to_string().contains("fetch failure"));
    }

    #[test]
    fn sim_config_for_seed_uses_correct_seed() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.rounds, config.rounds);
        assert_eq!(sim.fault.max_delay_rounds, config.fault_max_delay);
    }

    #[test]
    fn run_campaign_100_seeds_pass() {
        let config = CampaignConfig {
            seed_range: 0..100,
            rounds: 30,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert_eq!(report.seeds_run, 100);
        assert!(
            report.all_passed(),
            "campaign failed: {:?}",
            report.failures.first(),
        );
        assert!(report.first_failure.is_none());
    }

    #[test]
    fn campaign_reaches_interesting_states() {
        let config = CampaignConfig {
            seed_range: 0..20,
            rounds: 60,
            fault_reorder_percent: 40,
            fault_write_failure_percent: 30,
            fault_disconnect_percent: 25,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert!(
            report.interesting_states_reached > 0,
            "expected some seeds to reach interesting fault states"
        );
    }

    #[test]
    fn replay_is_deterministic() {
        let config = CampaignConfig::default();
        let first = replay_seed(7, &config).expect("replay 1");
        let second = replay_seed(7, &config).expect("replay 2");
        assert_eq!(first, second);
        assert!(!first.result.trace.is_empty());
        assert!(first.oracle.passed, "{:?}", first.oracle.violations);
    }

    #[test]
    fn campaign_report_serializes_to_json() {
        let report = CampaignReport {
            seeds_run: 10,
            seeds_passed: 9,
            first_failure: Some(7),
            failures: vec![SeedFailure {
                seed: 7,
                violations: vec!["Divergence: workspace 1 cache differs from server".into()],
            }],
            interesting_states_reached: 5,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"seeds_run\":10"));
        assert!(json.contains("\"first_failure\":7"));
    }

    #[test]
    fn format_violation_produces_readable_strings() {
        let s = format_violation(&InvariantViolation::Divergence {
            workspace_id: 2,
            missing: vec![42],
            unexpected: vec![],
            mismatched: vec![],
        });
        assert!(s.starts_with("Divergence"));
        assert!(s.contains("workspace 2"));
        assert!(s.contains("missing=[42]"));
    }
}
