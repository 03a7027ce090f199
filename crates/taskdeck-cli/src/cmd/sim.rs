//! `td sim`: deterministic simulation campaigns against an in-memory server.
//!
//! `td sim run` executes a campaign across many seeds.
//! `td sim replay` replays a single seed with detailed trace output.

use std::process;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use taskdeck_sim::SimStats;
use taskdeck_sim::campaign::{self, CampaignConfig};

use crate::output::{OutputMode, pretty_kv, pretty_section};

/// Top-level arguments for `td sim`.
#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across multiple seeds",
        long_about = "Drive the sync engine against a simulated server with delayed,\n\
                      reordered and failing deliveries. Reports pass/fail per seed\n\
                      and identifies the first failure for replay.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    td sim run --seeds 100\n\n\
                      # Harsher network\n    td sim run --seeds 200 --workspaces 4 --rounds 60 --faults 0.3\n\n\
                      # Machine-readable output\n    td sim run --seeds 100 --format json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay a single seed with detailed trace output",
        long_about = "Replay a specific seed to get its statistics, oracle result\n\
                      and violation details. Use after a campaign failure to debug.",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    td sim replay --seed 42\n\n\
                      # Include every trace event\n    td sim replay --seed 42 --trace\n\n\
                      # Machine-readable output\n    td sim replay --seed 42 --format json"
    )]
    Replay(SimReplayArgs),
}

/// Simulation parameters shared by `run` and `replay`.
#[derive(Args, Debug, Clone, Copy)]
pub struct SimParams {
    /// Workspaces on the simulated server.
    #[arg(long, default_value = "3")]
    pub workspaces: usize,

    /// Number of simulation rounds per seed.
    #[arg(long, default_value = "40")]
    pub rounds: u64,

    /// Overall fault probability between 0.0 and 1.0. Scales reordering,
    /// duplication, request failures and disconnects.
    #[arg(long, default_value = "0.1")]
    pub faults: f64,

    /// Maximum delivery delay in rounds.
    #[arg(long, default_value = "3")]
    pub max_delay: u8,
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "100")]
    pub seeds: u64,

    /// Starting seed value.
    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub params: SimParams,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    /// Seed to replay.
    #[arg(long)]
    pub seed: u64,

    /// Print every trace event.
    #[arg(long)]
    pub trace: bool,

    #[command(flatten)]
    pub params: SimParams,
}

#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    all_passed: bool,
    failures: Vec<campaign::SeedFailure>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    rounds: u64,
    trace_events: usize,
    comparisons: usize,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
    stats: SimStats,
}

fn build_campaign_config(seed_start: u64, seeds: u64, params: SimParams) -> CampaignConfig {
    CampaignConfig {
        seed_range: seed_start..seed_start.saturating_add(seeds),
        rounds: params.rounds,
        workspace_count: params.workspaces,
        fault_max_delay: params.max_delay,
        fault_reorder_percent: scale_fault(params.faults, 200),
        fault_duplicate_percent: scale_fault(params.faults, 30),
        fault_fetch_failure_percent: scale_fault(params.faults, 50),
        fault_write_failure_percent: scale_fault(params.faults, 100),
        fault_disconnect_percent: scale_fault(params.faults, 100),
    }
}

/// Scale a base fault probability (0.0–1.0) by a weight to get a percent (0–100).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_fault(base: f64, weight_pct: u8) -> u8 {
    let raw = base * f64::from(weight_pct);
    raw.clamp(0.0, 100.0) as u8
}

pub fn run_sim(args: &SimArgs, output: OutputMode) -> Result<()> {
    match &args.command {
        SimCommand::Run(run_args) => run_sim_run(run_args, output),
        SimCommand::Replay(replay_args) => run_sim_replay(replay_args, output),
    }
}

fn run_sim_run(args: &SimRunArgs, output: OutputMode) -> Result<()> {
    let config = build_campaign_config(args.seed_start, args.seeds, args.params);
    let report = campaign::run_campaign(&config)?;

    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        interesting_states_reached: report.interesting_states_reached,
        all_passed: report.all_passed(),
        failures: report.failures.clone(),
    };
    let params = args.params;

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            println!(
                "campaign seeds_run={} workspaces={} rounds={} faults_pct={:.0}",
                out.seeds_run,
                params.workspaces,
                params.rounds,
                params.faults * 100.0
            );
            println!(
                "results passed={} failed={} interesting_states={} all_passed={}",
                out.seeds_passed, out.seeds_failed, out.interesting_states_reached, out.all_passed
            );
            if !out.all_passed {
                for failure in out.failures.iter().take(5) {
                    println!(
                        "failure seed={} violations={}",
                        failure.seed,
                        failure.violations.len()
                    );
                }
                if out.failures.len() > 5 {
                    println!("failures_truncated count={}", out.failures.len() - 5);
                }
                println!(
                    "hint replay_seed={} workspaces={} rounds={}",
                    out.first_failure.unwrap_or(0),
                    params.workspaces,
                    params.rounds
                );
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, "Simulation Campaign")?;
            pretty_kv(&mut w, "Seeds", out.seeds_run.to_string())?;
            pretty_kv(&mut w, "Workspaces", params.workspaces.to_string())?;
            pretty_kv(&mut w, "Rounds", params.rounds.to_string())?;
            pretty_kv(&mut w, "Fault rate", format!("{:.0}%", params.faults * 100.0))?;
            pretty_kv(
                &mut w,
                "Results",
                format!(
                    "{} passed / {} failed ({} interesting states)",
                    out.seeds_passed, out.seeds_failed, out.interesting_states_reached
                ),
            )?;

            if out.all_passed {
                pretty_kv(&mut w, "Status", "all seeds passed")?;
            } else {
                pretty_kv(
                    &mut w,
                    "Status",
                    format!(
                        "{} failures (first at seed {})",
                        out.seeds_failed,
                        out.first_failure.unwrap_or(0)
                    ),
                )?;
                println!();
                pretty_section(&mut w, "Failure Samples")?;
                for failure in out.failures.iter().take(5) {
                    println!("seed {:<8} violations={}", failure.seed, failure.violations.len());
                    for violation in &failure.violations {
                        println!("  - {violation}");
                    }
                }
                if out.failures.len() > 5 {
                    println!("... and {} more failures", out.failures.len() - 5);
                }
                println!();
                pretty_kv(
                    &mut w,
                    "Replay",
                    format!(
                        "td sim replay --seed {} --workspaces {} --rounds {}",
                        out.first_failure.unwrap_or(0),
                        params.workspaces,
                        params.rounds
                    ),
                )?;
            }
        }
    }

    // Exit code 1 on any failure for CI integration
    if !report.all_passed() {
        process::exit(1);
    }

    Ok(())
}

fn run_sim_replay(args: &SimReplayArgs, output: OutputMode) -> Result<()> {
    let config = build_campaign_config(args.seed, 1, args.params);
    let trace = campaign::replay_seed(args.seed, &config)?;
    let result = &trace.result;

    let out = ReplayOutput {
        seed: args.seed,
        rounds: result.rounds,
        trace_events: result.trace.len(),
        comparisons: result.comparisons.len(),
        oracle_passed: trace.oracle.passed,
        violations: trace
            .oracle
            .violations
            .iter()
            .map(campaign::format_violation)
            .collect(),
        interesting_state_reached: result.interesting_state_reached,
        stats: result.stats,
    };

    match output {
        OutputMode::Json => {
            if args.trace {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "summary": out,
                        "trace": result.trace,
                    }))?
                );
            } else {
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        }
        OutputMode::Text => {
            println!(
                "replay seed={} workspaces={} rounds={}",
                out.seed, args.params.workspaces, out.rounds
            );
            println!(
                "result oracle_passed={} trace_events={} comparisons={} interesting_state_reached={}",
                out.oracle_passed, out.trace_events, out.comparisons, out.interesting_state_reached
            );
            let stats = &out.stats;
            println!(
                "stats local_writes={} failed_writes={} rollbacks={} teammate_writes={} switches={} interruptions={}",
                stats.local_writes,
                stats.failed_writes,
                stats.rollbacks,
                stats.teammate_writes,
                stats.switches,
                stats.interruptions
            );
            println!(
                "stats fetches_issued={} applied={} failed={} superseded={} pushes_applied={} stale={} dropped={}",
                stats.fetches_issued,
                stats.fetches_applied,
                stats.fetches_failed,
                stats.fetches_superseded,
                stats.pushes_applied,
                stats.pushes_stale,
                stats.pushes_dropped
            );
            for violation in &out.violations {
                println!("violation={violation}");
            }
            if args.trace {
                for event in &result.trace {
                    println!("trace {}", serde_json::to_string(event)?);
                }
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            let stats = &out.stats;
            pretty_section(&mut w, &format!("Replay Seed {}", out.seed))?;
            pretty_kv(&mut w, "Workspaces", args.params.workspaces.to_string())?;
            pretty_kv(&mut w, "Rounds", out.rounds.to_string())?;
            pretty_kv(&mut w, "Trace events", out.trace_events.to_string())?;
            pretty_kv(
                &mut w,
                "Writes",
                format!(
                    "{} local ({} failed, {} rolled back), {} teammate",
                    stats.local_writes, stats.failed_writes, stats.rollbacks, stats.teammate_writes
                ),
            )?;
            pretty_kv(
                &mut w,
                "Fetches",
                format!(
                    "{} issued, {} applied, {} failed, {} superseded",
                    stats.fetches_issued,
                    stats.fetches_applied,
                    stats.fetches_failed,
                    stats.fetches_superseded
                ),
            )?;
            pretty_kv(
                &mut w,
                "Pushes",
                format!(
                    "{} applied, {} stale, {} dropped",
                    stats.pushes_applied, stats.pushes_stale, stats.pushes_dropped
                ),
            )?;
            pretty_kv(&mut w, "Interesting", out.interesting_state_reached.to_string())?;
            pretty_kv(&mut w, "Oracle", out.oracle_passed.to_string())?;

            if !out.oracle_passed {
                println!();
                pretty_section(&mut w, "Invariant Violations")?;
                for violation in &out.violations {
                    println!("- {violation}");
                }
            }
            if args.trace {
                println!();
                pretty_section(&mut w, "Trace")?;
                for event in &result.trace {
                    println!("{:>4}  {}", event.round, serde_json::to_string(&event.kind)?);
                }
            }
        }
    }

    if !trace.oracle.passed {
        process::exit(1);
    }

    Ok(())
}
