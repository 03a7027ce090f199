#![forbid(unsafe_code)]

use anyhow::Result;
use taskdeck_sim::oracle::ConvergenceOracle;
use taskdeck_sim::{SimulationConfig, Simulator};

fn main() -> Result<()> {
    let mut simulator = Simulator::new(SimulationConfig::default())?;
    let result = simulator.run()?;
    let oracle = ConvergenceOracle::check_all(&result);

    println!(
        "simulation complete: trace_events={} fetches={} superseded={} pushes={} passed={} interesting={}",
        result.trace.len(),
        result.stats.fetches_issued,
        result.stats.fetches_superseded,
        result.stats.pushes_applied,
        oracle.passed,
        result.interesting_state_reached
    );

    Ok(())
}
