//! Any seed under any fault mix ends converged.

use proptest::prelude::*;
use taskdeck_sim::network::FaultConfig;
use taskdeck_sim::oracle::ConvergenceOracle;
use taskdeck_sim::{SimulationConfig, Simulator};

fn arb_faults() -> impl Strategy<Value = FaultConfig> {
    (0_u8..=4, 0_u8..=100, 0_u8..=20, 0_u8..=40, 0_u8..=50, 0_u8..=40).prop_map(
        |(delay, reorder, duplicate, fetch_fail, write_fail, disconnect)| FaultConfig {
            max_delay_rounds: delay,
            reorder_rate_percent: reorder,
            duplicate_rate_percent: duplicate,
            fetch_failure_percent: fetch_fail,
            write_failure_percent: write_fail,
            disconnect_rate_percent: disconnect,
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_seed_converges(
        seed in any::<u64>(),
        workspace_count in 1_usize..=4,
        rounds in 1_u64..=50,
        fault in arb_faults(),
    ) {
        let config = SimulationConfig { seed, rounds, workspace_count, fault };
        let result = Simulator::new(config).expect("sim").run().expect("run");
        let oracle = ConvergenceOracle::check_all(&result);
        prop_assert!(oracle.passed, "seed {seed}: {:?}", oracle.violations);
        prop_assert_eq!(result.comparisons.len(), workspace_count + 1);
    }
}
