use aleph_sim::network::FaultConfig;
use aleph_sim::oracle::OrderingOracle;
use aleph_sim::{SimulationConfig, Simulator};
use proptest::prelude::*;

fn arb_fault() -> impl Strategy<Value = FaultConfig> {
    (0u8..4, 0u8..40, 0u8..30, 0u8..60, 0u8..20).prop_map(
        |(max_delay_steps, drop, duplicate, reorder, partition)| FaultConfig {
            max_delay_steps,
            drop_rate_percent: drop,
            duplicate_rate_percent: duplicate,
            reorder_rate_percent: reorder,
            partition_rate_percent: partition,
        },
    )
}

fn arb_config() -> impl Strategy<Value = SimulationConfig> {
    (any::<u64>(), 1usize..8, 4u64..18, 0u8..=100, 0usize..3, arb_fault()).prop_map(
        |(seed, participants, steps, equivocation_percent, gossip_fanout, fault)| {
            SimulationConfig {
                seed,
                participants,
                byzantine: (participants - 1) / 3,
                steps,
                equivocation_percent,
                gossip_fanout,
                fault,
            }
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_tolerable_configuration_passes_the_oracle(config in arb_config()) {
        let result = Simulator::new(config).unwrap().run().unwrap();
        let oracle = OrderingOracle::check_all(&result);
        prop_assert!(oracle.passed, "{:?}", oracle.violations);
    }

    #[test]
    fn equal_configs_replay_identically(config in arb_config()) {
        let a = Simulator::new(config.clone()).unwrap().run().unwrap();
        let b = Simulator::new(config).unwrap().run().unwrap();
        prop_assert_eq!(a, b);
    }
}
