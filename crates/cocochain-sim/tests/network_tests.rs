//! Delivery-order properties of the simulated network.

use cocochain_consensus::{NodeId, SimTime};
use cocochain_sim::Network;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

proptest! {
    #[test]
    fn prop_per_link_delivery_is_fifo(
        seed in any::<u64>(),
        jitter_ms in 0u64..100,
        gaps in prop::collection::vec(0u64..5_000, 1..200),
    ) {
        let mut net = Network::new(
            Duration::from_millis(5),
            Duration::from_millis(jitter_ms),
            ChaCha8Rng::seed_from_u64(seed),
        );

        let mut now = SimTime::ZERO;
        let mut last = SimTime::ZERO;
        for gap in gaps {
            now = now + Duration::from_micros(gap);
            let at = net.delivery_time(NodeId(1), NodeId(2), now);
            prop_assert!(at >= last);
            prop_assert!(at >= now + Duration::from_millis(5));
            last = at;
        }
    }

    #[test]
    fn prop_same_seed_same_schedule(seed in any::<u64>()) {
        let schedule = |seed: u64| {
            let mut net = Network::new(
                Duration::from_millis(5),
                Duration::from_millis(20),
                ChaCha8Rng::seed_from_u64(seed),
            );
            (0..50u64)
                .map(|i| net.delivery_time(NodeId(0), NodeId((i % 3) as u32 + 1), SimTime::from_millis(i)))
                .collect::<Vec<_>>()
        };
        prop_assert_eq!(schedule(seed), schedule(seed));
    }
}
