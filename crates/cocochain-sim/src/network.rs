//! Simulated transport.
//!
//! Every message takes the link latency plus a random jitter. Deliveries on
//! one (sender, receiver) link never overtake each other: a message is never
//! scheduled before the previous one on the same link.

use cocochain_types::{NodeId, SimTime};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::time::Duration;

/// Computes delivery times for point-to-point messages.
#[derive(Debug, Clone)]
pub struct Network {
    latency: Duration,
    jitter: Duration,
    rng: ChaCha8Rng,
    last_delivery: HashMap<(NodeId, NodeId), SimTime>,
    sent: u64,
}

impl Network {
    /// Creates a network with the given latency and jitter.
    pub fn new(latency: Duration, jitter: Duration, rng: ChaCha8Rng) -> Self {
        Self {
            latency,
            jitter,
            rng,
            last_delivery: HashMap::new(),
            sent: 0,
        }
    }

    /// When a message sent from `from` to `to` at `now` arrives.
    pub fn delivery_time(&mut self, from: NodeId, to: NodeId, now: SimTime) -> SimTime {
        let jitter_micros = self.jitter.as_micros() as u64;
        let jitter = if jitter_micros == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.rng.gen_range(0..=jitter_micros))
        };

        let mut at = now + self.latency + jitter;
        let last = self.last_delivery.entry((from, to)).or_insert(SimTime::ZERO);
        if at < *last {
            at = *last;
        }
        *last = at;
        self.sent += 1;
        at
    }

    /// Messages scheduled so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_fixed_latency_without_jitter() {
        let mut net = Network::new(Duration::from_millis(5), Duration::ZERO, ChaCha8Rng::seed_from_u64(1));
        let at = net.delivery_time(NodeId(0), NodeId(1), SimTime::from_millis(10));
        assert_eq!(at, SimTime::from_millis(15));
        assert_eq!(net.sent(), 1);
    }

    #[test]
    fn test_jitter_never_reorders_a_link() {
        let mut net = Network::new(
            Duration::from_millis(5),
            Duration::from_millis(50),
            ChaCha8Rng::seed_from_u64(3),
        );
        let mut previous = SimTime::ZERO;
        for i in 0..500 {
            let at = net.delivery_time(NodeId(0), NodeId(1), SimTime::from_micros(i * 100));
            assert!(at >= previous);
            previous = at;
        }
    }
}
