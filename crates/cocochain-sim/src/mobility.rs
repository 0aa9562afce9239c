//! Highway mobility.

use cocochain_types::{NodeId, SimTime};
use std::collections::BTreeMap;

/// Converts km/h to m/s.
pub fn kmh_to_mps(kmh: f64) -> f64 {
    kmh / 3.6
}

/// Constant-speed movement along the highway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trajectory {
    /// Position at time zero, in meters.
    pub start: f64,
    /// Speed in m/s.
    pub speed_mps: f64,
}

impl Trajectory {
    /// Position at `at`, clamped to `[0, highway_length]`.
    pub fn position_at(&self, at: SimTime, highway_length: f64) -> f64 {
        (self.start + self.speed_mps * at.as_secs_f64()).clamp(0.0, highway_length)
    }
}

/// Trajectories of every vehicle.
#[derive(Debug, Clone, Default)]
pub struct Highway {
    length: f64,
    trajectories: BTreeMap<NodeId, Trajectory>,
}

impl Highway {
    /// Creates an empty highway of `length` meters.
    pub fn new(length: f64) -> Self {
        Self {
            length,
            trajectories: BTreeMap::new(),
        }
    }

    /// Adds or replaces a vehicle's trajectory.
    pub fn insert(&mut self, vehicle: NodeId, trajectory: Trajectory) {
        self.trajectories.insert(vehicle, trajectory);
    }

    /// A vehicle's position at `at`.
    pub fn position(&self, vehicle: NodeId, at: SimTime) -> Option<f64> {
        self.trajectories
            .get(&vehicle)
            .map(|t| t.position_at(at, self.length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_advances_and_clamps() {
        let mut highway = Highway::new(1000.0);
        highway.insert(
            NodeId(5),
            Trajectory {
                start: 100.0,
                speed_mps: kmh_to_mps(36.0),
            },
        );
        assert_eq!(highway.position(NodeId(5), SimTime::ZERO), Some(100.0));
        let at = highway.position(NodeId(5), SimTime::from_secs_f64(10.0)).unwrap();
        assert!((at - 200.0).abs() < 1e-9);
        assert_eq!(highway.position(NodeId(5), SimTime::from_secs_f64(1000.0)), Some(1000.0));
        assert_eq!(highway.position(NodeId(6), SimTime::ZERO), None);
    }
}
