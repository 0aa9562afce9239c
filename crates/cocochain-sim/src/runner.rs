//! Deterministic discrete-event runner.
//!
//! Events are kept in a `BTreeMap` keyed by `(time, sequence)`, so events at
//! the same instant fire in the order they were scheduled. Every random
//! stream is derived from the scenario seed, which makes a run a pure
//! function of its scenario.

use crate::error::{Result, SimError};
use crate::mobility::{kmh_to_mps, Highway, Trajectory};
use crate::network::Network;
use crate::observability::{SimulationMetrics, ROLE_RSU, ROLE_VEHICLE};
use crate::scenario::ScenarioConfig;
use bytes::Bytes;
use cocochain_consensus::{
    Action, AdversarialRegistry, Audience, ConceptVector, CoverageMap, LatencySummary, Message,
    MetricCounters, MetricsAggregator, Node, NodeId, ProtocolConfig, RoadsideUnitNode, SimTime,
    Timer, VehicleNode,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Stream reserved for the network's jitter draws.
const NETWORK_STREAM: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    at: SimTime,
    sequence: u64,
}

#[derive(Debug, Clone)]
enum Event {
    Deliver {
        from: NodeId,
        to: NodeId,
        payload: Bytes,
    },
    Timer {
        node: NodeId,
        timer: Timer,
    },
    Flush,
}

/// Aggregated outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Scenario seed.
    pub seed: u64,
    /// Simulated time reached.
    pub elapsed: SimTime,
    /// Number of roadside units.
    pub roadside_units: usize,
    /// Number of vehicles.
    pub vehicles: usize,
    /// Vehicles drawn as adversarial.
    pub adversarial: Vec<NodeId>,
    /// Counters summed over all nodes.
    pub counters: MetricCounters,
    /// Finalizations observed by originating vehicles.
    pub originator_finalized: u64,
    /// Rejections observed by originating vehicles.
    pub originator_rejected: u64,
    /// Cumulative false-positive rate over all roadside units.
    pub false_positive_rate: f64,
    /// Cumulative handover success rate over all vehicles.
    pub handover_success_rate: f64,
    /// End-to-end latency over all originators.
    pub end_to_end_latency: LatencySummary,
    /// Authentication latency over all handovers.
    pub authentication_latency: LatencySummary,
    /// Transactions still awaiting a decision, summed over nodes.
    pub unresolved_transactions: usize,
    /// Vehicles with a handover still in flight.
    pub stuck_handovers: usize,
    /// Authentications still running at roadside units.
    pub pending_authentications: usize,
    /// Messages put on the network.
    pub messages_sent: u64,
}

/// Drives vehicles and roadside units through simulated time.
#[derive(Debug)]
pub struct SimulationRunner {
    scenario: ScenarioConfig,
    config: Arc<ProtocolConfig>,
    now: SimTime,
    sequence: u64,
    events: BTreeMap<EventKey, Event>,
    nodes: BTreeMap<NodeId, Node>,
    rsu_ids: Vec<NodeId>,
    vehicle_ids: Vec<NodeId>,
    registry: Arc<AdversarialRegistry>,
    highway: Highway,
    network: Network,
    metrics: BTreeMap<NodeId, MetricsAggregator>,
    exporter: SimulationMetrics,
}

/// Random stream for one node: the scenario seed on a node-specific stream.
fn node_rng(seed: u64, node: NodeId) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(u64::from(node.get()) + 1);
    rng
}

impl SimulationRunner {
    /// Builds every node of the scenario.
    ///
    /// Roadside units get ids `0..R` in position order, vehicles `R..R+V`.
    pub fn new(scenario: ScenarioConfig) -> Result<Self> {
        let scenario = scenario.validated()?;
        let config = Arc::new(scenario.protocol.clone());
        let mut master = ChaCha8Rng::seed_from_u64(scenario.seed);

        let rsu_count = scenario.rsu_positions.len();
        let rsu_ids: Vec<NodeId> = (0..rsu_count as u32).map(NodeId).collect();
        let vehicle_ids: Vec<NodeId> = (0..scenario.vehicles as u32)
            .map(|i| NodeId(rsu_count as u32 + i))
            .collect();

        let coverage = Arc::new(CoverageMap::new(
            rsu_ids
                .iter()
                .copied()
                .zip(scenario.rsu_positions.iter().copied())
                .collect(),
            config.coverage_radius,
        ));
        let registry = Arc::new(AdversarialRegistry::draw(
            vehicle_ids.iter().copied(),
            config.corruption_probability,
            &mut master,
        )?);

        let mut nodes = BTreeMap::new();
        let mut metrics = BTreeMap::new();
        for &id in &rsu_ids {
            let rsu = RoadsideUnitNode::new(id, config.clone(), rsu_count, node_rng(scenario.seed, id))?;
            nodes.insert(id, Node::RoadsideUnit(rsu));
        }

        let mut highway = Highway::new(scenario.highway_length);
        for (i, &id) in vehicle_ids.iter().enumerate() {
            let start = match scenario.start_positions.get(i) {
                Some(p) => *p,
                None => master.gen_range(0.0..=scenario.highway_length),
            };
            let speed_kmh = master.gen_range(scenario.min_speed_kmh..=scenario.max_speed_kmh);
            highway.insert(
                id,
                Trajectory {
                    start,
                    speed_mps: kmh_to_mps(speed_kmh),
                },
            );

            let vehicle = VehicleNode::new(
                id,
                config.clone(),
                coverage.clone(),
                registry.clone(),
                start,
                node_rng(scenario.seed, id),
            )?;
            nodes.insert(id, Node::Vehicle(vehicle));
        }
        for &id in nodes.keys() {
            metrics.insert(id, MetricsAggregator::new(config.metrics_flush_interval));
        }

        let mut network_rng = ChaCha8Rng::seed_from_u64(scenario.seed);
        network_rng.set_stream(NETWORK_STREAM);
        let network = Network::new(scenario.link_latency, scenario.jitter, network_rng);

        tracing::info!(
            seed = scenario.seed,
            roadside_units = rsu_count,
            vehicles = vehicle_ids.len(),
            adversarial = registry.len(),
            mode = config.consensus_mode.as_str(),
            "built simulation"
        );

        Ok(Self {
            scenario,
            config,
            now: SimTime::ZERO,
            sequence: 0,
            events: BTreeMap::new(),
            nodes,
            rsu_ids,
            vehicle_ids,
            registry,
            highway,
            network,
            metrics,
            exporter: SimulationMetrics::new(),
        })
    }

    /// Arms every node's initial timers and the periodic metrics flush.
    pub fn start(&mut self) {
        let mut initial = Vec::new();
        for (&id, node) in &self.nodes {
            let actions = match node {
                Node::Vehicle(v) => {
                    let position = self.highway.position(id, self.now).unwrap_or_default();
                    v.start(position)
                        .into_iter()
                        .filter(|a| {
                            self.scenario.generate_transactions
                                || !matches!(
                                    a,
                                    Action::SetTimer {
                                        timer: Timer::SendTransaction,
                                        ..
                                    }
                                )
                        })
                        .collect()
                }
                Node::RoadsideUnit(r) => r.start(),
            };
            initial.push((id, actions));
        }
        for (id, actions) in initial {
            self.apply(id, actions);
        }
        self.schedule(self.now + self.config.metrics_flush_interval, Event::Flush);
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// The scenario being run.
    pub fn scenario(&self) -> &ScenarioConfig {
        &self.scenario
    }

    /// Roadside unit ids.
    pub fn rsu_ids(&self) -> &[NodeId] {
        &self.rsu_ids
    }

    /// Vehicle ids.
    pub fn vehicle_ids(&self) -> &[NodeId] {
        &self.vehicle_ids
    }

    /// A node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// A node's metric aggregator.
    pub fn metrics(&self, id: NodeId) -> Option<&MetricsAggregator> {
        self.metrics.get(&id)
    }

    /// The Prometheus exporter fed by every node.
    pub fn exporter(&self) -> &SimulationMetrics {
        &self.exporter
    }

    /// Publishes a transaction from `vehicle` carrying `vector`, at the current time.
    pub fn submit(&mut self, vehicle: NodeId, vector: ConceptVector) -> Result<()> {
        let now = self.now;
        let node = self
            .nodes
            .get_mut(&vehicle)
            .ok_or(SimError::UnknownNode(vehicle))?;
        let actions = node
            .as_vehicle_mut()
            .ok_or(SimError::NotAVehicle(vehicle))?
            .submit(vector, now)?;
        self.apply(vehicle, actions);
        Ok(())
    }

    /// Fires a coverage check for `vehicle` at `at`.
    pub fn schedule_coverage_check(&mut self, vehicle: NodeId, at: SimTime) -> Result<()> {
        match self.nodes.get(&vehicle) {
            Some(Node::Vehicle(_)) => {
                self.schedule(
                    at.max(self.now),
                    Event::Timer {
                        node: vehicle,
                        timer: Timer::CoverageCheck { position: 0.0 },
                    },
                );
                Ok(())
            }
            Some(Node::RoadsideUnit(_)) => Err(SimError::NotAVehicle(vehicle)),
            None => Err(SimError::UnknownNode(vehicle)),
        }
    }

    /// Processes every event scheduled at or before `until`.
    pub fn run_until(&mut self, until: SimTime) {
        while let Some(entry) = self.events.first_entry() {
            if entry.key().at > until {
                break;
            }
            let (key, event) = entry.remove_entry();
            self.now = key.at;
            self.dispatch(event);
        }
        self.now = self.now.max(until);
    }

    /// Runs for the scenario's configured duration.
    pub fn run(&mut self) -> SimulationReport {
        let until = SimTime::ZERO + self.scenario.duration;
        self.run_until(until);
        for (id, node) in &self.nodes {
            let pending = node.engine().unresolved_ids();
            if !pending.is_empty() {
                tracing::debug!(node = %id, ?pending, "transactions unresolved at end of run");
            }
        }
        self.report()
    }

    fn schedule(&mut self, at: SimTime, event: Event) {
        let key = EventKey {
            at,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.events.insert(key, event);
    }

    fn dispatch(&mut self, event: Event) {
        let now = self.now;
        match event {
            Event::Deliver { from, to, payload } => {
                if let Some(node) = self.nodes.get_mut(&to) {
                    let actions = node.handle_wire(from, &payload, now);
                    self.apply(to, actions);
                }
            }
            Event::Timer { node: id, mut timer } => {
                if let Timer::CoverageCheck { position } = &mut timer {
                    *position = self.highway.position(id, now).unwrap_or_default();
                }
                if let Some(node) = self.nodes.get_mut(&id) {
                    tracing::trace!(node = %id, timer = timer.kind(), "timer fired");
                    let actions = node.handle_timer(timer, now);
                    self.apply(id, actions);
                }
            }
            Event::Flush => {
                for metrics in self.metrics.values_mut() {
                    metrics.flush(now);
                }
                let unresolved: usize = self.nodes.values().map(|n| n.engine().unresolved()).sum();
                self.exporter
                    .unresolved_transactions
                    .set(i64::try_from(unresolved).unwrap_or(i64::MAX));
                self.schedule(now + self.config.metrics_flush_interval, Event::Flush);
            }
        }
    }

    fn apply(&mut self, origin: NodeId, actions: Vec<Action>) {
        let role = if self.rsu_ids.binary_search(&origin).is_ok() {
            ROLE_RSU
        } else {
            ROLE_VEHICLE
        };

        for action in actions {
            match action {
                Action::Broadcast { audience, message } => {
                    let recipients: Vec<NodeId> = match audience {
                        Audience::RoadsideUnits => self.rsu_ids.clone(),
                        Audience::All => self.nodes.keys().copied().collect(),
                    };
                    let Some(payload) = self.encode(origin, &message) else {
                        continue;
                    };
                    for to in recipients.into_iter().filter(|to| *to != origin) {
                        self.send(origin, to, payload.clone());
                    }
                }
                Action::Send { to, message } => {
                    if !self.nodes.contains_key(&to) {
                        tracing::warn!(from = %origin, %to, "dropped message to unknown node");
                        continue;
                    }
                    if let Some(payload) = self.encode(origin, &message) {
                        self.send(origin, to, payload);
                    }
                }
                Action::SetTimer { after, timer } => {
                    self.schedule(self.now + after, Event::Timer { node: origin, timer });
                }
                Action::Record(sample) => {
                    self.exporter.observe(role, &sample);
                    if let Some(metrics) = self.metrics.get_mut(&origin) {
                        metrics.record(sample);
                    }
                }
            }
        }
    }

    fn encode(&self, origin: NodeId, message: &Message) -> Option<Bytes> {
        match message.encode() {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(from = %origin, kind = message.kind(), error = %e, "failed to encode message");
                None
            }
        }
    }

    fn send(&mut self, from: NodeId, to: NodeId, payload: Bytes) {
        let at = self.network.delivery_time(from, to, self.now);
        self.schedule(at, Event::Deliver { from, to, payload });
    }

    /// Summarizes the run so far.
    pub fn report(&self) -> SimulationReport {
        let mut total = MetricsAggregator::new(self.config.metrics_flush_interval);
        let mut rsus = MetricsAggregator::new(self.config.metrics_flush_interval);
        let mut vehicles = MetricsAggregator::new(self.config.metrics_flush_interval);
        for (id, metrics) in &self.metrics {
            total.absorb(metrics);
            if self.rsu_ids.binary_search(id).is_ok() {
                rsus.absorb(metrics);
            } else {
                vehicles.absorb(metrics);
            }
        }

        let stuck_handovers = self
            .nodes
            .values()
            .filter_map(Node::as_vehicle)
            .filter(|v| v.handover().context().is_some())
            .count();
        let pending_authentications = self
            .nodes
            .values()
            .filter_map(Node::as_roadside_unit)
            .map(|r| r.authority().in_flight())
            .sum();

        SimulationReport {
            seed: self.scenario.seed,
            elapsed: self.now,
            roadside_units: self.rsu_ids.len(),
            vehicles: self.vehicle_ids.len(),
            adversarial: self.registry.sorted_ids(),
            counters: *total.counters(),
            originator_finalized: vehicles.counters().transactions_finalized,
            originator_rejected: vehicles.counters().transactions_rejected,
            false_positive_rate: rsus.false_positive_rate(),
            handover_success_rate: vehicles.handover_success_rate(),
            end_to_end_latency: total.end_to_end_latency(),
            authentication_latency: total.authentication_latency(),
            unresolved_transactions: self.nodes.values().map(|n| n.engine().unresolved()).sum(),
            stuck_handovers,
            pending_authentications,
            messages_sent: self.network.sent(),
        }
    }
}
