//! Vehicle and roadside unit nodes.
//!
//! Nodes are pure state machines. Every entry point takes the current
//! simulated time and returns the [`Action`]s the caller must carry out:
//! messages to deliver, timers to arm and metric samples to record. Nothing
//! is rescheduled implicitly; a recurring timer re-arms itself by returning a
//! new [`Action::SetTimer`].

use crate::adversary::{AdversarialBehavior, AdversarialRegistry};
use crate::concept::{ConceptModel, ConceptVector};
use crate::config::{ConsensusMode, ProtocolConfig};
use crate::engine::{ConsensusEngine, Decision, EngineConfig, ReceiveOutcome, VoteOutcome};
use crate::error::Result;
use crate::handover::{
    AuthDecision, AuthorityConfig, CoverageMap, HandoverAuthority, HandoverMachine,
    HandoverOutcome,
};
use crate::message::{HandoverRequest, HandoverResult, Message, TransactionAnnounce, Vote};
use crate::metrics::MetricSample;
use crate::transaction::Transaction;
use crate::verifier::{reference_from_config, ReferenceProvider, SemanticVerifier, Verification};
use cocochain_types::{NodeId, SimTime};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Recipients of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Audience {
    /// Every roadside unit.
    RoadsideUnits,
    /// Every node except the sender.
    All,
}

/// Timers a node can arm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timer {
    /// Vehicle: create and broadcast a transaction.
    SendTransaction,
    /// Vehicle: compare the position with the coverage map. The caller fills
    /// in the current position when the timer fires.
    CoverageCheck {
        /// Position along the road, in meters.
        position: f64,
    },
    /// Sweep aged-out consensus and handover state.
    Maintenance,
    /// Roadside unit: authentication of `vehicle` is done.
    HandoverAuthenticated {
        /// Vehicle being authenticated.
        vehicle: NodeId,
    },
    /// Roadside unit in baseline mode: broadcast a vote held back for the
    /// processing delay.
    CastVote {
        /// The local vote, already counted in the unit's own tally.
        vote: Vote,
    },
}

impl Timer {
    /// Returns the timer type as a string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Timer::SendTransaction => "send_transaction",
            Timer::CoverageCheck { .. } => "coverage_check",
            Timer::Maintenance => "maintenance",
            Timer::HandoverAuthenticated { .. } => "handover_authenticated",
            Timer::CastVote { .. } => "cast_vote",
        }
    }
}

/// An effect requested by a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Deliver `message` to every member of `audience`.
    Broadcast {
        /// Recipients.
        audience: Audience,
        /// Message to deliver.
        message: Message,
    },
    /// Deliver `message` to one node.
    Send {
        /// Recipient.
        to: NodeId,
        /// Message to deliver.
        message: Message,
    },
    /// Fire `timer` on this node after `after`.
    SetTimer {
        /// Delay.
        after: Duration,
        /// Timer to fire.
        timer: Timer,
    },
    /// Record a metric sample for this node.
    Record(MetricSample),
}

/// Maps a verification verdict and the ground-truth corruption flag to the
/// matching classification sample.
pub fn classify(verification: Verification, corrupted: bool) -> MetricSample {
    match (verification.is_accepted(), corrupted) {
        (true, false) => MetricSample::ValidTransaction,
        (true, true) => MetricSample::UndetectedCorruption,
        (false, true) => MetricSample::MalformedDetected,
        (false, false) => MetricSample::FalsePositive,
    }
}

fn decision_samples(decision: Decision, actions: &mut Vec<Action>) {
    match decision {
        Decision::Finalized { latency } => {
            actions.push(Action::Record(MetricSample::TransactionFinalized));
            if let Some(latency) = latency {
                actions.push(Action::Record(MetricSample::EndToEndLatency(latency)));
            }
        }
        Decision::Rejected => actions.push(Action::Record(MetricSample::TransactionRejected)),
    }
}

fn vote_samples(outcome: VoteOutcome, actions: &mut Vec<Action>) {
    match outcome {
        VoteOutcome::Decided { decision, .. } => decision_samples(decision, actions),
        VoteOutcome::Expired => actions.push(Action::Record(MetricSample::TransactionExpired)),
        _ => {}
    }
}

fn sweep_samples(engine: &mut ConsensusEngine, now: SimTime, actions: &mut Vec<Action>) {
    let report = engine.sweep(now);
    for _ in 0..report.expired {
        actions.push(Action::Record(MetricSample::TransactionExpired));
    }
}

/// A mobile node that creates transactions and hands over between providers.
#[derive(Debug)]
pub struct VehicleNode {
    id: NodeId,
    config: Arc<ProtocolConfig>,
    engine: ConsensusEngine,
    model: ConceptModel,
    registry: Arc<AdversarialRegistry>,
    behavior: AdversarialBehavior,
    coverage: Arc<CoverageMap>,
    handover: HandoverMachine,
    rng: ChaCha8Rng,
}

impl VehicleNode {
    /// Creates a vehicle at `initial_position`, attached to the nearest
    /// provider in range.
    pub fn new(
        id: NodeId,
        config: Arc<ProtocolConfig>,
        coverage: Arc<CoverageMap>,
        registry: Arc<AdversarialRegistry>,
        initial_position: f64,
        rng: ChaCha8Rng,
    ) -> Result<Self> {
        let model = ConceptModel::from_config(&config)?;
        let engine = ConsensusEngine::new(EngineConfig::new(id, &config, coverage.len()));
        let behavior = AdversarialBehavior::from(config.as_ref());
        let handover = HandoverMachine::new(id, coverage.nearest(initial_position));
        Ok(Self {
            id,
            config,
            engine,
            model,
            registry,
            behavior,
            coverage,
            handover,
            rng,
        })
    }

    /// This vehicle's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Whether this vehicle corrupts its transactions.
    pub fn is_adversarial(&self) -> bool {
        self.registry.is_adversarial(self.id)
    }

    /// The provider currently serving the vehicle.
    pub fn current_provider(&self) -> Option<NodeId> {
        self.handover.current()
    }

    /// The vehicle's handover state machine.
    pub fn handover(&self) -> &HandoverMachine {
        &self.handover
    }

    /// The vehicle's consensus engine.
    pub fn engine(&self) -> &ConsensusEngine {
        &self.engine
    }

    /// Timers to arm when the vehicle joins at `position`.
    pub fn start(&self, position: f64) -> Vec<Action> {
        vec![
            Action::SetTimer {
                after: self.config.message_interval,
                timer: Timer::SendTransaction,
            },
            Action::SetTimer {
                after: Duration::ZERO,
                timer: Timer::CoverageCheck { position },
            },
            Action::SetTimer {
                after: self.config.sweep_interval,
                timer: Timer::Maintenance,
            },
        ]
    }

    /// Publishes a transaction built from a caller-supplied vector.
    pub fn submit(&mut self, vector: ConceptVector, now: SimTime) -> Result<Vec<Action>> {
        let tx = self.engine.create_with_vector(vector, now)?;
        Ok(self.publish(&tx))
    }

    fn publish(&self, tx: &Transaction) -> Vec<Action> {
        vec![
            Action::Record(MetricSample::TransactionCreated {
                corrupted: tx.concept_vector.is_corrupted(),
            }),
            Action::Broadcast {
                audience: Audience::RoadsideUnits,
                message: Message::TransactionAnnounce(tx.announce()),
            },
        ]
    }

    fn handle_message(&mut self, from: NodeId, message: Message, now: SimTime) -> Vec<Action> {
        let mut actions = vec![Action::Record(MetricSample::MessageReceived)];
        match message {
            Message::Vote(vote) => self.on_vote(vote, now, &mut actions),
            Message::HandoverResult(result) => self.on_handover_result(result, now, &mut actions),
            other => {
                tracing::debug!(vehicle = %self.id, %from, kind = other.kind(), "vehicle ignored message");
            }
        }
        actions
    }

    fn on_vote(&mut self, vote: Vote, now: SimTime, actions: &mut Vec<Action>) {
        if vote.transaction_id.originator() != self.id {
            return;
        }
        let outcome = self.engine.on_receive_vote(vote, now);
        vote_samples(outcome, actions);
    }

    fn on_handover_result(&mut self, result: HandoverResult, now: SimTime, actions: &mut Vec<Action>) {
        if result.vehicle_id != self.id {
            return;
        }
        match self.handover.complete(result.provider_id, result.success, now) {
            HandoverOutcome::Completed { latency, .. } => {
                actions.push(Action::Record(MetricSample::HandoverSucceeded));
                actions.push(Action::Record(MetricSample::AuthenticationLatency(latency)));
            }
            HandoverOutcome::Failed { .. } | HandoverOutcome::TimedOut { .. } => {
                actions.push(Action::Record(MetricSample::HandoverFailed));
            }
            HandoverOutcome::Ignored => {}
        }
    }

    fn handle_timer(&mut self, timer: Timer, now: SimTime) -> Vec<Action> {
        match timer {
            Timer::SendTransaction => {
                let adversary = self.is_adversarial().then_some(&self.behavior);
                let tx = self.engine.create(now, &self.model, adversary, &mut self.rng);
                let mut actions = self.publish(&tx);
                actions.push(Action::SetTimer {
                    after: self.next_send_delay(),
                    timer: Timer::SendTransaction,
                });
                actions
            }
            Timer::CoverageCheck { position } => {
                let mut actions = self.check_coverage(position, now);
                actions.push(Action::SetTimer {
                    after: self.config.coverage_check_interval,
                    timer: Timer::CoverageCheck { position },
                });
                actions
            }
            Timer::Maintenance => {
                let mut actions = Vec::new();
                sweep_samples(&mut self.engine, now, &mut actions);
                if self
                    .handover
                    .expire(now, self.config.handover_timeout)
                    .is_some()
                {
                    actions.push(Action::Record(MetricSample::HandoverFailed));
                }
                actions.push(Action::SetTimer {
                    after: self.config.sweep_interval,
                    timer: Timer::Maintenance,
                });
                actions
            }
            Timer::HandoverAuthenticated { .. } | Timer::CastVote { .. } => Vec::new(),
        }
    }

    /// `message_interval` shifted by a uniform draw from
    /// `[-message_interval_jitter, message_interval_jitter]`.
    fn next_send_delay(&mut self) -> Duration {
        let interval = self.config.message_interval;
        let jitter = self.config.message_interval_jitter.as_micros() as i64;
        if jitter == 0 {
            return interval;
        }
        let offset = self.rng.gen_range(-jitter..=jitter);
        let shift = Duration::from_micros(offset.unsigned_abs());
        if offset < 0 {
            interval.saturating_sub(shift)
        } else {
            interval + shift
        }
    }

    /// Starts a handover if `position` is closer to another provider.
    pub fn check_coverage(&mut self, position: f64, now: SimTime) -> Vec<Action> {
        let nearest = self.coverage.nearest(position);
        let Some(request) = self.handover.evaluate(nearest, now) else {
            return Vec::new();
        };
        self.handover.mark_authenticating();
        tracing::debug!(
            vehicle = %self.id,
            target = %request.target_provider_id,
            position,
            "requesting handover"
        );
        vec![
            Action::Record(MetricSample::HandoverAttempt),
            Action::Send {
                to: request.target_provider_id,
                message: Message::HandoverRequest(request),
            },
        ]
    }
}

/// A fixed node that verifies transactions, votes and authenticates handovers.
pub struct RoadsideUnitNode {
    id: NodeId,
    config: Arc<ProtocolConfig>,
    engine: ConsensusEngine,
    verifier: SemanticVerifier,
    reference: Box<dyn ReferenceProvider + Send>,
    authority: HandoverAuthority,
    rng: ChaCha8Rng,
}

impl fmt::Debug for RoadsideUnitNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoadsideUnitNode")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

impl RoadsideUnitNode {
    /// Creates a roadside unit that knows `known_rsus` units in total.
    pub fn new(
        id: NodeId,
        config: Arc<ProtocolConfig>,
        known_rsus: usize,
        mut rng: ChaCha8Rng,
    ) -> Result<Self> {
        let model = ConceptModel::from_config(&config)?;
        let reference = reference_from_config(&config, &model, rng.gen());
        Ok(Self {
            id,
            engine: ConsensusEngine::new(EngineConfig::new(id, &config, known_rsus)),
            verifier: SemanticVerifier::new(config.as_ref().into()),
            reference,
            authority: HandoverAuthority::new(id, AuthorityConfig::from(config.as_ref())),
            config,
            rng,
        })
    }

    /// This unit's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The unit's consensus engine.
    pub fn engine(&self) -> &ConsensusEngine {
        &self.engine
    }

    /// The unit's handover authority.
    pub fn authority(&self) -> &HandoverAuthority {
        &self.authority
    }

    /// Timers to arm when the unit starts.
    pub fn start(&self) -> Vec<Action> {
        vec![Action::SetTimer {
            after: self.config.sweep_interval,
            timer: Timer::Maintenance,
        }]
    }

    fn handle_message(&mut self, from: NodeId, message: Message, now: SimTime) -> Vec<Action> {
        let mut actions = vec![Action::Record(MetricSample::MessageReceived)];
        match message {
            Message::TransactionAnnounce(announce) => self.on_announce(announce, now, &mut actions),
            Message::Vote(vote) => {
                let outcome = self.engine.on_receive_vote(vote, now);
                vote_samples(outcome, &mut actions);
            }
            Message::HandoverRequest(request) => self.on_handover_request(request, now, &mut actions),
            Message::HandoverResult(_) => {
                tracing::debug!(rsu = %self.id, %from, "roadside unit ignored handover result");
            }
        }
        actions
    }

    fn on_announce(&mut self, announce: TransactionAnnounce, now: SimTime, actions: &mut Vec<Action>) {
        let tx = match Transaction::try_from(announce) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(rsu = %self.id, kind = e.kind().as_str(), error = %e, "dropped announce");
                actions.push(Action::Record(MetricSample::MalformedMessage));
                return;
            }
        };
        let corrupted = tx.concept_vector.is_corrupted();
        let outcome =
            self.engine
                .on_receive_transaction(tx, now, &self.verifier, self.reference.as_mut());

        match outcome {
            ReceiveOutcome::Stale { .. } => {
                actions.push(Action::Record(MetricSample::TransactionStale));
            }
            ReceiveOutcome::Voted {
                vote,
                verification,
                decision,
            } => {
                actions.push(Action::Record(classify(verification, corrupted)));
                actions.push(match self.config.consensus_mode {
                    ConsensusMode::Semantic => Action::Broadcast {
                        audience: Audience::All,
                        message: Message::Vote(vote),
                    },
                    ConsensusMode::Baseline => Action::SetTimer {
                        after: self.baseline_vote_delay(),
                        timer: Timer::CastVote { vote },
                    },
                });
                if let Some(decision) = decision {
                    decision_samples(decision, actions);
                }
            }
            ReceiveOutcome::AlreadyTerminal
            | ReceiveOutcome::Duplicate
            | ReceiveOutcome::OwnTransaction => {}
        }
    }

    fn baseline_vote_delay(&mut self) -> Duration {
        let lo = self.config.baseline_vote_delay_min.as_micros() as u64;
        let hi = self.config.baseline_vote_delay_max.as_micros() as u64;
        if hi <= lo {
            return self.config.baseline_vote_delay_min;
        }
        Duration::from_micros(self.rng.gen_range(lo..=hi))
    }

    fn on_handover_request(&mut self, request: HandoverRequest, now: SimTime, actions: &mut Vec<Action>) {
        match self.authority.on_request(&request, now, &mut self.rng) {
            AuthDecision::Authenticate { delay } => actions.push(Action::SetTimer {
                after: delay,
                timer: Timer::HandoverAuthenticated {
                    vehicle: request.vehicle_id,
                },
            }),
            AuthDecision::Refused(result) => actions.push(Action::Send {
                to: result.vehicle_id,
                message: Message::HandoverResult(result),
            }),
            AuthDecision::Misrouted | AuthDecision::InProgress => {
                tracing::debug!(
                    rsu = %self.id,
                    vehicle = %request.vehicle_id,
                    target = %request.target_provider_id,
                    "dropped handover request"
                );
            }
        }
    }

    fn handle_timer(&mut self, timer: Timer, now: SimTime) -> Vec<Action> {
        match timer {
            Timer::HandoverAuthenticated { vehicle } => {
                match self.authority.on_authenticated(vehicle, now) {
                    Some((result, _)) => vec![Action::Send {
                        to: vehicle,
                        message: Message::HandoverResult(result),
                    }],
                    None => Vec::new(),
                }
            }
            Timer::CastVote { mut vote } => {
                vote.cast_at = now;
                vec![Action::Broadcast {
                    audience: Audience::All,
                    message: Message::Vote(vote),
                }]
            }
            Timer::Maintenance => {
                let mut actions = Vec::new();
                sweep_samples(&mut self.engine, now, &mut actions);
                actions.push(Action::SetTimer {
                    after: self.config.sweep_interval,
                    timer: Timer::Maintenance,
                });
                actions
            }
            Timer::SendTransaction | Timer::CoverageCheck { .. } => Vec::new(),
        }
    }
}

/// A node of either role.
#[derive(Debug)]
pub enum Node {
    /// A vehicle.
    Vehicle(VehicleNode),
    /// A roadside unit.
    RoadsideUnit(RoadsideUnitNode),
}

impl Node {
    /// The node's id.
    pub fn id(&self) -> NodeId {
        match self {
            Node::Vehicle(v) => v.id(),
            Node::RoadsideUnit(r) => r.id(),
        }
    }

    /// The node's consensus engine.
    pub fn engine(&self) -> &ConsensusEngine {
        match self {
            Node::Vehicle(v) => v.engine(),
            Node::RoadsideUnit(r) => r.engine(),
        }
    }

    /// The vehicle, if this node is one.
    pub fn as_vehicle(&self) -> Option<&VehicleNode> {
        match self {
            Node::Vehicle(v) => Some(v),
            Node::RoadsideUnit(_) => None,
        }
    }

    /// Mutable access to the vehicle, if this node is one.
    pub fn as_vehicle_mut(&mut self) -> Option<&mut VehicleNode> {
        match self {
            Node::Vehicle(v) => Some(v),
            Node::RoadsideUnit(_) => None,
        }
    }

    /// The roadside unit, if this node is one.
    pub fn as_roadside_unit(&self) -> Option<&RoadsideUnitNode> {
        match self {
            Node::Vehicle(_) => None,
            Node::RoadsideUnit(r) => Some(r),
        }
    }

    /// Handles a decoded message.
    pub fn handle_message(&mut self, from: NodeId, message: Message, now: SimTime) -> Vec<Action> {
        match self {
            Node::Vehicle(v) => v.handle_message(from, message, now),
            Node::RoadsideUnit(r) => r.handle_message(from, message, now),
        }
    }

    /// Decodes and handles raw wire bytes. Undecodable input is dropped.
    pub fn handle_wire(&mut self, from: NodeId, bytes: &[u8], now: SimTime) -> Vec<Action> {
        match Message::decode(bytes) {
            Ok(message) => self.handle_message(from, message, now),
            Err(e) => {
                tracing::warn!(
                    node = %self.id(),
                    %from,
                    kind = e.kind().as_str(),
                    error = %e,
                    "dropped undecodable message"
                );
                vec![
                    Action::Record(MetricSample::MessageReceived),
                    Action::Record(MetricSample::MalformedMessage),
                ]
            }
        }
    }

    /// Handles a fired timer.
    pub fn handle_timer(&mut self, timer: Timer, now: SimTime) -> Vec<Action> {
        match self {
            Node::Vehicle(v) => v.handle_timer(timer, now),
            Node::RoadsideUnit(r) => r.handle_timer(timer, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config() -> Arc<ProtocolConfig> {
        Arc::new(ProtocolConfig {
            estimated_quorum_size: Some(5),
            ..Default::default()
        })
    }

    fn coverage() -> Arc<CoverageMap> {
        Arc::new(CoverageMap::new(
            (0..5).map(|i| (NodeId(i), 2000.0 + 4000.0 * i as f64)).collect(),
            1000.0,
        ))
    }

    fn vehicle(id: u32, registry: AdversarialRegistry) -> VehicleNode {
        VehicleNode::new(
            NodeId(id),
            config(),
            coverage(),
            Arc::new(registry),
            2000.0,
            ChaCha8Rng::seed_from_u64(id as u64),
        )
        .unwrap()
    }

    fn rsu(id: u32) -> RoadsideUnitNode {
        RoadsideUnitNode::new(NodeId(id), config(), 5, ChaCha8Rng::seed_from_u64(id as u64)).unwrap()
    }

    fn clean_vector(origin: u32) -> ConceptVector {
        ConceptVector::new(
            vec![0.5, 0.4, 0.6, 0.5, 0.5, 0.5, 0.3, 0.5, 0.7, 0.5],
            NodeId(origin),
            SimTime::ZERO,
        )
    }

    fn records(actions: &[Action]) -> Vec<MetricSample> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Record(sample) => Some(*sample),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_classify() {
        let rejected = Verification::Rejected(crate::verifier::RejectionReason::ExcessiveVariance);
        assert_eq!(classify(Verification::Accepted, false), MetricSample::ValidTransaction);
        assert_eq!(classify(Verification::Accepted, true), MetricSample::UndetectedCorruption);
        assert_eq!(classify(rejected, true), MetricSample::MalformedDetected);
        assert_eq!(classify(rejected, false), MetricSample::FalsePositive);
    }

    #[test]
    fn test_vehicle_starts_at_nearest_provider() {
        let v = vehicle(10, AdversarialRegistry::default());
        assert_eq!(v.current_provider(), Some(NodeId(0)));
        assert!(!v.is_adversarial());
    }

    #[test]
    fn test_submit_broadcasts_to_rsus() {
        let mut v = vehicle(10, AdversarialRegistry::default());
        let actions = v.submit(clean_vector(10), SimTime::ZERO).unwrap();

        assert_eq!(
            records(&actions),
            vec![MetricSample::TransactionCreated { corrupted: false }]
        );
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Broadcast {
                audience: Audience::RoadsideUnits,
                message: Message::TransactionAnnounce(_)
            }
        )));
    }

    #[test]
    fn test_adversarial_vehicle_corrupts() {
        let mut node = Node::Vehicle(vehicle(10, AdversarialRegistry::from_ids([NodeId(10)])));
        let actions = node.handle_timer(Timer::SendTransaction, SimTime::ZERO);
        assert!(records(&actions).contains(&MetricSample::TransactionCreated { corrupted: true }));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer { timer: Timer::SendTransaction, .. }
        )));
    }

    #[test]
    fn test_send_interval_is_jittered() {
        let mut node = Node::Vehicle(vehicle(10, AdversarialRegistry::default()));
        let mut delays = Vec::new();
        for i in 0..20 {
            let actions = node.handle_timer(Timer::SendTransaction, SimTime::from_secs_f64(2.0 * i as f64));
            delays.extend(actions.iter().filter_map(|a| match a {
                Action::SetTimer { after, timer: Timer::SendTransaction } => Some(*after),
                _ => None,
            }));
        }
        assert_eq!(delays.len(), 20);
        assert!(delays
            .iter()
            .all(|d| (Duration::from_millis(1900)..=Duration::from_millis(2100)).contains(d)));
        assert!(delays.iter().any(|d| *d != delays[0]));
    }

    #[test]
    fn test_send_interval_without_jitter() {
        let config = Arc::new(ProtocolConfig {
            message_interval_jitter: Duration::ZERO,
            ..Default::default()
        });
        let v = VehicleNode::new(
            NodeId(10),
            config,
            coverage(),
            Arc::new(AdversarialRegistry::default()),
            2000.0,
            ChaCha8Rng::seed_from_u64(10),
        )
        .unwrap();
        let mut node = Node::Vehicle(v);
        let actions = node.handle_timer(Timer::SendTransaction, SimTime::ZERO);
        assert!(actions.contains(&Action::SetTimer {
            after: Duration::from_secs(2),
            timer: Timer::SendTransaction,
        }));
    }

    #[test]
    fn test_rsu_votes_and_classifies() {
        let mut v = vehicle(10, AdversarialRegistry::default());
        let actions = v.submit(clean_vector(10), SimTime::ZERO).unwrap();
        let announce = actions
            .into_iter()
            .find_map(|a| match a {
                Action::Broadcast { message, .. } => Some(message),
                _ => None,
            })
            .unwrap();

        let mut node = Node::RoadsideUnit(rsu(0));
        let actions = node.handle_message(NodeId(10), announce, SimTime::from_millis(5));
        assert_eq!(
            records(&actions),
            vec![MetricSample::MessageReceived, MetricSample::ValidTransaction]
        );
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Broadcast {
                audience: Audience::All,
                message: Message::Vote(Vote { accept: true, .. })
            }
        )));
    }

    #[test]
    fn test_baseline_unit_accepts_corruption_and_delays_vote() {
        let config = Arc::new(ProtocolConfig {
            consensus_mode: ConsensusMode::Baseline,
            estimated_quorum_size: Some(5),
            ..Default::default()
        });
        let mut node = Node::RoadsideUnit(
            RoadsideUnitNode::new(NodeId(0), config, 5, ChaCha8Rng::seed_from_u64(0)).unwrap(),
        );
        let s = 3.0_f64.sqrt();
        let vector = ConceptVector::new(vec![s, -s, s, -s, s, -s, s, -s, s, -s], NodeId(10), SimTime::ZERO)
            .with_corrupted(true);
        let tx = Transaction::new(
            cocochain_types::TransactionId::compose(NodeId(10), 1),
            vector,
            SimTime::ZERO,
        );

        let actions = node.handle_message(
            NodeId(10),
            Message::TransactionAnnounce(tx.announce()),
            SimTime::from_millis(5),
        );
        assert_eq!(
            records(&actions),
            vec![MetricSample::MessageReceived, MetricSample::UndetectedCorruption]
        );
        assert!(!actions.iter().any(|a| matches!(a, Action::Broadcast { .. })));
        let (after, timer) = actions
            .iter()
            .find_map(|a| match a {
                Action::SetTimer { after, timer } => Some((*after, *timer)),
                _ => None,
            })
            .unwrap();
        assert!((Duration::from_millis(10)..=Duration::from_millis(50)).contains(&after));

        let actions = node.handle_timer(timer, SimTime::from_millis(5) + after);
        match actions.as_slice() {
            [Action::Broadcast {
                audience: Audience::All,
                message: Message::Vote(vote),
            }] => {
                assert!(vote.accept);
                assert_eq!(vote.voter_id, NodeId(0));
                assert_eq!(vote.cast_at, SimTime::from_millis(5) + after);
            }
            other => panic!("unexpected actions {other:?}"),
        }
    }

    #[test]
    fn test_announce_with_foreign_originator_is_malformed() {
        let mut v = vehicle(10, AdversarialRegistry::default());
        let actions = v.submit(clean_vector(10), SimTime::ZERO).unwrap();
        let mut announce = actions
            .into_iter()
            .find_map(|a| match a {
                Action::Broadcast {
                    message: Message::TransactionAnnounce(announce),
                    ..
                } => Some(announce),
                _ => None,
            })
            .unwrap();
        announce.originator_id = NodeId(11);

        let mut node = Node::RoadsideUnit(rsu(0));
        let actions = node.handle_message(NodeId(11), Message::TransactionAnnounce(announce), SimTime::ZERO);
        assert_eq!(
            records(&actions),
            vec![MetricSample::MessageReceived, MetricSample::MalformedMessage]
        );
        assert_eq!(node.engine().unresolved(), 0);
    }

    #[test]
    fn test_vehicle_ignores_foreign_votes() {
        let mut node = Node::Vehicle(vehicle(10, AdversarialRegistry::default()));
        let vote = Vote {
            transaction_id: cocochain_types::TransactionId::compose(NodeId(11), 1),
            voter_id: NodeId(0),
            accept: true,
            cast_at: SimTime::ZERO,
        };
        let actions = node.handle_message(NodeId(0), Message::Vote(vote), SimTime::ZERO);
        assert_eq!(records(&actions), vec![MetricSample::MessageReceived]);
        assert_eq!(node.engine().tally(vote.transaction_id).map(|t| t.total()), None);
    }

    #[test]
    fn test_undecodable_wire_is_dropped() {
        let mut node = Node::RoadsideUnit(rsu(0));
        let actions = node.handle_wire(NodeId(10), b"\x00garbage", SimTime::ZERO);
        assert_eq!(
            records(&actions),
            vec![MetricSample::MessageReceived, MetricSample::MalformedMessage]
        );
    }

    #[test]
    fn test_coverage_check_requests_handover() {
        let mut v = vehicle(10, AdversarialRegistry::default());
        assert!(v.check_coverage(2500.0, SimTime::ZERO).is_empty());

        let actions = v.check_coverage(5500.0, SimTime::from_millis(100));
        assert!(records(&actions).contains(&MetricSample::HandoverAttempt));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Send { to: NodeId(1), message: Message::HandoverRequest(_) }
        )));
        assert!(v.check_coverage(9500.0, SimTime::from_millis(200)).is_empty());
    }

    #[test]
    fn test_rsu_authenticates_after_delay() {
        let config = Arc::new(ProtocolConfig {
            range_check_pass_rate: 1.0,
            ..Default::default()
        });
        let mut node = Node::RoadsideUnit(
            RoadsideUnitNode::new(NodeId(1), config, 5, ChaCha8Rng::seed_from_u64(1)).unwrap(),
        );
        let request = HandoverRequest {
            vehicle_id: NodeId(10),
            source_provider_id: Some(NodeId(0)),
            target_provider_id: NodeId(1),
            requested_at: SimTime::ZERO,
        };

        let actions = node.handle_message(NodeId(10), Message::HandoverRequest(request), SimTime::ZERO);
        let timer = actions
            .iter()
            .find_map(|a| match a {
                Action::SetTimer { timer, .. } => Some(*timer),
                _ => None,
            })
            .unwrap();
        assert_eq!(timer, Timer::HandoverAuthenticated { vehicle: NodeId(10) });

        let actions = node.handle_timer(timer, SimTime::from_millis(8));
        assert_eq!(
            actions,
            vec![Action::Send {
                to: NodeId(10),
                message: Message::HandoverResult(HandoverResult {
                    vehicle_id: NodeId(10),
                    provider_id: NodeId(1),
                    success: true,
                }),
            }]
        );
    }
}
