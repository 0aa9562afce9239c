//! Per-node consensus engine.
//!
//! Every node runs one engine. It tracks the transactions the node has
//! created or received, tallies votes by transaction id and decides each
//! transaction exactly once:
//!
//! 1. A roadside unit receives a transaction, verifies it and casts its own
//!    vote, which it broadcasts.
//! 2. Votes from every voter are tallied; at most one per voter counts.
//! 3. Once `required = ceil(quorum_size * bft_threshold)` votes are in, the
//!    transaction is finalized if at least `required` accepted, otherwise it
//!    is rejected.
//!
//! Delivery is FIFO per sender only, so a vote can overtake the transaction
//! it refers to. Such votes are buffered and replayed once the transaction
//! arrives; they never decide anything on their own.

use crate::adversary::AdversarialBehavior;
use crate::concept::{ConceptModel, ConceptVector};
use crate::config::{required_votes, ProtocolConfig};
use crate::error::{ConsensusError, Result};
use crate::message::{Vote, VoteTally};
use crate::transaction::{Transaction, TransactionState};
use crate::verifier::{ReferenceProvider, SemanticVerifier, Verification};
use cocochain_types::{NodeId, SimTime, TransactionId};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the consensus engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The node running this engine.
    pub node_id: NodeId,

    /// Age after which a transaction is stale.
    pub max_transaction_age: Duration,

    /// Fraction of the quorum that must accept.
    pub bft_threshold: f64,

    /// Number of voters the threshold applies to.
    pub quorum_size: usize,

    /// How long terminal ids are remembered.
    pub terminal_retention: Duration,

    /// Expected concept vector dimensionality.
    pub dimensionality: usize,
}

impl EngineConfig {
    /// Derives the engine configuration for `node_id`.
    ///
    /// The quorum size is `estimated_quorum_size` when configured, otherwise
    /// the number of roadside units known to the node.
    pub fn new(node_id: NodeId, config: &ProtocolConfig, known_rsus: usize) -> Self {
        Self {
            node_id,
            max_transaction_age: config.max_transaction_age,
            bft_threshold: config.bft_threshold,
            quorum_size: config.estimated_quorum_size.unwrap_or(known_rsus),
            terminal_retention: config.terminal_retention,
            dimensionality: config.concept_dimensionality,
        }
    }

    /// Votes needed before a decision is taken.
    pub fn required_votes(&self) -> usize {
        required_votes(self.quorum_size, self.bft_threshold)
    }
}

/// How a quorum decided a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Accepted. Carries the end-to-end latency when this node originated
    /// the transaction.
    Finalized {
        /// Time from creation to finalization.
        latency: Option<Duration>,
    },
    /// Rejected.
    Rejected,
}

/// Result of [`ConsensusEngine::on_receive_transaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    /// The id was already finalized or rejected.
    AlreadyTerminal,
    /// The transaction is already being tracked.
    Duplicate,
    /// This node created the transaction.
    OwnTransaction,
    /// Older than `max_transaction_age`; discarded without a vote.
    Stale {
        /// Age on arrival.
        age: Duration,
    },
    /// Verified and voted on.
    Voted {
        /// The vote to broadcast.
        vote: Vote,
        /// The verifier's verdict.
        verification: Verification,
        /// Set if the vote, together with buffered votes, reached quorum.
        decision: Option<Decision>,
    },
}

/// Result of [`ConsensusEngine::on_receive_vote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The id was already finalized or rejected.
    AlreadyTerminal,
    /// The transaction aged out while waiting and was evicted.
    Expired,
    /// The voter already voted on this transaction.
    Duplicate,
    /// The transaction is unknown; the vote is held until it arrives.
    Buffered,
    /// Counted; quorum not reached yet.
    Recorded {
        /// Accepting votes so far.
        accept: usize,
        /// Votes so far.
        total: usize,
        /// Votes needed.
        required: usize,
    },
    /// Counted and the quorum decided.
    Decided {
        /// The decision.
        decision: Decision,
        /// Accepting votes.
        accept: usize,
        /// Votes counted.
        total: usize,
    },
}

/// What [`ConsensusEngine::sweep`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending transactions evicted for age.
    pub expired: usize,
    /// Buffers of early votes dropped for age.
    pub dropped_vote_buffers: usize,
    /// Terminal records past retention.
    pub forgotten_terminal: usize,
}

impl SweepReport {
    /// Whether the sweep removed anything.
    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.dropped_vote_buffers == 0 && self.forgotten_terminal == 0
    }
}

/// Running counters kept by an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Transactions created locally.
    pub created: u64,
    /// Transactions verified and voted on.
    pub voted: u64,
    /// Transactions finalized.
    pub finalized: u64,
    /// Transactions rejected.
    pub rejected: u64,
    /// Transactions discarded as stale on arrival.
    pub stale: u64,
    /// Pending transactions evicted for age.
    pub expired: u64,
    /// Votes ignored because the voter already voted.
    pub duplicate_votes: u64,
}

#[derive(Debug, Clone, Copy)]
struct TerminalRecord {
    state: TransactionState,
    at: SimTime,
}

/// The per-node transaction lifecycle and vote aggregator.
#[derive(Debug)]
pub struct ConsensusEngine {
    config: EngineConfig,
    sequence: u32,
    /// Transactions awaiting a decision.
    pending: HashMap<TransactionId, Transaction>,
    /// Tallies by id. Entries without a pending transaction are early-vote buffers.
    tallies: HashMap<TransactionId, VoteTally>,
    /// Creation times of locally originated transactions.
    start_times: HashMap<TransactionId, SimTime>,
    terminal: HashMap<TransactionId, TerminalRecord>,
    stats: EngineStats,
}

impl ConsensusEngine {
    /// Creates an empty engine.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            sequence: 0,
            pending: HashMap::new(),
            tallies: HashMap::new(),
            start_times: HashMap::new(),
            terminal: HashMap::new(),
            stats: EngineStats::default(),
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The node running this engine.
    pub fn node_id(&self) -> NodeId {
        self.config.node_id
    }

    /// Running counters.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Creates a transaction from a freshly generated vector.
    ///
    /// When `adversary` is set the vector is corrupted before digesting.
    pub fn create<R: Rng + ?Sized>(
        &mut self,
        now: SimTime,
        model: &ConceptModel,
        adversary: Option<&AdversarialBehavior>,
        rng: &mut R,
    ) -> Transaction {
        let mut vector = model.generate(self.config.node_id, now, rng);
        if let Some(behavior) = adversary {
            behavior.apply(&mut vector, rng);
        }
        self.admit_own(vector, now)
    }

    /// Creates a transaction from a caller-supplied vector.
    pub fn create_with_vector(&mut self, vector: ConceptVector, now: SimTime) -> Result<Transaction> {
        if vector.dimensionality() != self.config.dimensionality {
            return Err(ConsensusError::DimensionMismatch {
                expected: self.config.dimensionality,
                actual: vector.dimensionality(),
            });
        }
        Ok(self.admit_own(vector, now))
    }

    fn admit_own(&mut self, vector: ConceptVector, now: SimTime) -> Transaction {
        self.sequence = self.sequence.wrapping_add(1);
        let id = TransactionId::compose(self.config.node_id, self.sequence);

        let mut tx = Transaction::new(id, vector, now);
        tx.state = TransactionState::AwaitingQuorum;

        self.start_times.insert(id, now);
        self.tallies.insert(id, VoteTally::new(now));
        self.pending.insert(id, tx.clone());
        self.stats.created += 1;

        tracing::debug!(
            tx = %id,
            corrupted = tx.concept_vector.is_corrupted(),
            "created transaction"
        );
        tx
    }

    /// Handles a transaction received from the network.
    pub fn on_receive_transaction<P>(
        &mut self,
        mut tx: Transaction,
        now: SimTime,
        verifier: &SemanticVerifier,
        reference: &mut P,
    ) -> ReceiveOutcome
    where
        P: ReferenceProvider + ?Sized,
    {
        let id = tx.id;
        if self.terminal.contains_key(&id) {
            return ReceiveOutcome::AlreadyTerminal;
        }
        if tx.originator_id == self.config.node_id {
            return ReceiveOutcome::OwnTransaction;
        }
        if self.pending.contains_key(&id) {
            return ReceiveOutcome::Duplicate;
        }

        let age = tx.age(now);
        if age > self.config.max_transaction_age {
            self.tallies.remove(&id);
            self.stats.stale += 1;
            tracing::debug!(tx = %id, age_secs = age.as_secs_f64(), "discarded stale transaction");
            return ReceiveOutcome::Stale { age };
        }

        let verification = verifier.verify(&tx, reference);
        let accept = verification.is_accepted();
        let vote = Vote {
            transaction_id: id,
            voter_id: self.config.node_id,
            accept,
            cast_at: now,
        };

        let tally = self.tallies.entry(id).or_insert_with(|| VoteTally::new(now));
        tally.record(self.config.node_id, accept);
        tx.state = TransactionState::AwaitingQuorum;
        self.pending.insert(id, tx);
        self.stats.voted += 1;

        tracing::debug!(
            tx = %id,
            accept,
            reason = verification.reason().map(|r| r.as_str()),
            "voted on transaction"
        );

        let decision = self.check_quorum(id, now).map(|(decision, _, _)| decision);
        ReceiveOutcome::Voted {
            vote,
            verification,
            decision,
        }
    }

    /// Handles a vote received from the network.
    pub fn on_receive_vote(&mut self, vote: Vote, now: SimTime) -> VoteOutcome {
        let id = vote.transaction_id;
        if self.terminal.contains_key(&id) {
            return VoteOutcome::AlreadyTerminal;
        }

        let Some(tx) = self.pending.get(&id) else {
            let tally = self.tallies.entry(id).or_insert_with(|| VoteTally::new(now));
            if !tally.record(vote.voter_id, vote.accept) {
                self.stats.duplicate_votes += 1;
                return VoteOutcome::Duplicate;
            }
            tracing::debug!(tx = %id, voter = %vote.voter_id, "buffered early vote");
            return VoteOutcome::Buffered;
        };

        if tx.age(now) > self.config.max_transaction_age {
            self.evict(id);
            self.stats.expired += 1;
            tracing::debug!(tx = %id, "evicted expired transaction");
            return VoteOutcome::Expired;
        }

        let tally = self.tallies.entry(id).or_insert_with(|| VoteTally::new(now));
        if !tally.record(vote.voter_id, vote.accept) {
            self.stats.duplicate_votes += 1;
            return VoteOutcome::Duplicate;
        }

        match self.check_quorum(id, now) {
            Some((decision, accept, total)) => VoteOutcome::Decided {
                decision,
                accept,
                total,
            },
            None => {
                let (accept, total) = self
                    .tallies
                    .get(&id)
                    .map(|t| (t.accept_count(), t.total()))
                    .unwrap_or_default();
                VoteOutcome::Recorded {
                    accept,
                    total,
                    required: self.config.required_votes(),
                }
            }
        }
    }

    fn check_quorum(&mut self, id: TransactionId, now: SimTime) -> Option<(Decision, usize, usize)> {
        let required = self.config.required_votes();
        let tally = self.tallies.get(&id)?;
        let (accept, total) = (tally.accept_count(), tally.total());
        if total < required {
            return None;
        }

        let decision = if accept >= required {
            Decision::Finalized {
                latency: self.settle(id, TransactionState::Finalized, now),
            }
        } else {
            self.settle(id, TransactionState::Rejected, now);
            Decision::Rejected
        };
        Some((decision, accept, total))
    }

    /// Marks a pending transaction finalized.
    ///
    /// Returns the end-to-end latency if this node originated it.
    pub fn finalize(&mut self, id: TransactionId, now: SimTime) -> Result<Option<Duration>> {
        self.ensure_pending(id)?;
        Ok(self.settle(id, TransactionState::Finalized, now))
    }

    /// Marks a pending transaction rejected.
    pub fn reject(&mut self, id: TransactionId, now: SimTime) -> Result<()> {
        self.ensure_pending(id)?;
        self.settle(id, TransactionState::Rejected, now);
        Ok(())
    }

    fn ensure_pending(&self, id: TransactionId) -> Result<()> {
        if let Some(record) = self.terminal.get(&id) {
            return Err(ConsensusError::ProtocolViolation(format!(
                "transaction {id} is already {}",
                record.state.as_str()
            )));
        }
        if !self.pending.contains_key(&id) {
            return Err(ConsensusError::ProtocolViolation(format!(
                "transaction {id} is unknown"
            )));
        }
        Ok(())
    }

    fn settle(&mut self, id: TransactionId, state: TransactionState, now: SimTime) -> Option<Duration> {
        self.pending.remove(&id);
        self.tallies.remove(&id);
        let latency = self.start_times.remove(&id).map(|start| now - start);
        self.terminal.insert(id, TerminalRecord { state, at: now });

        match state {
            TransactionState::Finalized => self.stats.finalized += 1,
            _ => self.stats.rejected += 1,
        }
        tracing::info!(
            tx = %id,
            state = state.as_str(),
            latency_secs = latency.map(|l| l.as_secs_f64()),
            "transaction decided"
        );
        latency
    }

    fn evict(&mut self, id: TransactionId) {
        self.pending.remove(&id);
        self.tallies.remove(&id);
        self.start_times.remove(&id);
    }

    /// Evicts aged-out state.
    ///
    /// Terminal ids are kept for at least `max_transaction_age`, so a
    /// re-announced id is either recognized as terminal or stale.
    pub fn sweep(&mut self, now: SimTime) -> SweepReport {
        let max_age = self.config.max_transaction_age;
        let retention = self.config.terminal_retention.max(max_age);
        let mut report = SweepReport::default();

        let expired: Vec<_> = self
            .pending
            .values()
            .filter(|tx| tx.age(now) > max_age)
            .map(|tx| tx.id)
            .collect();
        for id in &expired {
            self.evict(*id);
        }
        report.expired = expired.len();
        self.stats.expired += expired.len() as u64;

        let pending = &self.pending;
        let before = self.tallies.len();
        self.tallies
            .retain(|id, tally| pending.contains_key(id) || now - tally.opened_at() <= max_age);
        report.dropped_vote_buffers = before - self.tallies.len();

        let before = self.terminal.len();
        self.terminal.retain(|_, record| now - record.at <= retention);
        report.forgotten_terminal = before - self.terminal.len();

        if !report.is_empty() {
            tracing::debug!(
                expired = report.expired,
                dropped_vote_buffers = report.dropped_vote_buffers,
                forgotten_terminal = report.forgotten_terminal,
                "swept consensus state"
            );
        }
        report
    }

    /// Number of transactions still awaiting a decision.
    pub fn unresolved(&self) -> usize {
        self.pending.len()
    }

    /// Ids of transactions awaiting a decision, sorted.
    pub fn unresolved_ids(&self) -> Vec<TransactionId> {
        let mut ids: Vec<_> = self.pending.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Local state of a transaction, if it is pending or still remembered as
    /// terminal.
    pub fn state(&self, id: TransactionId) -> Option<TransactionState> {
        self.pending
            .get(&id)
            .map(|tx| tx.state)
            .or_else(|| self.terminal.get(&id).map(|record| record.state))
    }

    /// A pending transaction.
    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.pending.get(&id)
    }

    /// The vote tally for a pending or buffered id.
    pub fn tally(&self, id: TransactionId) -> Option<&VoteTally> {
        self.tallies.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::ConstantReference;

    fn engine(node: u32, quorum_size: usize, threshold: f64) -> ConsensusEngine {
        let config = ProtocolConfig {
            bft_threshold: threshold,
            estimated_quorum_size: Some(quorum_size),
            ..Default::default()
        };
        ConsensusEngine::new(EngineConfig::new(NodeId(node), &config, 0))
    }

    fn clean_vector(origin: u32, at: SimTime) -> ConceptVector {
        ConceptVector::new(
            vec![0.5, 0.4, 0.6, 0.5, 0.5, 0.5, 0.3, 0.5, 0.7, 0.5],
            NodeId(origin),
            at,
        )
    }

    fn vote(tx: TransactionId, voter: u32, accept: bool) -> Vote {
        Vote {
            transaction_id: tx,
            voter_id: NodeId(voter),
            accept,
            cast_at: SimTime::ZERO,
        }
    }

    #[test]
    fn test_quorum_size_falls_back_to_known_rsus() {
        let config = EngineConfig::new(NodeId(0), &ProtocolConfig::default(), 5);
        assert_eq!(config.quorum_size, 5);
        assert_eq!(config.required_votes(), 4);
    }

    #[test]
    fn test_create_allocates_unique_ids() {
        let mut engine = engine(3, 5, 0.67);
        let a = engine.create_with_vector(clean_vector(3, SimTime::ZERO), SimTime::ZERO).unwrap();
        let b = engine.create_with_vector(clean_vector(3, SimTime::ZERO), SimTime::ZERO).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.id.originator(), NodeId(3));
        assert_eq!(engine.state(a.id), Some(TransactionState::AwaitingQuorum));
        assert_eq!(engine.unresolved(), 2);
    }

    #[test]
    fn test_create_rejects_wrong_dimensionality() {
        let mut engine = engine(3, 5, 0.67);
        let short = ConceptVector::new(vec![0.1; 3], NodeId(3), SimTime::ZERO);
        let err = engine.create_with_vector(short, SimTime::ZERO).unwrap_err();
        assert!(matches!(err, ConsensusError::DimensionMismatch { expected: 10, actual: 3 }));
    }

    #[test]
    fn test_fifth_vote_finalizes_once() {
        let mut engine = engine(100, 5, 1.0);
        let tx = engine.create_with_vector(clean_vector(100, SimTime::ZERO), SimTime::ZERO).unwrap();
        let now = SimTime::from_millis(10);

        for voter in 0..4 {
            let outcome = engine.on_receive_vote(vote(tx.id, voter, true), now);
            assert!(matches!(outcome, VoteOutcome::Recorded { required: 5, .. }));
        }
        assert_eq!(engine.state(tx.id), Some(TransactionState::AwaitingQuorum));

        let outcome = engine.on_receive_vote(vote(tx.id, 4, true), now);
        assert_eq!(
            outcome,
            VoteOutcome::Decided {
                decision: Decision::Finalized {
                    latency: Some(Duration::from_millis(10))
                },
                accept: 5,
                total: 5,
            }
        );
        assert_eq!(engine.state(tx.id), Some(TransactionState::Finalized));

        let outcome = engine.on_receive_vote(vote(tx.id, 5, true), now);
        assert_eq!(outcome, VoteOutcome::AlreadyTerminal);
        assert_eq!(engine.stats().finalized, 1);
    }

    #[test]
    fn test_reject_when_accepts_fall_short() {
        let mut engine = engine(100, 5, 0.67);
        let tx = engine.create_with_vector(clean_vector(100, SimTime::ZERO), SimTime::ZERO).unwrap();
        let now = SimTime::from_millis(10);

        engine.on_receive_vote(vote(tx.id, 0, true), now);
        engine.on_receive_vote(vote(tx.id, 1, false), now);
        engine.on_receive_vote(vote(tx.id, 2, true), now);
        let outcome = engine.on_receive_vote(vote(tx.id, 3, true), now);

        assert_eq!(
            outcome,
            VoteOutcome::Decided {
                decision: Decision::Rejected,
                accept: 3,
                total: 4,
            }
        );
        assert_eq!(engine.unresolved(), 0);
    }

    #[test]
    fn test_duplicate_vote_does_not_change_total() {
        let mut engine = engine(100, 5, 0.67);
        let tx = engine.create_with_vector(clean_vector(100, SimTime::ZERO), SimTime::ZERO).unwrap();

        engine.on_receive_vote(vote(tx.id, 0, true), SimTime::ZERO);
        let outcome = engine.on_receive_vote(vote(tx.id, 0, false), SimTime::ZERO);

        assert_eq!(outcome, VoteOutcome::Duplicate);
        assert_eq!(engine.tally(tx.id).map(|t| t.total()), Some(1));
        assert_eq!(engine.tally(tx.id).map(|t| t.accept_count()), Some(1));
    }

    #[test]
    fn test_receive_transaction_votes() {
        let mut origin = engine(100, 5, 0.67);
        let tx = origin.create_with_vector(clean_vector(100, SimTime::ZERO), SimTime::ZERO).unwrap();

        let mut rsu = engine(0, 5, 0.67);
        let verifier = SemanticVerifier::default();
        let outcome = rsu.on_receive_transaction(
            Transaction::try_from(tx.announce()).unwrap(),
            SimTime::from_millis(5),
            &verifier,
            &mut ConstantReference::default(),
        );

        match outcome {
            ReceiveOutcome::Voted { vote, verification, decision } => {
                assert!(vote.accept);
                assert_eq!(vote.voter_id, NodeId(0));
                assert!(verification.is_accepted());
                assert_eq!(decision, None);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(rsu.state(tx.id), Some(TransactionState::AwaitingQuorum));
        assert_eq!(rsu.tally(tx.id).map(|t| t.total()), Some(1));

        let again = rsu.on_receive_transaction(
            Transaction::try_from(tx.announce()).unwrap(),
            SimTime::from_millis(6),
            &verifier,
            &mut ConstantReference::default(),
        );
        assert_eq!(again, ReceiveOutcome::Duplicate);
    }

    #[test]
    fn test_own_and_stale_transactions_ignored() {
        let mut engine = engine(100, 5, 0.67);
        let verifier = SemanticVerifier::default();
        let own = engine.create_with_vector(clean_vector(100, SimTime::ZERO), SimTime::ZERO).unwrap();
        assert_eq!(
            engine.on_receive_transaction(own, SimTime::ZERO, &verifier, &mut ConstantReference::default()),
            ReceiveOutcome::OwnTransaction
        );

        let id = TransactionId::compose(NodeId(7), 1);
        let old = Transaction::new(id, clean_vector(7, SimTime::ZERO), SimTime::ZERO);
        let outcome = engine.on_receive_transaction(
            old,
            SimTime::from_millis(10_001),
            &verifier,
            &mut ConstantReference::default(),
        );
        assert!(matches!(outcome, ReceiveOutcome::Stale { .. }));
        assert_eq!(engine.state(id), None);
    }

    #[test]
    fn test_early_votes_are_buffered_and_replayed() {
        let mut rsu = engine(0, 5, 0.67);
        let verifier = SemanticVerifier::default();
        let id = TransactionId::compose(NodeId(100), 1);

        for voter in 1..4 {
            assert_eq!(rsu.on_receive_vote(vote(id, voter, true), SimTime::ZERO), VoteOutcome::Buffered);
        }
        assert_eq!(rsu.unresolved(), 0);
        assert_eq!(rsu.state(id), None);

        let tx = Transaction::new(id, clean_vector(100, SimTime::ZERO), SimTime::ZERO);
        let outcome = rsu.on_receive_transaction(
            tx,
            SimTime::from_millis(5),
            &verifier,
            &mut ConstantReference::default(),
        );
        assert!(matches!(
            outcome,
            ReceiveOutcome::Voted {
                decision: Some(Decision::Finalized { latency: None }),
                ..
            }
        ));
    }

    #[test]
    fn test_finalize_and_reject_violations() {
        let mut engine = engine(100, 5, 0.67);
        let tx = engine.create_with_vector(clean_vector(100, SimTime::ZERO), SimTime::ZERO).unwrap();

        let latency = engine.finalize(tx.id, SimTime::from_millis(40)).unwrap();
        assert_eq!(latency, Some(Duration::from_millis(40)));

        let err = engine.finalize(tx.id, SimTime::from_millis(41)).unwrap_err();
        assert!(matches!(err, ConsensusError::ProtocolViolation(_)));
        assert!(engine.reject(tx.id, SimTime::from_millis(41)).is_err());

        let unknown = TransactionId::compose(NodeId(9), 9);
        assert!(engine.reject(unknown, SimTime::ZERO).is_err());
    }

    #[test]
    fn test_vote_on_aged_transaction_expires_it() {
        let mut engine = engine(100, 5, 0.67);
        let tx = engine.create_with_vector(clean_vector(100, SimTime::ZERO), SimTime::ZERO).unwrap();

        let outcome = engine.on_receive_vote(vote(tx.id, 0, true), SimTime::from_secs_f64(11.0));
        assert_eq!(outcome, VoteOutcome::Expired);
        assert_eq!(engine.unresolved(), 0);
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn test_sweep_evicts_aged_state() {
        let mut engine = engine(100, 5, 0.67);
        let stuck = engine.create_with_vector(clean_vector(100, SimTime::ZERO), SimTime::ZERO).unwrap();
        let done = engine.create_with_vector(clean_vector(100, SimTime::ZERO), SimTime::ZERO).unwrap();
        engine.reject(done.id, SimTime::ZERO).unwrap();
        engine.on_receive_vote(vote(TransactionId::compose(NodeId(8), 1), 0, true), SimTime::ZERO);

        assert!(engine.sweep(SimTime::from_secs_f64(5.0)).is_empty());

        let report = engine.sweep(SimTime::from_secs_f64(61.0));
        assert_eq!(
            report,
            SweepReport {
                expired: 1,
                dropped_vote_buffers: 1,
                forgotten_terminal: 1,
            }
        );
        assert_eq!(engine.state(stuck.id), None);
        assert_eq!(engine.state(done.id), None);
    }

    #[test]
    fn test_short_retention_never_refinalizes() {
        let mut rsu = ConsensusEngine::new(EngineConfig {
            node_id: NodeId(0),
            max_transaction_age: Duration::from_secs(10),
            bft_threshold: 1.0,
            quorum_size: 1,
            terminal_retention: Duration::from_secs(1),
            dimensionality: 10,
        });
        let verifier = SemanticVerifier::default();
        let id = TransactionId::compose(NodeId(100), 1);
        let announce = || Transaction::new(id, clean_vector(100, SimTime::ZERO), SimTime::ZERO);

        let outcome = rsu.on_receive_transaction(
            announce(),
            SimTime::from_millis(5),
            &verifier,
            &mut ConstantReference::default(),
        );
        assert!(matches!(
            outcome,
            ReceiveOutcome::Voted {
                decision: Some(Decision::Finalized { .. }),
                ..
            }
        ));

        rsu.sweep(SimTime::from_secs_f64(2.0));
        let again = rsu.on_receive_transaction(
            announce(),
            SimTime::from_secs_f64(3.0),
            &verifier,
            &mut ConstantReference::default(),
        );
        assert_eq!(again, ReceiveOutcome::AlreadyTerminal);
        assert_eq!(rsu.state(id), Some(TransactionState::Finalized));
        assert_eq!(rsu.stats().finalized, 1);

        rsu.sweep(SimTime::from_secs_f64(10.1));
        let late = rsu.on_receive_transaction(
            announce(),
            SimTime::from_secs_f64(10.2),
            &verifier,
            &mut ConstantReference::default(),
        );
        assert!(matches!(late, ReceiveOutcome::Stale { .. }));
        assert_eq!(rsu.stats().finalized, 1);
    }
}
