//! CoCoChain Consensus Core
//!
//! This crate provides single-round BFT consensus for transactions exchanged
//! between vehicles and roadside units (RSUs), together with the semantic
//! integrity checks that decide each vote and the handover protocol that
//! moves a vehicle between coverage providers.
//!
//! # Architecture
//!
//! The core is a set of deterministic state machines. It never touches
//! sockets, clocks or schedulers: callers hand it decoded messages and the
//! current simulated time, and it hands back [`Action`]s.
//!
//! - **Semantic verification**: digest recomputation, variance and
//!   similarity checks on the transaction's concept vector
//! - **Vote aggregation**: one vote per voter, decided once
//!   `ceil(quorum_size * bft_threshold)` votes are in
//! - **Handover**: request, range check, delayed authentication, result
//!
//! # Components
//!
//! - [`ConceptModel`] / [`ConceptVector`]: semantic payloads and corruption transforms
//! - [`SemanticVerifier`]: integrity verification
//! - [`AdversarialRegistry`] / [`AdversarialBehavior`]: which vehicles corrupt, and how
//! - [`ConsensusEngine`]: per-node transaction lifecycle and quorum
//! - [`HandoverMachine`] / [`HandoverAuthority`]: both sides of a handover
//! - [`MetricsAggregator`]: per-node counters and periodic reports
//! - [`Node`]: role-tagged node dispatching messages and timers
//!
//! # Transaction Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Vehicle    │────▶│  Announce    │────▶│     RSUs     │
//! │  (create)    │     │  to RSUs     │     │   (verify)   │
//! └──────────────┘     └──────────────┘     └──────┬───────┘
//!                                                   │
//!                      ┌────────────────────────────┘
//!                      ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Broadcast   │────▶│    Tally     │────▶│  Finalize /  │
//! │    Votes     │     │  (by id)     │     │   Reject     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

mod adversary;
mod concept;
pub mod config;
mod engine;
mod error;
mod handover;
mod message;
mod metrics;
mod node;
mod transaction;
mod verifier;

pub use adversary::{AdversarialBehavior, AdversarialRegistry};
pub use concept::{exceeds_magnitude, ConceptDistribution, ConceptModel, ConceptVector};
pub use config::{required_votes, ConsensusMode, ProtocolConfig, ReferenceKind};
pub use engine::{
    ConsensusEngine, Decision, EngineConfig, EngineStats, ReceiveOutcome, SweepReport,
    VoteOutcome,
};
pub use error::{ConsensusError, ErrorKind, Result};
pub use handover::{
    AuthDecision, AuthorityConfig, CoverageMap, HandoverAuthority, HandoverContext,
    HandoverMachine, HandoverOutcome, HandoverState,
};
pub use message::{
    HandoverRequest, HandoverResult, Message, TransactionAnnounce, Vote, VoteTally,
};
pub use metrics::{LatencySummary, MetricCounters, MetricSample, MetricsAggregator, MetricsReport};
pub use node::{classify, Action, Audience, Node, RoadsideUnitNode, Timer, VehicleNode};
pub use transaction::{Transaction, TransactionState};
pub use verifier::{
    cosine_similarity, digest_coordinates, population_variance, reference_from_config,
    semantic_digest, ConstantReference, ReferenceProvider, RejectionReason, SampledReference,
    SemanticVerifier, Verification, VerifierConfig, DIGEST_BYTES,
};

pub use cocochain_types::{NodeId, SimTime, TransactionId};
