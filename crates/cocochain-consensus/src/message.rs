//! Wire messages exchanged between vehicles and roadside units.
//!
//! Messages are JSON-encoded. Delivery is assumed reliable and FIFO per
//! sender; anything that fails to decode is dropped by the receiving node.

use crate::concept::ConceptVector;
use crate::error::Result;
use bytes::Bytes;
use cocochain_types::{NodeId, SimTime, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// A vehicle publishes a new transaction.
    TransactionAnnounce(TransactionAnnounce),

    /// A roadside unit's verdict on a transaction.
    Vote(Vote),

    /// A vehicle asks a provider to take over its coverage.
    HandoverRequest(HandoverRequest),

    /// A provider answers a handover request.
    HandoverResult(HandoverResult),
}

impl Message {
    /// Encodes the message to bytes.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decodes a message from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Returns the message type as a string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::TransactionAnnounce(_) => "transaction_announce",
            Message::Vote(_) => "vote",
            Message::HandoverRequest(_) => "handover_request",
            Message::HandoverResult(_) => "handover_result",
        }
    }
}

impl From<TransactionAnnounce> for Message {
    fn from(msg: TransactionAnnounce) -> Self {
        Message::TransactionAnnounce(msg)
    }
}

impl From<Vote> for Message {
    fn from(msg: Vote) -> Self {
        Message::Vote(msg)
    }
}

impl From<HandoverRequest> for Message {
    fn from(msg: HandoverRequest) -> Self {
        Message::HandoverRequest(msg)
    }
}

impl From<HandoverResult> for Message {
    fn from(msg: HandoverResult) -> Self {
        Message::HandoverResult(msg)
    }
}

/// Announcement of a new transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAnnounce {
    /// Transaction id.
    pub id: TransactionId,
    /// Originating vehicle.
    pub originator_id: NodeId,
    /// Creation time.
    pub created_at: SimTime,
    /// Semantic payload.
    pub concept_vector: ConceptVector,
    /// Digest computed by the originator.
    pub digest: String,
}

/// A single accept/reject vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Transaction being voted on.
    pub transaction_id: TransactionId,
    /// Voting node.
    pub voter_id: NodeId,
    /// Whether the voter accepts the transaction.
    pub accept: bool,
    /// When the vote was cast.
    pub cast_at: SimTime,
}

/// Request to move a vehicle's coverage to a new provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverRequest {
    /// Requesting vehicle.
    pub vehicle_id: NodeId,
    /// Current provider, if the vehicle has one.
    pub source_provider_id: Option<NodeId>,
    /// Provider asked to take over.
    pub target_provider_id: NodeId,
    /// When the request was issued.
    pub requested_at: SimTime,
}

/// Answer to a [`HandoverRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverResult {
    /// Vehicle the answer is for.
    pub vehicle_id: NodeId,
    /// Answering provider.
    pub provider_id: NodeId,
    /// Whether authentication succeeded.
    pub success: bool,
}

/// Votes collected for one transaction, at most one per voter.
#[derive(Debug, Clone)]
pub struct VoteTally {
    opened_at: SimTime,
    votes: BTreeMap<NodeId, bool>,
}

impl VoteTally {
    /// Creates an empty tally.
    pub fn new(opened_at: SimTime) -> Self {
        Self {
            opened_at,
            votes: BTreeMap::new(),
        }
    }

    /// Records a vote. Returns false if the voter already voted.
    pub fn record(&mut self, voter: NodeId, accept: bool) -> bool {
        if self.votes.contains_key(&voter) {
            return false;
        }
        self.votes.insert(voter, accept);
        true
    }

    /// Number of accepting votes.
    pub fn accept_count(&self) -> usize {
        self.votes.values().filter(|accept| **accept).count()
    }

    /// Total number of votes.
    pub fn total(&self) -> usize {
        self.votes.len()
    }

    /// When the first vote or transaction for this id was seen.
    pub fn opened_at(&self) -> SimTime {
        self.opened_at
    }
}
