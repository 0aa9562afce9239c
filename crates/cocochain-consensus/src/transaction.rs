//! Vehicular transactions.

use crate::concept::ConceptVector;
use crate::error::ConsensusError;
use crate::message::TransactionAnnounce;
use crate::verifier::semantic_digest;
use cocochain_types::{NodeId, SimTime, TransactionId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a transaction as seen by one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Created or received, not yet verified.
    Pending,
    /// Passed local verification. Receiving nodes verify and vote in one
    /// step, so engines never store this state.
    Verified,
    /// Local vote cast, waiting for the quorum.
    AwaitingQuorum,
    /// Accepted by the quorum.
    Finalized,
    /// Rejected by the quorum.
    Rejected,
}

impl TransactionState {
    /// Returns true for `Finalized` and `Rejected`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Finalized | TransactionState::Rejected)
    }

    /// Returns the state as a string for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionState::Pending => "pending",
            TransactionState::Verified => "verified",
            TransactionState::AwaitingQuorum => "awaiting_quorum",
            TransactionState::Finalized => "finalized",
            TransactionState::Rejected => "rejected",
        }
    }
}

/// A transaction carrying a concept vector and its semantic digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier.
    pub id: TransactionId,
    /// Node that created the transaction.
    pub originator_id: NodeId,
    /// Creation time on the originator's clock.
    pub created_at: SimTime,
    /// Semantic payload.
    pub concept_vector: ConceptVector,
    /// Digest computed by the originator.
    pub digest: String,
    /// Local lifecycle state.
    pub state: TransactionState,
}

impl Transaction {
    /// Creates a transaction, computing the digest of `concept_vector`.
    pub fn new(id: TransactionId, concept_vector: ConceptVector, created_at: SimTime) -> Self {
        let digest = semantic_digest(&concept_vector);
        Self {
            id,
            originator_id: id.originator(),
            created_at,
            concept_vector,
            digest,
            state: TransactionState::Pending,
        }
    }

    /// Builds the wire announcement for this transaction.
    pub fn announce(&self) -> TransactionAnnounce {
        TransactionAnnounce {
            id: self.id,
            originator_id: self.originator_id,
            created_at: self.created_at,
            concept_vector: self.concept_vector.clone(),
            digest: self.digest.clone(),
        }
    }

    /// Age of the transaction at `now`.
    pub fn age(&self, now: SimTime) -> std::time::Duration {
        now - self.created_at
    }
}

impl TryFrom<TransactionAnnounce> for Transaction {
    type Error = ConsensusError;

    /// Rejects announces whose originator field disagrees with the
    /// originator encoded in the id.
    fn try_from(announce: TransactionAnnounce) -> Result<Self, Self::Error> {
        if announce.id.originator() != announce.originator_id {
            return Err(ConsensusError::ProtocolViolation(format!(
                "transaction {} announced by originator {}",
                announce.id, announce.originator_id
            )));
        }
        Ok(Self {
            id: announce.id,
            originator_id: announce.originator_id,
            created_at: announce.created_at,
            concept_vector: announce.concept_vector,
            digest: announce.digest,
            state: TransactionState::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_computes_digest() {
        let id = TransactionId::compose(NodeId(4), 1);
        let vector = ConceptVector::new(vec![0.25; 10], NodeId(4), SimTime::ZERO);
        let tx = Transaction::new(id, vector.clone(), SimTime::ZERO);

        assert_eq!(tx.originator_id, NodeId(4));
        assert_eq!(tx.digest, semantic_digest(&vector));
        assert_eq!(tx.state, TransactionState::Pending);
    }

    #[test]
    fn test_announce_preserves_fields() {
        let id = TransactionId::compose(NodeId(2), 9);
        let vector = ConceptVector::new(vec![0.1; 10], NodeId(2), SimTime::from_millis(3));
        let tx = Transaction::new(id, vector, SimTime::from_millis(3));

        let received = Transaction::try_from(tx.announce()).unwrap();
        assert_eq!(received, tx);
    }

    #[test]
    fn test_announce_with_foreign_originator_rejected() {
        let id = TransactionId::compose(NodeId(2), 9);
        let vector = ConceptVector::new(vec![0.1; 10], NodeId(2), SimTime::ZERO);
        let mut announce = Transaction::new(id, vector, SimTime::ZERO).announce();
        announce.originator_id = NodeId(3);

        let err = Transaction::try_from(announce).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ProtocolViolation);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransactionState::Finalized.is_terminal());
        assert!(TransactionState::Rejected.is_terminal());
        assert!(!TransactionState::AwaitingQuorum.is_terminal());
        assert!(!TransactionState::Pending.is_terminal());
    }
}
