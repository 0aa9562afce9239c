//! Identifier types for CoCoChain entities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a simulated node (vehicle or roadside unit).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Returns the raw numeric identity.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// A globally unique transaction identifier.
///
/// The high 32 bits carry the originating node and the low 32 bits a
/// per-node sequence number, so identifiers minted by different nodes can
/// never collide.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Composes an identifier from the originator and its local sequence number.
    #[must_use]
    pub const fn compose(originator: NodeId, sequence: u32) -> Self {
        Self(((originator.0 as u64) << 32) | sequence as u64)
    }

    /// Wraps a raw 64-bit value.
    #[must_use]
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The node that minted this identifier.
    #[must_use]
    pub const fn originator(self) -> NodeId {
        NodeId((self.0 >> 32) as u32)
    }

    /// The originator-local sequence number.
    #[must_use]
    pub const fn sequence(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({self})")
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.originator(), self.sequence())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_compose() {
        let id = TransactionId::compose(NodeId(7), 42);
        assert_eq!(id.originator(), NodeId(7));
        assert_eq!(id.sequence(), 42);
        assert_eq!(id.to_string(), "7/42");
    }

    #[test]
    fn test_transaction_ids_unique_across_nodes() {
        let a = TransactionId::compose(NodeId(1), 1);
        let b = TransactionId::compose(NodeId(2), 1);
        let c = TransactionId::compose(NodeId(1), 2);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_serde_transparent() {
        let id = TransactionId::compose(NodeId(1), 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, ((1u64 << 32) | 3).to_string());
        let back: TransactionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
