//! Adversarial vehicles.

use crate::concept::ConceptVector;
use crate::config::ProtocolConfig;
use crate::error::{ConsensusError, Result};
use cocochain_types::NodeId;
use rand::distributions::{Bernoulli, Distribution};
use rand::Rng;
use std::collections::HashSet;

/// The set of nodes that corrupt their transactions.
///
/// Decided once at scenario construction and shared read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdversarialRegistry {
    members: HashSet<NodeId>,
}

impl AdversarialRegistry {
    /// Flags each node independently with probability `corruption_probability`.
    ///
    /// Nodes are drawn in iteration order, so a fixed seed and node order
    /// always produce the same registry. Fails if the probability lies
    /// outside `[0, 1]` or is NaN.
    pub fn draw<I, R>(node_ids: I, corruption_probability: f64, rng: &mut R) -> Result<Self>
    where
        I: IntoIterator<Item = NodeId>,
        R: Rng + ?Sized,
    {
        let coin = Bernoulli::new(corruption_probability).map_err(|e| {
            ConsensusError::InvalidConfig(format!(
                "corruption_probability {corruption_probability}: {e}"
            ))
        })?;
        let members = node_ids
            .into_iter()
            .filter(|_| coin.sample(rng))
            .collect();
        Ok(Self { members })
    }

    /// Builds a registry from an explicit set of ids.
    pub fn from_ids<I: IntoIterator<Item = NodeId>>(ids: I) -> Self {
        Self {
            members: ids.into_iter().collect(),
        }
    }

    /// Whether `node_id` is adversarial.
    pub fn is_adversarial(&self, node_id: NodeId) -> bool {
        self.members.contains(&node_id)
    }

    /// Number of adversarial nodes.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no node is adversarial.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Adversarial ids in ascending order.
    pub fn sorted_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.members.iter().copied().collect();
        ids.sort();
        ids
    }
}

/// How an adversarial vehicle transforms its vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdversarialBehavior {
    /// Chance of also manipulating the top concept.
    pub top_concept_manipulation_probability: f64,
    /// Chance of also injecting an extreme value.
    pub extreme_value_probability: f64,
}

impl Default for AdversarialBehavior {
    fn default() -> Self {
        Self::from(&ProtocolConfig::default())
    }
}

impl From<&ProtocolConfig> for AdversarialBehavior {
    fn from(config: &ProtocolConfig) -> Self {
        Self {
            top_concept_manipulation_probability: config.top_concept_manipulation_probability,
            extreme_value_probability: config.extreme_value_probability,
        }
    }
}

impl AdversarialBehavior {
    /// Corrupts `vector`, then applies the optional transforms.
    pub fn apply<R: Rng + ?Sized>(&self, vector: &mut ConceptVector, rng: &mut R) {
        vector.corrupt(rng);
        if chance(rng, self.top_concept_manipulation_probability) {
            vector.inject_top_concept_manipulation(rng);
        }
        if chance(rng, self.extreme_value_probability) {
            vector.inject_extreme_value(rng);
        }
    }
}

/// Flips a coin that lands true with probability `p`, clamped to `[0, 1]`.
/// NaN never lands true.
pub(crate) fn chance<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    Bernoulli::new(p.clamp(0.0, 1.0)).map_or(false, |coin| coin.sample(rng))
}
