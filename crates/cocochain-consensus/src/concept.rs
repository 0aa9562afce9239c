//! Concept vectors and the model that generates them.
//!
//! A concept vector is the numeric stand-in for the semantic payload of a
//! transaction. The corruption transforms here are what adversarial
//! vehicles apply before digesting.

use crate::config::ProtocolConfig;
use crate::error::{ConsensusError, Result};
use cocochain_types::{NodeId, SimTime};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};
use validator::ValidationError;

/// Distribution of freshly generated coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConceptDistribution {
    /// Gaussian coordinates.
    Normal {
        /// Mean.
        mean: f64,
        /// Standard deviation.
        std_dev: f64,
    },
    /// Coordinates uniform on `[low, high)`.
    Uniform {
        /// Inclusive lower bound.
        low: f64,
        /// Exclusive upper bound.
        high: f64,
    },
}

impl Default for ConceptDistribution {
    fn default() -> Self {
        ConceptDistribution::Normal {
            mean: 0.0,
            std_dev: 1.0,
        }
    }
}

impl ConceptDistribution {
    pub(crate) fn check(&self) -> std::result::Result<(), ValidationError> {
        let ok = match *self {
            ConceptDistribution::Normal { mean, std_dev } => {
                mean.is_finite() && std_dev.is_finite() && std_dev >= 0.0
            }
            ConceptDistribution::Uniform { low, high } => {
                low < high && (high - low).is_finite()
            }
        };
        if ok {
            Ok(())
        } else {
            let mut err = ValidationError::new("concept_distribution");
            err.message = Some("distribution parameters are out of range".into());
            Err(err)
        }
    }
}

/// A fixed-dimension feature vector describing a transaction's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptVector {
    data: Vec<f64>,
    origin_id: NodeId,
    created_at: SimTime,
    corrupted: bool,
    is_top_concept: bool,
}

impl ConceptVector {
    /// Wraps raw coordinates. The vector starts clean and not top-ranked.
    pub fn new(data: Vec<f64>, origin_id: NodeId, created_at: SimTime) -> Self {
        Self {
            data,
            origin_id,
            created_at,
            corrupted: false,
            is_top_concept: false,
        }
    }

    /// Sets the ground-truth corruption flag.
    pub fn with_corrupted(mut self, corrupted: bool) -> Self {
        self.corrupted = corrupted;
        self
    }

    /// Sets the top-concept flag.
    pub fn with_top_concept(mut self, is_top_concept: bool) -> Self {
        self.is_top_concept = is_top_concept;
        self
    }

    /// The coordinates.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Number of coordinates.
    pub fn dimensionality(&self) -> usize {
        self.data.len()
    }

    /// The node that produced this vector.
    pub fn origin_id(&self) -> NodeId {
        self.origin_id
    }

    /// When the vector was produced.
    pub fn created_at(&self) -> SimTime {
        self.created_at
    }

    /// Whether a corruption transform was applied.
    ///
    /// This is evaluation ground truth; verification never reads it.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Whether the vector is flagged as a top concept.
    pub fn is_top_concept(&self) -> bool {
        self.is_top_concept
    }

    /// Scales every coordinate by `1 + noise`, `noise ~ U(-0.5, 0.5)`.
    pub fn corrupt<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for value in &mut self.data {
            *value *= 1.0 + rng.gen_range(-0.5..0.5);
        }
        self.corrupted = true;
    }

    /// Amplifies the largest-magnitude coordinate by `U(1.5, 3.0)` and adds
    /// `U(-0.1, 0.1)` noise to every other coordinate.
    pub fn inject_top_concept_manipulation<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if let Some(top) = self.largest_magnitude_index() {
            for (i, value) in self.data.iter_mut().enumerate() {
                if i == top {
                    *value *= rng.gen_range(1.5..3.0);
                } else {
                    *value += rng.gen_range(-0.1..0.1);
                }
            }
        }
        self.corrupted = true;
        self.is_top_concept = true;
    }

    /// Replaces one random coordinate with a value drawn from `U(-10, 10)`.
    pub fn inject_extreme_value<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if !self.data.is_empty() {
            let idx = rng.gen_range(0..self.data.len());
            self.data[idx] = rng.gen_range(-10.0..10.0);
        }
        self.corrupted = true;
    }

    fn largest_magnitude_index(&self) -> Option<usize> {
        self.data
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))
            .map(|(i, _)| i)
    }
}

/// Returns true if any coordinate's magnitude exceeds `threshold`.
pub fn exceeds_magnitude(data: &[f64], threshold: f64) -> bool {
    data.iter().any(|v| v.abs() > threshold)
}

#[derive(Debug, Clone, Copy)]
enum Sampler {
    Normal(Normal<f64>),
    Uniform(Uniform<f64>),
}

/// Generates concept vectors of a fixed dimensionality.
#[derive(Debug, Clone)]
pub struct ConceptModel {
    dimensionality: usize,
    top_concept_threshold: f64,
    sampler: Sampler,
}

impl ConceptModel {
    /// Creates a model, rejecting unusable distribution parameters.
    pub fn new(
        dimensionality: usize,
        distribution: ConceptDistribution,
        top_concept_threshold: f64,
    ) -> Result<Self> {
        distribution
            .check()
            .map_err(|e| ConsensusError::InvalidConfig(e.to_string()))?;
        let sampler = match distribution {
            ConceptDistribution::Normal { mean, std_dev } => Sampler::Normal(
                Normal::new(mean, std_dev)
                    .map_err(|e| ConsensusError::InvalidConfig(e.to_string()))?,
            ),
            ConceptDistribution::Uniform { low, high } => Sampler::Uniform(Uniform::new(low, high)),
        };
        Ok(Self {
            dimensionality,
            top_concept_threshold,
            sampler,
        })
    }

    /// Creates a model from the protocol configuration.
    pub fn from_config(config: &ProtocolConfig) -> Result<Self> {
        Self::new(
            config.concept_dimensionality,
            config.concept_distribution,
            config.top_concept_threshold,
        )
    }

    /// Number of coordinates per vector.
    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    /// Draws raw coordinates.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        (0..self.dimensionality)
            .map(|_| match &self.sampler {
                Sampler::Normal(d) => d.sample(rng),
                Sampler::Uniform(d) => d.sample(rng),
            })
            .collect()
    }

    /// Produces a fresh, clean vector for `origin_id`.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        origin_id: NodeId,
        now: SimTime,
        rng: &mut R,
    ) -> ConceptVector {
        let data = self.sample(rng);
        let is_top_concept = exceeds_magnitude(&data, self.top_concept_threshold);
        ConceptVector::new(data, origin_id, now).with_top_concept(is_top_concept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn model() -> ConceptModel {
        ConceptModel::new(10, ConceptDistribution::default(), 0.8).unwrap()
    }

    #[test]
    fn test_generate_has_fixed_dimensionality() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let model = model();
        for _ in 0..100 {
            let v = model.generate(NodeId(3), SimTime::ZERO, &mut rng);
            assert_eq!(v.dimensionality(), 10);
            assert!(!v.is_corrupted());
            assert_eq!(v.origin_id(), NodeId(3));
            assert_eq!(v.is_top_concept(), exceeds_magnitude(v.data(), 0.8));
        }
    }

    #[test]
    fn test_uniform_distribution_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let model = ConceptModel::new(
            10,
            ConceptDistribution::Uniform {
                low: -0.5,
                high: 0.5,
            },
            0.8,
        )
        .unwrap();
        let v = model.generate(NodeId(0), SimTime::ZERO, &mut rng);
        assert!(v.data().iter().all(|x| (-0.5..0.5).contains(x)));
        assert!(!v.is_top_concept());
    }

    #[test]
    fn test_invalid_distribution_rejected() {
        let bad = ConceptDistribution::Uniform { low: 1.0, high: 1.0 };
        assert!(ConceptModel::new(10, bad, 0.8).is_err());
        let bad = ConceptDistribution::Normal {
            mean: 0.0,
            std_dev: -1.0,
        };
        assert!(ConceptModel::new(10, bad, 0.8).is_err());
        let bad = ConceptDistribution::Uniform {
            low: -f64::MAX,
            high: f64::MAX,
        };
        assert!(ConceptModel::new(10, bad, 0.8).is_err());
    }

    #[test]
    fn test_corrupt_is_reproducible() {
        let base = ConceptVector::new(vec![1.0; 10], NodeId(1), SimTime::ZERO);

        let mut a = base.clone();
        let mut b = base.clone();
        a.corrupt(&mut ChaCha8Rng::seed_from_u64(9));
        b.corrupt(&mut ChaCha8Rng::seed_from_u64(9));

        assert_eq!(a, b);
        assert!(a.is_corrupted());
        assert!(a.data().iter().all(|x| (0.5..1.5).contains(x)));
    }

    #[test]
    fn test_top_concept_manipulation() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut v = ConceptVector::new(
            vec![0.1, -2.0, 0.3, 0.0, 0.2, 0.1, 0.1, 0.1, 0.1, 0.1],
            NodeId(1),
            SimTime::ZERO,
        );
        v.inject_top_concept_manipulation(&mut rng);

        assert!(v.is_corrupted());
        assert!(v.is_top_concept());
        assert!(v.data()[1] <= -3.0 && v.data()[1] >= -6.0);
        assert!((v.data()[0] - 0.1).abs() <= 0.1);
        assert!((v.data()[3]).abs() <= 0.1);
    }

    #[test]
    fn test_extreme_value_injection() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut v = ConceptVector::new(vec![0.0; 10], NodeId(1), SimTime::ZERO);
        v.inject_extreme_value(&mut rng);
        assert!(v.is_corrupted());
        assert_eq!(v.data().iter().filter(|x| **x != 0.0).count(), 1);
    }
}
