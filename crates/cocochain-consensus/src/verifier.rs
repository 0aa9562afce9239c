//! Semantic digest and integrity verification.
//!
//! The digest only detects representational tampering between the originator
//! and the verifier. Corrupted content is caught statistically (variance,
//! similarity to a reference), so the verifier has both false negatives and
//! false positives; callers classify outcomes against the ground-truth flag
//! on the concept vector.

use crate::concept::{exceeds_magnitude, ConceptModel, ConceptVector};
use crate::config::{ConsensusMode, ProtocolConfig, ReferenceKind};
use crate::transaction::Transaction;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Number of hash bytes kept in a digest (16 hex characters).
pub const DIGEST_BYTES: usize = 8;

/// Computes the semantic digest of a concept vector.
///
/// Coordinates are rendered with six fractional digits, each followed by
/// `;`, and hashed with SHA-256.
pub fn semantic_digest(vector: &ConceptVector) -> String {
    digest_coordinates(vector.data())
}

/// Computes the semantic digest of raw coordinates.
pub fn digest_coordinates(data: &[f64]) -> String {
    let mut rendered = String::with_capacity(data.len() * 12);
    for value in data {
        // Writing to a String cannot fail.
        let _ = write!(rendered, "{value:.6};");
    }
    let hash = Sha256::digest(rendered.as_bytes());
    hex::encode(&hash[..DIGEST_BYTES])
}

/// Population variance of the coordinates; zero for an empty slice.
pub fn population_variance(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    data.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// Cosine similarity; zero when the lengths differ or either norm is zero.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Supplies the reference vector for similarity checks.
pub trait ReferenceProvider {
    /// Returns a reference vector with `dimensionality` coordinates.
    fn reference(&mut self, dimensionality: usize) -> Vec<f64>;
}

impl<F> ReferenceProvider for F
where
    F: FnMut(usize) -> Vec<f64>,
{
    fn reference(&mut self, dimensionality: usize) -> Vec<f64> {
        self(dimensionality)
    }
}

/// A reference vector with every coordinate equal to one value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantReference(pub f64);

impl Default for ConstantReference {
    fn default() -> Self {
        Self(0.5)
    }
}

impl ReferenceProvider for ConstantReference {
    fn reference(&mut self, dimensionality: usize) -> Vec<f64> {
        vec![self.0; dimensionality]
    }
}

/// Draws a fresh reference from a concept model for every check.
#[derive(Debug, Clone)]
pub struct SampledReference {
    model: ConceptModel,
    rng: ChaCha8Rng,
}

impl SampledReference {
    /// Creates a sampled reference with its own seeded RNG stream.
    pub fn new(model: ConceptModel, seed: u64) -> Self {
        Self {
            model,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl ReferenceProvider for SampledReference {
    fn reference(&mut self, dimensionality: usize) -> Vec<f64> {
        let mut data = self.model.sample(&mut self.rng);
        data.resize(dimensionality, 0.0);
        data
    }
}

/// Builds the reference provider selected in the configuration.
pub fn reference_from_config(
    config: &ProtocolConfig,
    model: &ConceptModel,
    seed: u64,
) -> Box<dyn ReferenceProvider + Send> {
    match config.reference {
        ReferenceKind::Constant { value } => Box::new(ConstantReference(value)),
        ReferenceKind::Sampled => Box::new(SampledReference::new(model.clone(), seed)),
    }
}

/// Why a transaction failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    /// Verification is administratively disabled.
    Disabled,
    /// The vector does not have the configured dimensionality.
    DimensionMismatch,
    /// A coordinate is NaN or infinite.
    NonFinite,
    /// The recomputed digest differs from the carried one.
    DigestMismatch,
    /// Variance above the threshold.
    ExcessiveVariance,
    /// A coordinate exceeds the extreme-value bound.
    ExtremeValue,
    /// A top concept is not similar enough to the reference.
    LowSimilarity,
}

impl RejectionReason {
    /// Returns the reason as a string for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionReason::Disabled => "disabled",
            RejectionReason::DimensionMismatch => "dimension_mismatch",
            RejectionReason::NonFinite => "non_finite",
            RejectionReason::DigestMismatch => "digest_mismatch",
            RejectionReason::ExcessiveVariance => "excessive_variance",
            RejectionReason::ExtremeValue => "extreme_value",
            RejectionReason::LowSimilarity => "low_similarity",
        }
    }
}

/// Outcome of verifying one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// All checks passed.
    Accepted,
    /// A check failed.
    Rejected(RejectionReason),
}

impl Verification {
    /// Returns true if the transaction passed.
    pub fn is_accepted(self) -> bool {
        matches!(self, Verification::Accepted)
    }

    /// The failure reason, if any.
    pub fn reason(self) -> Option<RejectionReason> {
        match self {
            Verification::Accepted => None,
            Verification::Rejected(reason) => Some(reason),
        }
    }
}

/// Thresholds used by the [`SemanticVerifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct VerifierConfig {
    /// When false every transaction is rejected.
    pub enabled: bool,
    /// In baseline mode only structural checks run.
    pub mode: ConsensusMode,
    /// Expected number of coordinates.
    pub dimensionality: usize,
    /// Maximum population variance.
    pub variance_threshold: f64,
    /// Optional bound on any coordinate's magnitude.
    pub extreme_value_bound: Option<f64>,
    /// Magnitude marking a top concept.
    pub top_concept_threshold: f64,
    /// Minimum cosine similarity for top concepts.
    pub cosine_similarity_threshold: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::from(&ProtocolConfig::default())
    }
}

impl From<&ProtocolConfig> for VerifierConfig {
    fn from(config: &ProtocolConfig) -> Self {
        Self {
            enabled: config.semantic_verification_enabled,
            mode: config.consensus_mode,
            dimensionality: config.concept_dimensionality,
            variance_threshold: config.variance_threshold,
            extreme_value_bound: config.extreme_value_bound,
            top_concept_threshold: config.top_concept_threshold,
            cosine_similarity_threshold: config.cosine_similarity_threshold,
        }
    }
}

/// Checks a received transaction's vector and digest for consistency.
#[derive(Debug, Clone, Default)]
pub struct SemanticVerifier {
    config: VerifierConfig,
}

impl SemanticVerifier {
    /// Creates a verifier.
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// The verifier's thresholds.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verifies a transaction.
    pub fn verify<P>(&self, tx: &Transaction, reference: &mut P) -> Verification
    where
        P: ReferenceProvider + ?Sized,
    {
        if !self.config.enabled {
            return Verification::Rejected(RejectionReason::Disabled);
        }

        let data = tx.concept_vector.data();
        if data.len() != self.config.dimensionality {
            return Verification::Rejected(RejectionReason::DimensionMismatch);
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Verification::Rejected(RejectionReason::NonFinite);
        }

        if semantic_digest(&tx.concept_vector) != tx.digest {
            return Verification::Rejected(RejectionReason::DigestMismatch);
        }
        if self.config.mode == ConsensusMode::Baseline {
            return Verification::Accepted;
        }

        if population_variance(data) > self.config.variance_threshold {
            return Verification::Rejected(RejectionReason::ExcessiveVariance);
        }

        if let Some(bound) = self.config.extreme_value_bound {
            if exceeds_magnitude(data, bound) {
                return Verification::Rejected(RejectionReason::ExtremeValue);
            }
        }

        let top = tx.concept_vector.is_top_concept()
            || exceeds_magnitude(data, self.config.top_concept_threshold);
        if top {
            let reference = reference.reference(data.len());
            let similarity = cosine_similarity(data, &reference);
            if similarity < self.config.cosine_similarity_threshold {
                return Verification::Rejected(RejectionReason::LowSimilarity);
            }
        }

        Verification::Accepted
    }
}
