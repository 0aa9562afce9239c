//! Protocol configuration.
//!
//! Every recognized option lives in [`ProtocolConfig`]. Durations are written
//! as fractional seconds in configuration files.

use crate::concept::ConceptDistribution;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Serde adapter reading and writing a [`Duration`] as fractional seconds.
pub mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as seconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    /// Deserializes a duration from seconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Where a roadside unit takes the reference vector for similarity checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Every coordinate has the same value.
    Constant {
        /// Coordinate value.
        value: f64,
    },
    /// A fresh vector drawn from the concept model for every check.
    Sampled,
}

/// How roadside units decide their votes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMode {
    /// Votes follow semantic verification of the concept vector.
    #[default]
    Semantic,
    /// Plain BFT voting: every structurally valid transaction is accepted
    /// and votes leave after a longer processing delay.
    Baseline,
}

impl ConsensusMode {
    /// Returns the mode as a string for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            ConsensusMode::Semantic => "semantic",
            ConsensusMode::Baseline => "baseline",
        }
    }
}

impl Default for ReferenceKind {
    fn default() -> Self {
        ReferenceKind::Constant { value: 0.5 }
    }
}

/// Configuration shared by every node of a scenario.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_protocol"))]
pub struct ProtocolConfig {
    /// Interval between transactions created by a vehicle.
    #[serde(with = "secs")]
    #[validate(custom(function = "positive_duration"))]
    pub message_interval: Duration,

    /// Maximum deviation applied to each transaction interval.
    #[serde(with = "secs")]
    pub message_interval_jitter: Duration,

    /// Voting mode of the roadside units.
    pub consensus_mode: ConsensusMode,

    /// Lower bound of the vote delay in baseline mode.
    #[serde(with = "secs")]
    pub baseline_vote_delay_min: Duration,

    /// Upper bound of the vote delay in baseline mode.
    #[serde(with = "secs")]
    pub baseline_vote_delay_max: Duration,

    /// Probability that a vehicle is drawn as adversarial.
    #[validate(range(min = 0.0, max = 1.0))]
    pub corruption_probability: f64,

    /// Fraction of the quorum that must accept.
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub bft_threshold: f64,

    /// Administrative switch for the semantic verifier.
    pub semantic_verification_enabled: bool,

    /// Age after which a transaction is stale.
    #[serde(with = "secs")]
    #[validate(custom(function = "positive_duration"))]
    pub max_transaction_age: Duration,

    /// Minimum cosine similarity for top concepts.
    #[validate(range(min = 0.0, max = 1.0))]
    pub cosine_similarity_threshold: f64,

    /// Coverage radius of a roadside unit, in meters.
    #[validate(range(exclusive_min = 0.0))]
    pub coverage_radius: f64,

    /// Number of coordinates in a concept vector.
    #[validate(range(min = 1))]
    pub concept_dimensionality: usize,

    /// Interval between metric flushes.
    #[serde(with = "secs")]
    #[validate(custom(function = "positive_duration"))]
    pub metrics_flush_interval: Duration,

    /// Population variance above which a vector counts as corrupted.
    #[validate(range(min = 0.0))]
    pub variance_threshold: f64,

    /// Magnitude above which a coordinate marks a top concept.
    #[validate(range(min = 0.0))]
    pub top_concept_threshold: f64,

    /// Optional absolute bound on any coordinate.
    #[validate(range(exclusive_min = 0.0))]
    pub extreme_value_bound: Option<f64>,

    /// Distribution of freshly generated coordinates.
    pub concept_distribution: ConceptDistribution,

    /// Reference vector used for similarity checks.
    pub reference: ReferenceKind,

    /// Number of voters the quorum is computed against. When unset, the
    /// number of roadside units known to the node is used.
    #[validate(range(min = 1))]
    pub estimated_quorum_size: Option<usize>,

    /// Probability that an adversarial vehicle also manipulates its top concept.
    #[validate(range(min = 0.0, max = 1.0))]
    pub top_concept_manipulation_probability: f64,

    /// Probability that an adversarial vehicle also injects an extreme value.
    #[validate(range(min = 0.0, max = 1.0))]
    pub extreme_value_probability: f64,

    /// Probability that a handover range check passes.
    #[validate(range(min = 0.0, max = 1.0))]
    pub range_check_pass_rate: f64,

    /// Lower bound of the handover authentication delay.
    #[serde(with = "secs")]
    pub auth_delay_min: Duration,

    /// Upper bound of the handover authentication delay.
    #[serde(with = "secs")]
    pub auth_delay_max: Duration,

    /// Time after which an unanswered handover request fails.
    #[serde(with = "secs")]
    #[validate(custom(function = "positive_duration"))]
    pub handover_timeout: Duration,

    /// How long finalized/rejected ids are remembered for idempotency.
    /// Must be at least `max_transaction_age`.
    #[serde(with = "secs")]
    pub terminal_retention: Duration,

    /// Interval between maintenance sweeps.
    #[serde(with = "secs")]
    #[validate(custom(function = "positive_duration"))]
    pub sweep_interval: Duration,

    /// Interval between vehicle coverage checks.
    #[serde(with = "secs")]
    #[validate(custom(function = "positive_duration"))]
    pub coverage_check_interval: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            message_interval: Duration::from_secs(2),
            message_interval_jitter: Duration::from_millis(100),
            consensus_mode: ConsensusMode::Semantic,
            baseline_vote_delay_min: Duration::from_millis(10),
            baseline_vote_delay_max: Duration::from_millis(50),
            corruption_probability: 0.1,
            bft_threshold: 0.67,
            semantic_verification_enabled: true,
            max_transaction_age: Duration::from_secs(10),
            cosine_similarity_threshold: 0.2,
            coverage_radius: 1000.0,
            concept_dimensionality: cocochain_types::DEFAULT_CONCEPT_DIMENSIONALITY,
            metrics_flush_interval: Duration::from_secs(1),
            variance_threshold: 2.0,
            top_concept_threshold: 0.8,
            extreme_value_bound: None,
            concept_distribution: ConceptDistribution::default(),
            reference: ReferenceKind::default(),
            estimated_quorum_size: None,
            top_concept_manipulation_probability: 0.5,
            extreme_value_probability: 0.0,
            range_check_pass_rate: 0.95,
            auth_delay_min: Duration::from_millis(2),
            auth_delay_max: Duration::from_millis(8),
            handover_timeout: Duration::from_secs(1),
            terminal_retention: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
            coverage_check_interval: Duration::from_millis(500),
        }
    }
}

impl ProtocolConfig {
    /// Validates the configuration, returning it unchanged on success.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Votes needed to decide, given the number of voters.
    ///
    /// Computes `ceil(quorum_size * bft_threshold)`, never less than one.
    pub fn required_votes(&self, quorum_size: usize) -> usize {
        required_votes(quorum_size, self.bft_threshold)
    }
}

/// `ceil(quorum_size * threshold)` with a small tolerance so that products
/// such as `100 * 0.67` round to 67 rather than 68.
pub fn required_votes(quorum_size: usize, threshold: f64) -> usize {
    let exact = quorum_size as f64 * threshold;
    ((exact - 1e-9).ceil().max(1.0)) as usize
}

fn positive_duration(value: &Duration) -> std::result::Result<(), ValidationError> {
    if value.is_zero() {
        let mut err = ValidationError::new("positive");
        err.message = Some("duration must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_protocol(config: &ProtocolConfig) -> std::result::Result<(), ValidationError> {
    // `range` lets NaN through.
    let reals = [
        config.corruption_probability,
        config.bft_threshold,
        config.cosine_similarity_threshold,
        config.coverage_radius,
        config.variance_threshold,
        config.top_concept_threshold,
        config.extreme_value_bound.unwrap_or(1.0),
        config.top_concept_manipulation_probability,
        config.extreme_value_probability,
        config.range_check_pass_rate,
    ];
    if reals.iter().any(|x| !x.is_finite()) {
        return Err(invalid("finite", "numeric options must be finite"));
    }
    if let ReferenceKind::Constant { value } = config.reference {
        if !value.is_finite() {
            return Err(invalid("finite", "reference value must be finite"));
        }
    }
    if config.auth_delay_min > config.auth_delay_max {
        return Err(invalid("auth_delay", "auth_delay_min must not exceed auth_delay_max"));
    }
    if config.baseline_vote_delay_min > config.baseline_vote_delay_max {
        return Err(invalid(
            "baseline_vote_delay",
            "baseline_vote_delay_min must not exceed baseline_vote_delay_max",
        ));
    }
    if config.message_interval_jitter >= config.message_interval {
        return Err(invalid(
            "message_interval_jitter",
            "message_interval_jitter must be shorter than message_interval",
        ));
    }
    if config.terminal_retention < config.max_transaction_age {
        return Err(invalid(
            "terminal_retention",
            "terminal_retention must not be shorter than max_transaction_age",
        ));
    }
    config.concept_distribution.check()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concept_dimensionality, 10);
        assert_eq!(config.extreme_value_bound, None);
        assert_eq!(config.consensus_mode, ConsensusMode::Semantic);
    }

    #[test]
    fn test_required_votes() {
        assert_eq!(required_votes(100, 0.67), 67);
        assert_eq!(required_votes(7, 0.67), 5);
        assert_eq!(required_votes(5, 0.67), 4);
        assert_eq!(required_votes(5, 1.0), 5);
        assert_eq!(required_votes(0, 0.67), 1);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let config = ProtocolConfig {
            corruption_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validated().is_err());

        let config = ProtocolConfig {
            bft_threshold: 0.0,
            ..Default::default()
        };
        assert!(config.validated().is_err());

        let config = ProtocolConfig {
            concept_dimensionality: 0,
            ..Default::default()
        };
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_rejects_inverted_auth_delay() {
        let config = ProtocolConfig {
            auth_delay_min: Duration::from_millis(10),
            auth_delay_max: Duration::from_millis(2),
            ..Default::default()
        };
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let config = ProtocolConfig {
            corruption_probability: f64::NAN,
            ..Default::default()
        };
        assert!(config.validated().is_err());

        let config = ProtocolConfig {
            bft_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(config.validated().is_err());

        let config = ProtocolConfig {
            extreme_value_bound: Some(f64::INFINITY),
            ..Default::default()
        };
        assert!(config.validated().is_err());

        let config = ProtocolConfig {
            concept_distribution: ConceptDistribution::Uniform {
                low: -f64::MAX,
                high: f64::MAX,
            },
            ..Default::default()
        };
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_retention_covers_max_age() {
        let config = ProtocolConfig {
            max_transaction_age: Duration::from_secs(10),
            terminal_retention: Duration::from_secs(5),
            ..Default::default()
        };
        assert!(config.validated().is_err());

        let config = ProtocolConfig {
            max_transaction_age: Duration::from_secs(10),
            terminal_retention: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(config.validated().is_ok());
    }

    #[test]
    fn test_jitter_shorter_than_interval() {
        let config = ProtocolConfig {
            message_interval: Duration::from_millis(100),
            message_interval_jitter: Duration::from_millis(100),
            ..Default::default()
        };
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_consensus_mode_from_yaml() {
        let config: ProtocolConfig = serde_yaml::from_str("consensus_mode: baseline\n").unwrap();
        assert_eq!(config.consensus_mode, ConsensusMode::Baseline);
        assert_eq!(ProtocolConfig::default().consensus_mode, ConsensusMode::Semantic);
    }

    #[test]
    fn test_yaml_with_seconds() {
        let yaml = "message_interval: 0.5\nbft_threshold: 0.8\nmax_transaction_age: 3\n";
        let config: ProtocolConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.message_interval, Duration::from_millis(500));
        assert_eq!(config.max_transaction_age, Duration::from_secs(3));
        assert!((config.bft_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.coverage_radius, 1000.0);
    }
}
