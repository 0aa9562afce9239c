//! Scenario configuration.
//!
//! A scenario is loaded from an optional YAML file layered with
//! `COCOCHAIN__*` environment variables, e.g.
//! `COCOCHAIN__PROTOCOL__BFT_THRESHOLD=0.75`, then validated.

use crate::error::Result;
use cocochain_consensus::config::secs;
use cocochain_consensus::ProtocolConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "COCOCHAIN";

/// Everything needed to build a simulation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_scenario"))]
pub struct ScenarioConfig {
    /// Seed for every random stream in the run.
    pub seed: u64,

    /// Simulated run length.
    #[serde(with = "secs")]
    pub duration: Duration,

    /// Number of vehicles.
    pub vehicles: usize,

    /// Roadside unit positions along the highway, in meters.
    #[validate(length(min = 1))]
    pub rsu_positions: Vec<f64>,

    /// Highway length in meters. Vehicles stop at the end.
    #[validate(range(exclusive_min = 0.0))]
    pub highway_length: f64,

    /// Slowest vehicle speed, km/h.
    #[validate(range(min = 0.0))]
    pub min_speed_kmh: f64,

    /// Fastest vehicle speed, km/h.
    #[validate(range(min = 0.0))]
    pub max_speed_kmh: f64,

    /// Explicit start positions for the first vehicles; the rest start at
    /// random positions on the highway.
    pub start_positions: Vec<f64>,

    /// One-way link latency.
    #[serde(with = "secs")]
    pub link_latency: Duration,

    /// Maximum extra delay added to each delivery.
    #[serde(with = "secs")]
    pub jitter: Duration,

    /// Whether vehicles create transactions every `message_interval`.
    pub generate_transactions: bool,

    /// Protocol parameters shared by every node.
    #[validate(nested)]
    pub protocol: ProtocolConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            duration: Duration::from_secs(60),
            vehicles: 20,
            rsu_positions: vec![2000.0, 6000.0, 10000.0, 14000.0, 18000.0],
            highway_length: 20000.0,
            min_speed_kmh: 100.0,
            max_speed_kmh: 130.0,
            start_positions: Vec::new(),
            link_latency: Duration::from_millis(5),
            jitter: Duration::from_millis(2),
            generate_transactions: true,
            protocol: ProtocolConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Loads a scenario from `path` (if any) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let scenario: ScenarioConfig = builder.build()?.try_deserialize()?;
        scenario.validated()
    }

    /// Validates the scenario, returning it unchanged on success.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.rsu_positions.len() + self.vehicles
    }
}

fn validate_scenario(scenario: &ScenarioConfig) -> std::result::Result<(), ValidationError> {
    // Sampling panics on spans that overflow to infinity.
    if !scenario.highway_length.is_finite()
        || !(scenario.max_speed_kmh - scenario.min_speed_kmh).is_finite()
    {
        let mut err = ValidationError::new("finite");
        err.message = Some("highway length and speeds must be finite".into());
        return Err(err);
    }
    if scenario.min_speed_kmh > scenario.max_speed_kmh {
        let mut err = ValidationError::new("speed_range");
        err.message = Some("min_speed_kmh must not exceed max_speed_kmh".into());
        return Err(err);
    }
    let on_highway = |p: &f64| p.is_finite() && (0.0..=scenario.highway_length).contains(p);
    if !scenario.rsu_positions.iter().all(on_highway)
        || !scenario.start_positions.iter().all(on_highway)
    {
        let mut err = ValidationError::new("position");
        err.message = Some("positions must lie on the highway".into());
        return Err(err);
    }
    if u32::try_from(scenario.node_count()).is_err() {
        let mut err = ValidationError::new("node_count");
        err.message = Some("too many nodes".into());
        return Err(err);
    }
    Ok(())
}
