//! Scenario loading from YAML files.

use cocochain_sim::{ScenarioConfig, SimError};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_yaml(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_yaml_overrides_defaults() {
    let file = write_yaml(
        r#"
seed: 7
duration: 12.5
vehicles: 3
rsu_positions: [500.0, 2500.0]
highway_length: 3000.0
protocol:
  bft_threshold: 0.75
  message_interval: 0.5
"#,
    );

    let scenario = ScenarioConfig::load(Some(file.path())).unwrap();
    assert_eq!(scenario.seed, 7);
    assert_eq!(scenario.duration, Duration::from_millis(12_500));
    assert_eq!(scenario.vehicles, 3);
    assert_eq!(scenario.rsu_positions, vec![500.0, 2500.0]);
    assert_eq!(scenario.protocol.bft_threshold, 0.75);
    assert_eq!(scenario.protocol.message_interval, Duration::from_millis(500));
    // Untouched fields keep their defaults.
    assert_eq!(scenario.protocol.coverage_radius, 1000.0);
    assert_eq!(scenario.link_latency, Duration::from_millis(5));
}

#[test]
fn test_load_rejects_invalid_values() {
    let file = write_yaml(
        r#"
protocol:
  bft_threshold: 1.5
"#,
    );

    let err = ScenarioConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, SimError::Invalid(_)));
}

#[test]
fn test_load_rejects_overflowing_uniform_span() {
    let file = write_yaml(
        r#"
protocol:
  concept_distribution:
    kind: uniform
    low: -1.0e308
    high: 1.0e308
"#,
    );
    let err = ScenarioConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, SimError::Invalid(_)));
}

#[test]
fn test_load_rejects_retention_shorter_than_max_age() {
    let file = write_yaml(
        r#"
protocol:
  max_transaction_age: 10
  terminal_retention: 2
"#,
    );
    let err = ScenarioConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, SimError::Invalid(_)));
}

#[test]
fn test_load_without_file_uses_defaults() {
    let scenario = ScenarioConfig::load(None).unwrap();
    assert_eq!(scenario.rsu_positions.len(), 5);
    assert_eq!(scenario.vehicles, 20);
}
