use std::time::Duration;

use resmon::core::system_monitor::{ProcessListingFormat, RankMetric};
use resmon::{Capability, MonitorConfig};
use tempfile::TempDir;

#[test]
fn test_config_default() {
    let config = MonitorConfig::default();
    assert_eq!(config.process_interval(), Duration::from_secs(3));
    assert_eq!(config.memory_interval(), Duration::from_secs(5));
    assert_eq!(config.permission_interval(), Duration::from_secs(60));
    assert_eq!(config.noise_floor_mb, 10.0);
    assert_eq!(config.rank_metric, RankMetric::Memory);
    assert_eq!(config.listing_format, ProcessListingFormat::Extended);
}

#[test]
fn test_config_load_missing_file_returns_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = MonitorConfig::load_from(&temp_dir.path().join("config.json")).unwrap();
    assert_eq!(config, MonitorConfig::default());
}

#[test]
fn test_config_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("resmon").join("config.json");

    let config = MonitorConfig {
        process_interval_secs: 10,
        rank_metric: RankMetric::Cpu,
        automation_targets: vec!["Safari".to_string()],
        ..Default::default()
    };
    config.save_to(&path).unwrap();

    let loaded = MonitorConfig::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_config_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, r#"{ "process_limit": 5, "listing_format": "basic" }"#).unwrap();

    let config = MonitorConfig::load_from(&path).unwrap();
    assert_eq!(config.process_limit, 5);
    assert_eq!(config.listing_format, ProcessListingFormat::Basic);
    assert_eq!(config.memory_interval_secs, 5);
}

#[test]
fn test_corrupt_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, "not json at all").unwrap();

    let config = MonitorConfig::load_from(&path).unwrap();
    assert_eq!(config, MonitorConfig::default());
}

#[test]
fn test_validated_clamps_degenerate_values() {
    let config = MonitorConfig {
        process_interval_secs: 0,
        process_limit: 0,
        noise_floor_mb: f64::NAN,
        ..Default::default()
    }
    .validated();

    assert_eq!(config.process_interval_secs, 1);
    assert_eq!(config.process_limit, 1);
    assert_eq!(config.noise_floor_mb, 0.0);
}

#[test]
fn test_automation_targets_are_tracked() {
    let config = MonitorConfig {
        automation_targets: vec!["Finder".to_string()],
        ..Default::default()
    };
    let tracked = config.tracked_capabilities();
    assert!(tracked.contains(&Capability::ElevatedExecution));
    assert!(tracked.contains(&Capability::Automation("Finder".to_string())));
}
