//! Unit tests for common-config crate

use common_config::{ExecutionConfig, StageErrorPolicy, StrataConfig};

#[test]
fn test_strata_config_default() {
    let config = StrataConfig::default();

    assert_eq!(config.execution.parallelism, None);
    assert_eq!(config.execution.on_stage_error, StageErrorPolicy::Abort);
    assert!(!config.execution.preserve_order);
    assert_eq!(config.execution.max_error_reports, 100);
    assert!(config.execution.collect_metrics);
}

#[test]
fn test_effective_parallelism() {
    let mut config = ExecutionConfig::default();
    assert!(config.effective_parallelism() >= 1);

    config.parallelism = Some(3);
    assert_eq!(config.effective_parallelism(), 3);

    // Zero falls back to the host value rather than stalling the pool.
    config.parallelism = Some(0);
    assert!(config.effective_parallelism() >= 1);
}

#[test]
fn test_policy_parsing() {
    assert_eq!("abort".parse::<StageErrorPolicy>(), Ok(StageErrorPolicy::Abort));
    assert_eq!(
        "skipRecord".parse::<StageErrorPolicy>(),
        Ok(StageErrorPolicy::SkipRecord)
    );
    assert_eq!(
        "skip_record".parse::<StageErrorPolicy>(),
        Ok(StageErrorPolicy::SkipRecord)
    );
    assert!("ignore".parse::<StageErrorPolicy>().is_err());
    assert_eq!(StageErrorPolicy::SkipRecord.to_string(), "skip_record");
}

#[test]
fn test_strata_config_serialization() {
    let mut config = StrataConfig::default();
    config.execution.parallelism = Some(4);
    config.execution.on_stage_error = StageErrorPolicy::SkipRecord;
    config.execution.preserve_order = true;

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"skip_record\""));

    let deserialized: StrataConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, config);
}

#[test]
fn test_execution_config_partial_yaml() {
    let yaml = "on_stage_error: skipRecord\nparallelism: 2\n";
    let config: ExecutionConfig = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.on_stage_error, StageErrorPolicy::SkipRecord);
    assert_eq!(config.parallelism, Some(2));
    assert_eq!(config.max_error_reports, 100);
}

#[test]
fn test_execution_config_rejects_unknown_keys() {
    let yaml = "parallelism: 2\nbatch_size: 10\n";
    assert!(serde_yaml::from_str::<ExecutionConfig>(yaml).is_err());
}
