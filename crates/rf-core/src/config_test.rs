use super::*;
use serial_test::serial;
use tempfile::TempDir;

fn clear_env() {
    for key in [ENV_BATCH_SIZE, ENV_WORKERS, ENV_STRICT, ENV_JOB_TIMEOUT_SECS] {
        std::env::remove_var(key);
    }
}

#[test]
fn test_empty_yaml_uses_defaults() {
    let config: Config = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config.execution.batch_size, 10_000);
    assert!(!config.execution.strict);
    assert_eq!(config.jobs.workers, 10);
    assert_eq!(config.jobs.timeout_secs, 3600);
    assert_eq!(config.validation.decimal_tolerance, 1e-6);
    assert_eq!(config.database.source.path, ":memory:");
    config.validate().unwrap();
}

#[test]
fn test_parse_full_config() {
    let yaml = r#"
database:
  source:
    path: "./warehouse.duckdb"
  target:
    path: "./marts.duckdb"
execution:
  batch_size: 500
  strict: true
jobs:
  workers: 4
  timeout_secs: 60
  performance_threshold_rps: 250
validation:
  decimal_tolerance: 0.001
formulas:
  growth_rate:
    expr:
      binary:
        op: "/"
        left: { column: revenue_delta }
        right: { column: revenue_prev }
  performance_score:
    expr:
      binary:
        op: mul
        left: { column: revenue_share }
        right: { literal: 100 }
    range: [0, 100]
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    config.validate().unwrap();
    assert_eq!(config.database.target.path, "./marts.duckdb");
    assert_eq!(config.execution.batch_size, 500);
    assert!(config.execution.strict);
    assert_eq!(config.jobs.workers, 4);
    assert_eq!(config.jobs.interpreter_timeout_secs, 60);
    assert_eq!(config.jobs.performance_threshold_rps, 250.0);

    let growth = config.formula("Growth_Rate").unwrap();
    assert_eq!(growth.output_type, ColumnType::Decimal);
    assert!(growth.range.is_none());
    assert_eq!(
        config.formula("performance_score").unwrap().range,
        Some((0.0, 100.0))
    );
}

#[test]
fn test_unknown_section_rejected() {
    assert!(serde_yaml::from_str::<Config>("models: []").is_err());
}

#[test]
fn test_validate_rejects_zero_batch_size() {
    let mut config = Config::default();
    config.execution.batch_size = 0;
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("[E002]"));
    assert!(err.contains("batch_size"));
}

#[test]
fn test_validate_rejects_zero_workers_and_bad_tolerance() {
    let mut config = Config::default();
    config.jobs.workers = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.validation.decimal_tolerance = f64::NAN;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.validation.decimal_tolerance = -1.0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_inverted_formula_range() {
    let mut config = Config::default();
    config.formulas.insert(
        "score".into(),
        FormulaConfig {
            expr: Expr::column("x"),
            output_type: ColumnType::Decimal,
            range: Some((100.0, 0.0)),
        },
    );
    assert!(config.validate().unwrap_err().to_string().contains("inverted range"));
}

#[test]
#[serial]
fn test_load_from_dir_prefers_yml() {
    clear_env();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ruleflow.yml"), "execution:\n  batch_size: 7\n").unwrap();
    std::fs::write(dir.path().join("ruleflow.yaml"), "execution:\n  batch_size: 9\n").unwrap();
    let config = Config::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.execution.batch_size, 7);
}

#[test]
#[serial]
fn test_load_empty_file_is_valid() {
    clear_env();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ruleflow.yaml"), "").unwrap();
    let config = Config::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.execution, ExecConfig::default());
}

#[test]
fn test_load_from_dir_missing() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }));
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_env();
    std::env::set_var(ENV_BATCH_SIZE, "250");
    std::env::set_var(ENV_WORKERS, "3");
    std::env::set_var(ENV_STRICT, "TRUE");
    std::env::set_var(ENV_JOB_TIMEOUT_SECS, "5");
    let mut config = Config::default();
    config.apply_env_overrides().unwrap();
    clear_env();

    assert_eq!(config.execution.batch_size, 250);
    assert_eq!(config.jobs.workers, 3);
    assert!(config.execution.strict);
    assert_eq!(config.jobs.timeout_secs, 5);
}

#[test]
#[serial]
fn test_env_override_invalid_value() {
    clear_env();
    std::env::set_var(ENV_BATCH_SIZE, "lots");
    let mut config = Config::default();
    let err = config.apply_env_overrides().unwrap_err();
    clear_env();
    assert!(err.to_string().contains(ENV_BATCH_SIZE));
}

#[test]
#[serial]
fn test_env_zero_batch_size_fails_load() {
    clear_env();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ruleflow.yml"), "{}").unwrap();
    std::env::set_var(ENV_BATCH_SIZE, "0");
    let result = Config::load_from_dir(dir.path());
    clear_env();
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_formula_from_file_evaluates() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let yaml = r#"
formulas:
  growth_rate:
    expr:
      case:
        branches:
          - when:
              left: { column: revenue_prev }
              op: ">"
              right: { literal: 0 }
            then:
              binary:
                op: "/"
                left: { column: revenue_delta }
                right: { column: revenue_prev }
        default: { literal: 0 }
"#;
    std::fs::write(dir.path().join("ruleflow.yaml"), yaml).unwrap();
    let config = Config::load_from_dir(dir.path()).unwrap();
    let growth = &config.formula("growth_rate").unwrap().expr;

    let mut row = crate::value::Row::new();
    row.insert("revenue_delta".into(), crate::value::Value::Int(50));
    row.insert("revenue_prev".into(), crate::value::Value::Int(200));
    assert_eq!(growth.eval(&row), crate::value::Value::Float(0.25));

    row.insert("revenue_prev".into(), crate::value::Value::Int(0));
    assert_eq!(growth.eval(&row), crate::value::Value::Int(0));
}

#[test]
fn test_validate_rejects_negative_threshold() {
    let mut config = Config::default();
    assert_eq!(config.jobs.performance_threshold_rps, 1000.0);
    config.jobs.performance_threshold_rps = -1.0;
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("performance_threshold_rps"), "{err}");
}
