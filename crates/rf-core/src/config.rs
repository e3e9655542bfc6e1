//! Configuration types and parsing for ruleflow.yml

use crate::error::{CoreError, CoreResult};
use crate::expr::Expr;
use crate::schema::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variable overriding `execution.batch_size`
pub const ENV_BATCH_SIZE: &str = "RULEFLOW_BATCH_SIZE";
/// Environment variable overriding `jobs.workers`
pub const ENV_WORKERS: &str = "RULEFLOW_WORKERS";
/// Environment variable overriding `execution.strict`
pub const ENV_STRICT: &str = "RULEFLOW_STRICT";
/// Environment variable overriding `jobs.timeout_secs`
pub const ENV_JOB_TIMEOUT_SECS: &str = "RULEFLOW_JOB_TIMEOUT_SECS";

/// Main configuration from ruleflow.yml
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Source and target database connections
    pub database: DatabasesConfig,

    /// Plan execution settings
    pub execution: ExecConfig,

    /// Worker pool and timeout settings
    pub jobs: JobsConfig,

    /// Scenario evaluation settings
    pub validation: ValidationConfig,

    /// Named formulas a rule may refer to (growth rate, performance score, ...)
    pub formulas: BTreeMap<String, FormulaConfig>,
}

/// Source and target connections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabasesConfig {
    pub source: DatabaseConfig,
    pub target: DatabaseConfig,
}

/// A single DuckDB connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database path (file-based or :memory:)
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    ":memory:".to_string()
}

/// Plan executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Source rows per batch (must be > 0)
    pub batch_size: usize,

    /// Fail the whole run on the first malformed row instead of skipping it
    pub strict: bool,

    /// How many skip reasons to keep in the run result
    pub max_skip_samples: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            strict: false,
            max_skip_samples: 20,
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Number of worker tasks
    pub workers: usize,

    /// Per-job timeout in seconds
    pub timeout_secs: u64,

    /// Timeout for a single interpreter call in seconds
    pub interpreter_timeout_secs: u64,

    /// ETL throughput in records per second below which a run is logged
    /// as under-performing
    pub performance_threshold_rps: f64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            timeout_secs: 3600,
            interpreter_timeout_secs: 60,
            performance_threshold_rps: 1000.0,
        }
    }
}

/// Validator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Relative tolerance for decimal comparisons
    pub decimal_tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            decimal_tolerance: 1e-6,
        }
    }
}

/// A configurable formula expanded into a derived column by the compiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaConfig {
    /// Written in YAML as nested single-key maps (`binary: { op, left, right }`)
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub expr: Expr,

    #[serde(default = "default_formula_type")]
    pub output_type: ColumnType,

    /// Inclusive valid range, checked by a RANGE_CHECK scenario
    #[serde(default)]
    pub range: Option<(f64, f64)>,
}

fn default_formula_type() -> ColumnType {
    ColumnType::Decimal
}

impl Config {
    /// Load configuration from a file, apply environment overrides and validate
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)?
        };
        config.apply_env_overrides()?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a directory
    /// Looks for ruleflow.yml or ruleflow.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("ruleflow.yml");
        let yaml_path = dir.join("ruleflow.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Apply `RULEFLOW_*` environment variables on top of file values
    pub fn apply_env_overrides(&mut self) -> CoreResult<()> {
        if let Some(v) = env_parse::<usize>(ENV_BATCH_SIZE)? {
            self.execution.batch_size = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_WORKERS)? {
            self.jobs.workers = v;
        }
        if let Some(v) = env_parse::<u64>(ENV_JOB_TIMEOUT_SECS)? {
            self.jobs.timeout_secs = v;
        }
        if let Ok(raw) = std::env::var(ENV_STRICT) {
            self.execution.strict = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(CoreError::ConfigInvalid {
                        message: format!("{} must be a boolean, got '{}'", ENV_STRICT, other),
                    })
                }
            };
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.execution.batch_size == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "execution.batch_size must be greater than 0".to_string(),
            });
        }
        if self.jobs.workers == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "jobs.workers must be greater than 0".to_string(),
            });
        }
        if self.jobs.timeout_secs == 0 || self.jobs.interpreter_timeout_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "job and interpreter timeouts must be greater than 0".to_string(),
            });
        }
        let rps = self.jobs.performance_threshold_rps;
        if !rps.is_finite() || rps < 0.0 {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "jobs.performance_threshold_rps must be a finite non-negative number, got {}",
                    rps
                ),
            });
        }
        let tol = self.validation.decimal_tolerance;
        if !tol.is_finite() || tol < 0.0 {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "validation.decimal_tolerance must be a finite non-negative number, got {}",
                    tol
                ),
            });
        }
        for (name, formula) in &self.formulas {
            if let Some((lo, hi)) = formula.range {
                if lo.is_nan() || hi.is_nan() || lo > hi {
                    return Err(CoreError::ConfigInvalid {
                        message: format!(
                            "formula '{}' has an inverted range [{}, {}]",
                            name, lo, hi
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Look up a named formula, ignoring case
    pub fn formula(&self, name: &str) -> Option<&FormulaConfig> {
        self.formulas.get(name).or_else(|| {
            self.formulas
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> CoreResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| CoreError::ConfigInvalid {
                message: format!("{} must be a non-negative integer, got '{}'", key, raw),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
