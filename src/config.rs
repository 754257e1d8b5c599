//! Engine configuration
//!
//! Loaded once at startup: an optional JSON file named by `REHAB_CONFIG_PATH`,
//! then individual `REHAB_*` environment overrides. Everything has a default,
//! so an empty environment yields a working configuration.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::anomaly::{AnomalyClassifier, BaselineCurve, Recommendations, Thresholds};
use crate::catalog::ProgramCatalog;
use crate::error::ValidationError;
use crate::models::ProgramTemplate;

/// ---------------------------------------------------------------------------
/// Configuration Constants
/// ---------------------------------------------------------------------------

pub const CONFIG_PATH_VAR: &str = "REHAB_CONFIG_PATH";
const SLOW_THRESHOLD_VAR: &str = "REHAB_SLOW_THRESHOLD";
const FAST_THRESHOLD_VAR: &str = "REHAB_FAST_THRESHOLD";
const TREND_WINDOW_VAR: &str = "REHAB_TREND_WINDOW";
const DATABASE_URL_VAR: &str = "REHAB_DATABASE_URL";
const WEBHOOK_URL_VAR: &str = "REHAB_WEBHOOK_URL";

const DEFAULT_DATABASE_URL: &str = "sqlite://rehab.db?mode=rwc";
const DEFAULT_TREND_WINDOW: usize = 6;

/// Expected completion by week used for every built-in program unless the
/// configuration supplies its own curves
const DEFAULT_BASELINE: [(u32, f64); 4] = [(1, 60.0), (4, 75.0), (8, 85.0), (12, 95.0)];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Missing configuration: {0}")]
  MissingConfig(String),

  #[error("Failed to read configuration: {0}")]
  Io(#[from] std::io::Error),

  #[error("Failed to parse configuration: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("Invalid value for {key}: {reason}")]
  InvalidValue { key: String, reason: String },
}

impl From<ValidationError> for ConfigError {
  fn from(e: ValidationError) -> Self {
    match e {
      ValidationError::InvalidValue { field, reason } => ConfigError::InvalidValue { key: field, reason },
      other => ConfigError::InvalidValue {
        key: "configuration".to_string(),
        reason: other.to_string(),
      },
    }
  }
}

/// ---------------------------------------------------------------------------
/// EngineConfig
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub slow_threshold: f64,
  pub fast_threshold: f64,
  pub severe_slow_threshold: f64,
  /// Number of most recent samples included in a trend
  pub trend_window: usize,
  pub recommendations: Recommendations,
  /// Expected-recovery curve per program name
  pub baselines: HashMap<String, BaselineCurve>,
  /// Program catalog; `None` means the built-in catalog
  pub programs: Option<Vec<ProgramTemplate>>,
  pub database_url: String,
  pub webhook_url: Option<String>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    let thresholds = Thresholds::default();
    Self {
      slow_threshold: thresholds.slow,
      fast_threshold: thresholds.fast,
      severe_slow_threshold: thresholds.severe_slow,
      trend_window: DEFAULT_TREND_WINDOW,
      recommendations: Recommendations::default(),
      baselines: default_baselines(),
      programs: None,
      database_url: DEFAULT_DATABASE_URL.to_string(),
      webhook_url: None,
    }
  }
}

fn default_baselines() -> HashMap<String, BaselineCurve> {
  let Ok(curve) = BaselineCurve::from_pairs(&DEFAULT_BASELINE) else {
    return HashMap::new();
  };

  ProgramCatalog::builtin()
    .list_all()
    .iter()
    .map(|program| (program.name.clone(), curve.clone()))
    .collect()
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match env::var(key) {
    Ok(raw) => raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
      }),
    Err(_) => Ok(None),
  }
}

impl EngineConfig {
  /// Load `.env`, then build from the environment
  pub fn load() -> Result<Self, ConfigError> {
    dotenvy::dotenv().ok();
    Self::from_env()
  }

  pub fn from_env() -> Result<Self, ConfigError> {
    let mut config = match env::var(CONFIG_PATH_VAR) {
      Ok(path) => Self::from_file(Path::new(&path))?,
      Err(_) => Self::default(),
    };

    if let Some(value) = parse_env::<f64>(SLOW_THRESHOLD_VAR)? {
      config.slow_threshold = value;
    }
    if let Some(value) = parse_env::<f64>(FAST_THRESHOLD_VAR)? {
      config.fast_threshold = value;
    }
    if let Some(value) = parse_env::<usize>(TREND_WINDOW_VAR)? {
      config.trend_window = value;
    }
    if let Ok(url) = env::var(DATABASE_URL_VAR) {
      config.database_url = url;
    }
    if let Ok(url) = env::var(WEBHOOK_URL_VAR) {
      config.webhook_url = Some(url);
    }

    config.validate()?;
    Ok(config)
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
      std::io::ErrorKind::NotFound => ConfigError::MissingConfig(path.display().to_string()),
      _ => ConfigError::Io(e),
    })?;
    Ok(serde_json::from_str(&raw)?)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.thresholds().validate()?;

    if self.trend_window == 0 {
      return Err(ConfigError::InvalidValue {
        key: "trend_window".to_string(),
        reason: "must be at least 1".to_string(),
      });
    }
    if self.database_url.trim().is_empty() {
      return Err(ConfigError::MissingConfig("database_url".to_string()));
    }
    self.webhook()?;

    Ok(())
  }

  pub fn thresholds(&self) -> Thresholds {
    Thresholds {
      slow: self.slow_threshold,
      fast: self.fast_threshold,
      severe_slow: self.severe_slow_threshold,
    }
  }

  pub fn classifier(&self) -> Result<AnomalyClassifier, ConfigError> {
    Ok(AnomalyClassifier::new(self.thresholds(), self.recommendations.clone())?)
  }

  /// Configured programs, or the built-in catalog when none are given
  pub fn catalog(&self) -> Result<ProgramCatalog, ConfigError> {
    match &self.programs {
      Some(programs) => Ok(ProgramCatalog::new(programs.clone())?),
      None => Ok(ProgramCatalog::builtin()),
    }
  }

  pub fn webhook(&self) -> Result<Option<Url>, ConfigError> {
    self
      .webhook_url
      .as_deref()
      .map(|raw| {
        Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
          key: "webhook_url".to_string(),
          reason: e.to_string(),
        })
      })
      .transpose()
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
