use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One week of recorded performance for a single exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
  pub patient_id: i64,
  pub exercise_id: i64,
  /// Week number; strictly increasing per (patient, exercise)
  pub period: u32,
  pub completion_pct: f64,
  pub adherence_pct: f64,
}

impl ProgressSample {
  pub fn new(patient_id: i64, exercise_id: i64, period: u32, completion_pct: f64, adherence_pct: f64) -> Self {
    Self {
      patient_id,
      exercise_id,
      period,
      completion_pct,
      adherence_pct,
    }
  }

  /// Both percentages must be finite and within [0, 100]
  pub fn validate_range(&self) -> Result<(), ValidationError> {
    check_pct("completion_pct", self.completion_pct)?;
    check_pct("adherence_pct", self.adherence_pct)
  }
}

fn check_pct(field: &'static str, value: f64) -> Result<(), ValidationError> {
  if value.is_finite() && (0.0..=100.0).contains(&value) {
    Ok(())
  } else {
    Err(ValidationError::OutOfRangeValue { field, value })
  }
}

/// ---------------------------------------------------------------------------
/// Derived statistics (recomputed on demand, never persisted)
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
  pub patient_id: i64,
  pub mean_completion: f64,
  pub mean_adherence: f64,
  /// Completion percentage points gained per period (positive = improving)
  pub completion_slope: f64,
  pub adherence_slope: f64,
  /// Completion at the latest period minus completion at the first period of
  /// the window (percentage points, averaged across exercises per period)
  pub completion_change: f64,
  pub sample_count: usize,
  pub first_period: u32,
  /// Most recent period in the window; the "current period" for baseline lookups
  pub latest_period: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseTrend {
  pub patient_id: i64,
  pub exercise_id: i64,
  pub mean_completion: f64,
  pub mean_adherence: f64,
  pub completion_slope: f64,
  pub adherence_slope: f64,
  pub sample_count: usize,
  pub latest_period: u32,
}

/// Per-period averages across all of a patient's exercises (progress chart series)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodPoint {
  pub period: u32,
  pub completion_pct: f64,
  pub adherence_pct: f64,
}

/// ---------------------------------------------------------------------------
/// Anomaly alerts
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
  /// Progress lags the expected recovery curve
  Slow,
  /// Progress outruns the expected curve (possible overexertion)
  Fast,
}

impl std::fmt::Display for AnomalyKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Slow => write!(f, "slow"),
      Self::Fast => write!(f, "fast"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
  pub patient_id: i64,
  pub patient_name: String,
  pub injury: String,
  pub kind: AnomalyKind,
  /// Signed: negative = slower than expected, positive = faster
  pub deviation_pct: f64,
  pub recommendation: String,
}
