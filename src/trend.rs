//! Deterministic trend layer over progress samples
//!
//! Means and least-squares slopes are computed here so the anomaly classifier
//! and any outer layer consume pre-computed statistics rather than raw samples.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::RehabError;
use crate::models::{ExerciseTrend, PeriodPoint, ProgressSample, TrendSummary};
use crate::samples::ProgressSampleStore;

/// ---------------------------------------------------------------------------
/// Statistics helpers
/// ---------------------------------------------------------------------------

fn mean(values: impl Iterator<Item = f64>) -> f64 {
  let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
  if count == 0 {
    0.0
  } else {
    sum / count as f64
  }
}

/// Ordinary least-squares slope of y against x.
/// Fewer than two points, or no spread in x, yields 0.
pub fn least_squares_slope(points: &[(f64, f64)]) -> f64 {
  if points.len() < 2 {
    return 0.0;
  }

  let n = points.len() as f64;
  let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
  let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

  let mut covariance = 0.0;
  let mut variance_x = 0.0;
  for (x, y) in points {
    covariance += (x - mean_x) * (y - mean_y);
    variance_x += (x - mean_x) * (x - mean_x);
  }

  if variance_x.abs() < f64::EPSILON {
    0.0
  } else {
    covariance / variance_x
  }
}

struct WindowStats {
  mean_completion: f64,
  mean_adherence: f64,
  completion_slope: f64,
  adherence_slope: f64,
}

impl WindowStats {
  fn compute(samples: &[ProgressSample]) -> Self {
    let completion: Vec<(f64, f64)> = samples
      .iter()
      .map(|s| (f64::from(s.period), s.completion_pct))
      .collect();
    let adherence: Vec<(f64, f64)> = samples
      .iter()
      .map(|s| (f64::from(s.period), s.adherence_pct))
      .collect();

    Self {
      mean_completion: mean(samples.iter().map(|s| s.completion_pct)),
      mean_adherence: mean(samples.iter().map(|s| s.adherence_pct)),
      completion_slope: least_squares_slope(&completion),
      adherence_slope: least_squares_slope(&adherence),
    }
  }
}

/// Mean completion at `latest` minus mean completion at `first`
fn completion_change(samples: &[ProgressSample], first: u32, latest: u32) -> f64 {
  let at = |period: u32| {
    mean(
      samples
        .iter()
        .filter(|s| s.period == period)
        .map(|s| s.completion_pct),
    )
  };
  at(latest) - at(first)
}

/// Most recent `window` samples; a window of 0 is treated as 1
fn tail(samples: &[ProgressSample], window: usize) -> &[ProgressSample] {
  let window = window.max(1);
  &samples[samples.len().saturating_sub(window)..]
}

/// ---------------------------------------------------------------------------
/// Trend Aggregator
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TrendAggregator {
  store: Arc<ProgressSampleStore>,
}

impl TrendAggregator {
  pub fn new(store: Arc<ProgressSampleStore>) -> Self {
    Self { store }
  }

  /// Summarize the most recent `window` samples across all of a patient's
  /// exercises. Short histories use whatever exists; no history is `NoSamples`.
  pub fn summarize(&self, patient_id: i64, window: usize) -> Result<TrendSummary, RehabError> {
    let samples = self.store.query(patient_id, None);
    if samples.is_empty() {
      return Err(RehabError::NoSamples { patient_id });
    }

    let windowed = tail(&samples, window);
    let stats = WindowStats::compute(windowed);
    let first_period = windowed[0].period;
    let latest_period = windowed[windowed.len() - 1].period;

    Ok(TrendSummary {
      patient_id,
      mean_completion: stats.mean_completion,
      mean_adherence: stats.mean_adherence,
      completion_slope: stats.completion_slope,
      adherence_slope: stats.adherence_slope,
      completion_change: completion_change(windowed, first_period, latest_period),
      sample_count: windowed.len(),
      first_period,
      latest_period,
    })
  }

  /// Same statistics restricted to a single exercise
  pub fn summarize_exercise(
    &self,
    patient_id: i64,
    exercise_id: i64,
    window: usize,
  ) -> Result<ExerciseTrend, RehabError> {
    let samples = self.store.query(patient_id, Some(exercise_id));
    if samples.is_empty() {
      return Err(RehabError::NoSamples { patient_id });
    }

    let windowed = tail(&samples, window);
    let stats = WindowStats::compute(windowed);

    Ok(ExerciseTrend {
      patient_id,
      exercise_id,
      mean_completion: stats.mean_completion,
      mean_adherence: stats.mean_adherence,
      completion_slope: stats.completion_slope,
      adherence_slope: stats.adherence_slope,
      sample_count: windowed.len(),
      latest_period: windowed[windowed.len() - 1].period,
    })
  }

  /// Per-period averages across all exercises, oldest first
  pub fn period_series(&self, patient_id: i64) -> Vec<PeriodPoint> {
    let mut by_period: BTreeMap<u32, Vec<&ProgressSample>> = BTreeMap::new();
    let samples = self.store.query(patient_id, None);
    for sample in &samples {
      by_period.entry(sample.period).or_default().push(sample);
    }

    by_period
      .into_iter()
      .map(|(period, group)| PeriodPoint {
        period,
        completion_pct: mean(group.iter().map(|s| s.completion_pct)),
        adherence_pct: mean(group.iter().map(|s| s.adherence_pct)),
      })
      .collect()
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
