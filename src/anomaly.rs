//! Anomaly classification against an expected recovery curve
//!
//! Key principles:
//! - Pure: same summary, baseline and thresholds always give the same result
//! - Slow and fast thresholds are independent (undershoot and overshoot carry
//!   different clinical risks)
//! - Deviation sign always matches the kind: slow < 0, fast > 0

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValidationError;
use crate::models::{AnomalyAlert, AnomalyKind, Patient, TrendSummary};

// ---------------------------------------------------------------------------
/// Expected Curve: reference trajectory for a program
// ---------------------------------------------------------------------------

pub trait ExpectedCurve {
    /// Expected completion percentage at a given period (week)
    fn expected_completion_at(&self, period: u32) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselinePoint {
    pub period: u32,
    pub expected_pct: f64,
}

/// Piecewise-linear baseline through configured points, flat beyond either end
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BaselineCurve {
    points: Vec<BaselinePoint>,
}

impl BaselineCurve {
    pub fn new(mut points: Vec<BaselinePoint>) -> Result<Self, ValidationError> {
        if points.is_empty() {
            return Err(ValidationError::invalid_value(
                "baseline",
                "needs at least one point",
            ));
        }
        for point in &points {
            if !point.expected_pct.is_finite() || !(0.0..=100.0).contains(&point.expected_pct) {
                return Err(ValidationError::OutOfRangeValue {
                    field: "expected_pct",
                    value: point.expected_pct,
                });
            }
        }

        points.sort_by_key(|p| p.period);
        if points.windows(2).any(|w| w[0].period == w[1].period) {
            return Err(ValidationError::invalid_value(
                "baseline",
                "periods must be unique",
            ));
        }

        Ok(Self { points })
    }

    /// Convenience for `(period, pct)` pairs
    pub fn from_pairs(pairs: &[(u32, f64)]) -> Result<Self, ValidationError> {
        Self::new(
            pairs
                .iter()
                .map(|&(period, expected_pct)| BaselinePoint { period, expected_pct })
                .collect(),
        )
    }

    pub fn points(&self) -> &[BaselinePoint] {
        &self.points
    }
}

impl<'de> Deserialize<'de> for BaselineCurve {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let points = Vec::<BaselinePoint>::deserialize(deserializer)?;
        BaselineCurve::new(points).map_err(serde::de::Error::custom)
    }
}

impl ExpectedCurve for BaselineCurve {
    fn expected_completion_at(&self, period: u32) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];

        if period <= first.period {
            return first.expected_pct;
        }
        if period >= last.period {
            return last.expected_pct;
        }

        // period lies strictly inside the range, so a bracketing pair exists
        let upper_idx = self
            .points
            .iter()
            .position(|p| p.period >= period)
            .unwrap_or(self.points.len() - 1);
        let lo = self.points[upper_idx - 1];
        let hi = self.points[upper_idx];

        let span = f64::from(hi.period - lo.period);
        let offset = f64::from(period - lo.period);
        lo.expected_pct + (hi.expected_pct - lo.expected_pct) * offset / span
    }
}

// ---------------------------------------------------------------------------
/// Thresholds & Recommendations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Percentage points below baseline that count as slow
    pub slow: f64,
    /// Percentage points above baseline that count as fast
    pub fast: f64,
    /// Slow deviation at which the escalated recommendation is used
    pub severe_slow: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            slow: 10.0,
            fast: 15.0,
            severe_slow: 20.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("slow_threshold", self.slow),
            ("fast_threshold", self.fast),
            ("severe_slow_threshold", self.severe_slow),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::invalid_value(field, "must be a positive number"));
            }
        }
        if self.severe_slow < self.slow {
            return Err(ValidationError::invalid_value(
                "severe_slow_threshold",
                "must not be below slow_threshold",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recommendations {
    pub slow: String,
    pub severe_slow: String,
    pub fast: String,
    /// Check-up message; `{name}` is replaced with the patient's name
    pub checkup: String,
}

impl Default for Recommendations {
    fn default() -> Self {
        Self {
            slow: "Review the rehabilitation program and consider simplifying some of the exercises"
                .to_string(),
            severe_slow: "Consider referral for a comprehensive examination given the significant delay in recovery"
                .to_string(),
            fast: "Check whether the patient is performing the exercises at too high an intensity"
                .to_string(),
            checkup: "Hi {name}, your physiotherapist would like to check in on how your exercises are going."
                .to_string(),
        }
    }
}

impl Recommendations {
    pub fn checkup_message(&self, patient_name: &str) -> String {
        self.checkup.replace("{name}", patient_name)
    }
}

// ---------------------------------------------------------------------------
/// Classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "alert", rename_all = "snake_case")]
pub enum Classification {
    Anomaly(AnomalyAlert),
    NoAnomaly,
}

impl Classification {
    pub fn alert(self) -> Option<AnomalyAlert> {
        match self {
            Classification::Anomaly(alert) => Some(alert),
            Classification::NoAnomaly => None,
        }
    }

    pub fn is_anomaly(&self) -> bool {
        matches!(self, Classification::Anomaly(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyClassifier {
    thresholds: Thresholds,
    recommendations: Recommendations,
}

impl AnomalyClassifier {
    /// Rejects non-positive or non-finite thresholds, which would let a zero
    /// deviation count as slow or fast
    pub fn new(thresholds: Thresholds, recommendations: Recommendations) -> Result<Self, ValidationError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            recommendations,
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn recommendations(&self) -> &Recommendations {
        &self.recommendations
    }

    /// Compare the observed mean completion with the baseline at the summary's
    /// latest period
    pub fn classify(
        &self,
        patient: &Patient,
        summary: &TrendSummary,
        baseline: &dyn ExpectedCurve,
    ) -> Classification {
        let expected = baseline.expected_completion_at(summary.latest_period);
        let deviation = summary.mean_completion - expected;

        let decision = if deviation <= -self.thresholds.slow {
            let recommendation = if deviation <= -self.thresholds.severe_slow {
                &self.recommendations.severe_slow
            } else {
                &self.recommendations.slow
            };
            Some((AnomalyKind::Slow, recommendation))
        } else if deviation >= self.thresholds.fast {
            Some((AnomalyKind::Fast, &self.recommendations.fast))
        } else {
            None
        };

        debug!(
            patient_id = patient.id,
            period = summary.latest_period,
            expected,
            deviation,
            anomalous = decision.is_some(),
            "Classified trend"
        );

        match decision {
            Some((kind, recommendation)) => Classification::Anomaly(AnomalyAlert {
                patient_id: patient.id,
                patient_name: patient.name.clone(),
                injury: patient.injury.clone(),
                kind,
                deviation_pct: deviation,
                recommendation: recommendation.clone(),
            }),
            None => Classification::NoAnomaly,
        }
    }
}

// ---------------------------------------------------------------------------
/// Tests
// ---------------------------------------------------------------------------
