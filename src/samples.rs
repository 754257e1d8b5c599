//! Progress sample store
//!
//! Append-only weekly samples keyed by patient, then exercise. Each
//! (patient, exercise) series is strictly increasing in period; no backdating.
//! `DashMap` shards the patients so reads proceed concurrently while writes to
//! the same patient are serialized by the entry lock.

use std::collections::BTreeMap;

use dashmap::DashMap;
use tracing::debug;

use crate::error::ValidationError;
use crate::models::ProgressSample;

/// exercise id -> samples ordered by period
type PatientSeries = BTreeMap<i64, Vec<ProgressSample>>;

#[derive(Debug, Default)]
pub struct ProgressSampleStore {
    patients: DashMap<i64, PatientSeries>,
}

impl ProgressSampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously persisted samples (each series in period order)
    pub fn from_samples<I>(samples: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = ProgressSample>,
    {
        let store = Self::new();
        for sample in samples {
            store.append(sample)?;
        }
        Ok(store)
    }

    /// Append a sample. Validation runs before anything is written.
    pub fn append(&self, sample: ProgressSample) -> Result<(), ValidationError> {
        sample.validate_range().inspect_err(|e| {
            debug!(patient_id = sample.patient_id, exercise_id = sample.exercise_id, error = %e, "Rejected sample");
        })?;

        // Holding the entry guard serializes writers for this patient
        let mut series = self.patients.entry(sample.patient_id).or_default();
        let samples = series.entry(sample.exercise_id).or_default();

        if let Some(last) = samples.last() {
            if sample.period <= last.period {
                debug!(
                    patient_id = sample.patient_id,
                    exercise_id = sample.exercise_id,
                    period = sample.period,
                    last_period = last.period,
                    "Rejected backdated sample"
                );
                return Err(ValidationError::InvalidPeriod {
                    period: sample.period,
                    last: last.period,
                });
            }
        }

        samples.push(sample);
        Ok(())
    }

    /// Samples for a patient ordered by period ascending. Without an exercise
    /// filter, samples sharing a period are ordered by exercise id.
    pub fn query(&self, patient_id: i64, exercise_id: Option<i64>) -> Vec<ProgressSample> {
        let Some(series) = self.patients.get(&patient_id) else {
            return Vec::new();
        };

        match exercise_id {
            Some(exercise_id) => series.get(&exercise_id).cloned().unwrap_or_default(),
            None => {
                let mut all: Vec<ProgressSample> = series.values().flatten().cloned().collect();
                // BTreeMap iteration already yields exercise order; stable sort keeps it within a period
                all.sort_by_key(|s| s.period);
                all
            }
        }
    }

    /// Remove the sample recorded for this (exercise, period), wherever it sits
    /// in the series. Later appends for the same exercise may already follow it;
    /// dropping an element keeps the remaining periods strictly increasing.
    pub fn retract(&self, sample: &ProgressSample) -> bool {
        let Some(mut series) = self.patients.get_mut(&sample.patient_id) else {
            return false;
        };
        let Some(samples) = series.get_mut(&sample.exercise_id) else {
            return false;
        };

        match samples.binary_search_by_key(&sample.period, |s| s.period) {
            Ok(index) => {
                samples.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    /// Patients with at least one sample, ascending
    pub fn patient_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .patients
            .iter()
            .filter(|entry| entry.value().values().any(|s| !s.is_empty()))
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn sample_count(&self, patient_id: i64) -> usize {
        self.patients
            .get(&patient_id)
            .map(|series| series.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_query_preserves_append_order() {
        let store = ProgressSampleStore::new();
        for (period, pct) in [(1, 65.0), (2, 72.0), (3, 78.0)] {
            store.append(ProgressSample::new(1, 1, period, pct, 70.0)).unwrap();
        }

        let periods: Vec<u32> = store.query(1, Some(1)).iter().map(|s| s.period).collect();
        assert_eq!(periods, vec![1, 2, 3]);
    }

    #[test]
    fn test_backdated_sample_rejected() {
        let store = ProgressSampleStore::new();
        store.append(ProgressSample::new(1, 1, 2, 50.0, 50.0)).unwrap();

        let same = store.append(ProgressSample::new(1, 1, 2, 60.0, 60.0));
        assert_eq!(same, Err(ValidationError::InvalidPeriod { period: 2, last: 2 }));

        let earlier = store.append(ProgressSample::new(1, 1, 1, 60.0, 60.0));
        assert!(matches!(earlier, Err(ValidationError::InvalidPeriod { .. })));

        assert_eq!(store.sample_count(1), 1);
    }

    #[test]
    fn test_periods_are_tracked_per_exercise() {
        let store = ProgressSampleStore::new();
        store.append(ProgressSample::new(1, 1, 3, 50.0, 50.0)).unwrap();
        // A different exercise has its own series
        store.append(ProgressSample::new(1, 2, 1, 50.0, 50.0)).unwrap();
        // As does a different patient
        store.append(ProgressSample::new(2, 1, 1, 50.0, 50.0)).unwrap();

        assert_eq!(store.sample_count(1), 2);
        assert_eq!(store.patient_ids(), vec![1, 2]);
    }

    #[test]
    fn test_out_of_range_rejected_without_write() {
        let store = ProgressSampleStore::new();
        let err = store.append(ProgressSample::new(1, 1, 1, 120.0, 50.0)).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRangeValue { .. }));
        assert!(store.query(1, None).is_empty());
        assert!(store.patient_ids().is_empty());
    }

    #[test]
    fn test_query_all_exercises_orders_by_period_then_exercise() {
        let store = ProgressSampleStore::new();
        store.append(ProgressSample::new(1, 2, 1, 10.0, 10.0)).unwrap();
        store.append(ProgressSample::new(1, 1, 1, 20.0, 20.0)).unwrap();
        store.append(ProgressSample::new(1, 1, 2, 30.0, 30.0)).unwrap();
        store.append(ProgressSample::new(1, 2, 2, 40.0, 40.0)).unwrap();

        let order: Vec<(u32, i64)> = store
            .query(1, None)
            .iter()
            .map(|s| (s.period, s.exercise_id))
            .collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
    }

    #[test]
    fn test_query_unknown_patient_is_empty() {
        let store = ProgressSampleStore::new();
        assert!(store.query(42, None).is_empty());
        assert!(store.query(42, Some(1)).is_empty());
    }

    #[test]
    fn test_retract_removes_matching_period_anywhere() {
        let store = ProgressSampleStore::new();
        let first = ProgressSample::new(1, 1, 1, 10.0, 10.0);
        let second = ProgressSample::new(1, 1, 2, 20.0, 20.0);
        let third = ProgressSample::new(1, 1, 3, 30.0, 30.0);
        for sample in [&first, &second, &third] {
            store.append(sample.clone()).unwrap();
        }

        // Middle of the series
        assert!(store.retract(&second));
        assert_eq!(store.query(1, Some(1)), vec![first.clone(), third.clone()]);

        // Already gone, other exercise, unknown patient
        assert!(!store.retract(&second));
        assert!(!store.retract(&ProgressSample::new(1, 2, 1, 10.0, 10.0)));
        assert!(!store.retract(&ProgressSample::new(9, 1, 1, 10.0, 10.0)));

        // Appends after the tail still work
        store.append(ProgressSample::new(1, 1, 4, 40.0, 40.0)).unwrap();
        assert_eq!(store.sample_count(1), 3);
    }

    #[test]
    fn test_from_samples_validates() {
        let ok = ProgressSampleStore::from_samples(vec![
            ProgressSample::new(1, 1, 1, 10.0, 10.0),
            ProgressSample::new(1, 1, 2, 20.0, 20.0),
        ])
        .unwrap();
        assert_eq!(ok.sample_count(1), 2);

        let bad = ProgressSampleStore::from_samples(vec![
            ProgressSample::new(1, 1, 2, 10.0, 10.0),
            ProgressSample::new(1, 1, 1, 20.0, 20.0),
        ]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_concurrent_appends_keep_series_monotonic() {
        let store = Arc::new(ProgressSampleStore::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for period in 1..=50 {
                        // Racing writers: duplicates are rejected, never interleaved
                        let _ = store.append(ProgressSample::new(1, 1, period, 50.0, 50.0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let periods: Vec<u32> = store.query(1, Some(1)).iter().map(|s| s.period).collect();
        assert!(periods.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*periods.last().unwrap(), 50);
    }
}
