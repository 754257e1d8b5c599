//! Progress monitoring: sample intake, per-patient evaluation and batch scans
//!
//! `ProgressMonitor` wires the in-memory sample store to the aggregator and the
//! classifier. A patient's baseline is the one configured for their confirmed
//! program, falling back to the program matched from their injury label.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::anomaly::{AnomalyClassifier, BaselineCurve, Classification};
use crate::catalog::ProgramCatalog;
use crate::db::PersistenceStore;
use crate::error::RehabError;
use crate::matcher::match_injury;
use crate::models::{AnomalyAlert, Patient, ProgramAssignment, ProgressSample};
use crate::notify::Notifier;
use crate::samples::ProgressSampleStore;
use crate::trend::TrendAggregator;

pub struct ProgressMonitor {
  samples: Arc<ProgressSampleStore>,
  aggregator: TrendAggregator,
  classifier: AnomalyClassifier,
  catalog: Arc<ProgramCatalog>,
  baselines: HashMap<String, BaselineCurve>,
  /// Confirmed program name per patient
  assigned: DashMap<i64, String>,
}

impl ProgressMonitor {
  pub fn new(
    samples: Arc<ProgressSampleStore>,
    catalog: Arc<ProgramCatalog>,
    classifier: AnomalyClassifier,
    baselines: HashMap<String, BaselineCurve>,
  ) -> Self {
    Self {
      aggregator: TrendAggregator::new(Arc::clone(&samples)),
      samples,
      classifier,
      catalog,
      baselines,
      assigned: DashMap::new(),
    }
  }

  /// Record a confirmed assignment; later evaluations use its program's baseline
  pub fn assign_program(&self, assignment: &ProgramAssignment) {
    self
      .assigned
      .insert(assignment.patient_id, assignment.program_name.clone());
  }

  /// Confirmed program if any, otherwise the program matched from the injury
  fn program_for(&self, patient: &Patient) -> Option<String> {
    if let Some(name) = self.assigned.get(&patient.id) {
      return Some(name.value().clone());
    }
    match_injury(&patient.injury, &self.catalog)
      .program()
      .map(|p| p.name.clone())
  }

  pub fn samples(&self) -> &ProgressSampleStore {
    &self.samples
  }

  pub fn aggregator(&self) -> &TrendAggregator {
    &self.aggregator
  }

  /// Append in memory, then persist. A persistence failure retracts the
  /// in-memory sample before the error is returned.
  pub async fn record_sample<S: PersistenceStore>(
    &self,
    sample: ProgressSample,
    store: &S,
  ) -> Result<(), RehabError> {
    self.samples.append(sample.clone())?;

    if let Err(e) = store.append_progress_sample(&sample).await {
      let retracted = self.samples.retract(&sample);
      warn!(
        patient_id = sample.patient_id,
        exercise_id = sample.exercise_id,
        period = sample.period,
        retracted,
        error = %e,
        "Sample not persisted"
      );
      if !retracted {
        warn!(
          patient_id = sample.patient_id,
          exercise_id = sample.exercise_id,
          period = sample.period,
          "Unpersisted sample was already gone from memory"
        );
      }
      return Err(e.into());
    }

    Ok(())
  }

  /// Summarize the patient's recent window and classify it against the
  /// baseline of their program
  pub fn evaluate(&self, patient: &Patient, window: usize) -> Result<Classification, RehabError> {
    let summary = self.aggregator.summarize(patient.id, window)?;

    let Some(program) = self.program_for(patient) else {
      debug!(patient_id = patient.id, injury = %patient.injury, "No program matches injury");
      return Ok(Classification::NoAnomaly);
    };

    let Some(baseline) = self.baselines.get(&program) else {
      debug!(patient_id = patient.id, program = %program, "No baseline configured");
      return Ok(Classification::NoAnomaly);
    };

    Ok(self.classifier.classify(patient, &summary, baseline))
  }

  /// Evaluate every patient in parallel and return alerts, largest deviation
  /// first. Patients without samples are skipped.
  pub fn scan(&self, patients: &[Patient], window: usize) -> Vec<AnomalyAlert> {
    let mut alerts: Vec<AnomalyAlert> = patients
      .par_iter()
      .filter_map(|patient| match self.evaluate(patient, window) {
        Ok(classification) => classification.alert(),
        Err(RehabError::NoSamples { .. }) => None,
        Err(e) => {
          warn!(patient_id = patient.id, error = %e, "Evaluation failed");
          None
        }
      })
      .collect();

    alerts.sort_by(|a, b| {
      b.deviation_pct
        .abs()
        .total_cmp(&a.deviation_pct.abs())
        .then(a.patient_id.cmp(&b.patient_id))
    });

    info!(patients = patients.len(), alerts = alerts.len(), "Scan complete");
    alerts
  }

  /// Fire a check-up message for a flagged patient; does not wait for delivery
  pub fn request_checkup(&self, alert: &AnomalyAlert, notifier: &dyn Notifier) {
    let text = self.classifier.recommendations().checkup_message(&alert.patient_name);
    notifier.send_checkup_message(alert.patient_id, &text);
  }
}
