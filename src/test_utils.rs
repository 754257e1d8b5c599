//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Mock data factories
//! - A store double that always fails
//! - Helper assertions

use crate::catalog::ProgramCatalog;
use crate::db::PersistenceStore;
use crate::error::PersistenceError;
use crate::models::{Patient, ProgramAssignment, ProgressSample};
use sqlx::SqlitePool;

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) so every query sees the same in-memory database
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// Seed three patients (ids 1..=3) and return them
pub async fn seed_test_patients(pool: &SqlitePool) -> Vec<Patient> {
  let patients = vec![
    mock_patient(1, "Low back pain"),
    mock_patient(2, "ACL tear"),
    mock_patient(3, "Hip replacement"),
  ];

  for patient in &patients {
    sqlx::query("INSERT OR REPLACE INTO patients (id, name, age, injury) VALUES (?1, ?2, ?3, ?4)")
      .bind(patient.id)
      .bind(&patient.name)
      .bind(patient.age)
      .bind(&patient.injury)
      .execute(pool)
      .await
      .expect("Failed to seed patient");
  }

  patients
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

/// Create a patient with a generated name and the given diagnosis
pub fn mock_patient(id: i64, injury: &str) -> Patient {
  Patient::new(id, &format!("Patient {}", id), 40 + id, injury)
}

/// Weekly samples for one exercise, periods numbered from 1
pub fn mock_samples(patient_id: i64, completion: &[f64], adherence: &[f64]) -> Vec<ProgressSample> {
  completion
    .iter()
    .zip(adherence)
    .enumerate()
    .map(|(i, (&c, &a))| ProgressSample::new(patient_id, 1, i as u32 + 1, c, a))
    .collect()
}

/// Six weeks of completion/adherence as shown on the clinic dashboard
pub fn dashboard_samples(patient_id: i64) -> Vec<ProgressSample> {
  mock_samples(
    patient_id,
    &[65.0, 72.0, 78.0, 82.0, 85.0, 89.0],
    &[70.0, 75.0, 80.0, 85.0, 82.0, 90.0],
  )
}

/// ---------------------------------------------------------------------------
/// Store Doubles
/// ---------------------------------------------------------------------------

/// Store whose every operation fails with `Unavailable`
pub struct FailingStore;

fn unavailable() -> PersistenceError {
  PersistenceError::Unavailable("store offline".to_string())
}

impl PersistenceStore for FailingStore {
  async fn save_patient(&self, _patient: &Patient) -> Result<(), PersistenceError> {
    Err(unavailable())
  }

  async fn load_patients(&self) -> Result<Vec<Patient>, PersistenceError> {
    Err(unavailable())
  }

  async fn save_program_assignment(&self, _assignment: &ProgramAssignment) -> Result<(), PersistenceError> {
    Err(unavailable())
  }

  async fn load_program_assignment(&self, _patient_id: i64) -> Result<Option<ProgramAssignment>, PersistenceError> {
    Err(unavailable())
  }

  async fn append_progress_sample(&self, _sample: &ProgressSample) -> Result<(), PersistenceError> {
    Err(unavailable())
  }

  async fn load_progress_samples(&self) -> Result<Vec<ProgressSample>, PersistenceError> {
    Err(unavailable())
  }

  async fn save_catalog(&self, _catalog: &ProgramCatalog) -> Result<(), PersistenceError> {
    Err(unavailable())
  }

  async fn load_catalog(&self) -> Result<ProgramCatalog, PersistenceError> {
    Err(unavailable())
  }
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> = sqlx::query_as(
      "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('patients', 'program_templates', 'program_assignments', 'program_assignment_history', 'progress_samples')"
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert_eq!(tables.len(), 5, "Expected 5 tables, got {}", tables.len());

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_seed_patients_inserts_rows() {
    let pool = setup_test_db().await;

    let patients = seed_test_patients(&pool).await;
    assert_eq!(patients.len(), 3);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patients")
      .fetch_one(&pool)
      .await
      .expect("Failed to count patients");
    assert_eq!(count, 3);

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_mock_factories_create_valid_data() {
    let patient = mock_patient(4, "Frozen shoulder");
    assert_eq!(patient.name, "Patient 4");
    assert_eq!(patient.injury, "Frozen shoulder");

    let samples = dashboard_samples(1);
    assert_eq!(samples.len(), 6);
    assert!(samples.iter().all(|s| s.validate_range().is_ok()));
    assert_eq!(samples.last().map(|s| s.period), Some(6));
  }
}
