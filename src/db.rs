//! Persistence collaborator
//!
//! The engine talks to storage only through `PersistenceStore`; failures come
//! back as `PersistenceError` and are never retried here. `SqliteStore` is the
//! bundled implementation backed by a `sqlx` SQLite pool.

use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::catalog::ProgramCatalog;
use crate::error::PersistenceError;
use crate::models::{ExerciseAssignment, ExerciseTemplate, Patient, ProgramAssignment, ProgramTemplate, ProgressSample};

pub type DbPool = SqlitePool;

/// ---------------------------------------------------------------------------
/// Collaborator contract
/// ---------------------------------------------------------------------------

pub trait PersistenceStore: Send + Sync {
  fn save_patient(&self, patient: &Patient) -> impl Future<Output = Result<(), PersistenceError>> + Send;

  fn load_patients(&self) -> impl Future<Output = Result<Vec<Patient>, PersistenceError>> + Send;

  /// Store the patient's current assignment, replacing any earlier one
  fn save_program_assignment(
    &self,
    assignment: &ProgramAssignment,
  ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

  fn load_program_assignment(
    &self,
    patient_id: i64,
  ) -> impl Future<Output = Result<Option<ProgramAssignment>, PersistenceError>> + Send;

  fn append_progress_sample(
    &self,
    sample: &ProgressSample,
  ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

  /// All samples ordered by patient, exercise, then period
  fn load_progress_samples(&self) -> impl Future<Output = Result<Vec<ProgressSample>, PersistenceError>> + Send;

  fn save_catalog(&self, catalog: &ProgramCatalog) -> impl Future<Output = Result<(), PersistenceError>> + Send;

  fn load_catalog(&self) -> impl Future<Output = Result<ProgramCatalog, PersistenceError>> + Send;
}

/// ---------------------------------------------------------------------------
/// Pool setup
/// ---------------------------------------------------------------------------

/// Open the connection pool and run migrations
pub async fn initialize_db(database_url: &str) -> Result<DbPool, PersistenceError> {
  info!(database_url, "Initializing database");

  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(database_url)
    .await?;

  sqlx::migrate!("./migrations").run(&pool).await?;

  info!("Database initialized successfully");

  Ok(pool)
}

/// ---------------------------------------------------------------------------
/// SQLite implementation
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: DbPool,
}

impl SqliteStore {
  pub fn new(pool: DbPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &DbPool {
    &self.pool
  }
}

fn to_u32(column: &str, value: i64) -> Result<u32, PersistenceError> {
  u32::try_from(value).map_err(|_| PersistenceError::Corrupt(format!("{} out of range: {}", column, value)))
}

impl PersistenceStore for SqliteStore {
  async fn save_patient(&self, patient: &Patient) -> Result<(), PersistenceError> {
    sqlx::query(
      r#"
      INSERT INTO patients (id, name, age, injury, last_visit, next_visit)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6)
      ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        age = excluded.age,
        injury = excluded.injury,
        last_visit = excluded.last_visit,
        next_visit = excluded.next_visit
      "#,
    )
    .bind(patient.id)
    .bind(&patient.name)
    .bind(patient.age)
    .bind(&patient.injury)
    .bind(patient.last_visit)
    .bind(patient.next_visit)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn load_patients(&self) -> Result<Vec<Patient>, PersistenceError> {
    let patients = sqlx::query_as::<_, Patient>(
      "SELECT id, name, age, injury, last_visit, next_visit FROM patients ORDER BY id",
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(patients)
  }

  async fn save_program_assignment(&self, assignment: &ProgramAssignment) -> Result<(), PersistenceError> {
    let exercises_json = serde_json::to_string(&assignment.exercises)?;
    let mut tx = self.pool.begin().await?;

    sqlx::query(
      r#"
      INSERT INTO program_assignments (patient_id, program_name, exercises_json, confirmed_at)
      VALUES (?1, ?2, ?3, ?4)
      ON CONFLICT(patient_id) DO UPDATE SET
        program_name = excluded.program_name,
        exercises_json = excluded.exercises_json,
        confirmed_at = excluded.confirmed_at
      "#,
    )
    .bind(assignment.patient_id)
    .bind(&assignment.program_name)
    .bind(&exercises_json)
    .bind(assignment.confirmed_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
      r#"
      INSERT INTO program_assignment_history (patient_id, program_name, exercises_json, confirmed_at)
      VALUES (?1, ?2, ?3, ?4)
      "#,
    )
    .bind(assignment.patient_id)
    .bind(&assignment.program_name)
    .bind(&exercises_json)
    .bind(assignment.confirmed_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
  }

  async fn load_program_assignment(&self, patient_id: i64) -> Result<Option<ProgramAssignment>, PersistenceError> {
    let row = sqlx::query(
      "SELECT program_name, exercises_json, confirmed_at FROM program_assignments WHERE patient_id = ?1",
    )
    .bind(patient_id)
    .fetch_optional(&self.pool)
    .await?;

    let Some(row) = row else {
      return Ok(None);
    };

    let exercises_json: String = row.try_get("exercises_json")?;
    let exercises: Vec<ExerciseAssignment> = serde_json::from_str(&exercises_json)
      .map_err(|e| PersistenceError::Corrupt(format!("assignment exercises for patient {}: {}", patient_id, e)))?;
    let confirmed_at: DateTime<Utc> = row.try_get("confirmed_at")?;

    Ok(Some(ProgramAssignment {
      patient_id,
      program_name: row.try_get("program_name")?,
      exercises,
      confirmed_at,
    }))
  }

  async fn append_progress_sample(&self, sample: &ProgressSample) -> Result<(), PersistenceError> {
    sqlx::query(
      r#"
      INSERT INTO progress_samples (patient_id, exercise_id, period, completion_pct, adherence_pct)
      VALUES (?1, ?2, ?3, ?4, ?5)
      "#,
    )
    .bind(sample.patient_id)
    .bind(sample.exercise_id)
    .bind(i64::from(sample.period))
    .bind(sample.completion_pct)
    .bind(sample.adherence_pct)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn load_progress_samples(&self) -> Result<Vec<ProgressSample>, PersistenceError> {
    let rows = sqlx::query(
      r#"
      SELECT patient_id, exercise_id, period, completion_pct, adherence_pct
      FROM progress_samples
      ORDER BY patient_id, exercise_id, period
      "#,
    )
    .fetch_all(&self.pool)
    .await?;

    rows
      .iter()
      .map(|row| -> Result<ProgressSample, PersistenceError> {
        Ok(ProgressSample {
          patient_id: row.try_get("patient_id")?,
          exercise_id: row.try_get("exercise_id")?,
          period: to_u32("period", row.try_get("period")?)?,
          completion_pct: row.try_get("completion_pct")?,
          adherence_pct: row.try_get("adherence_pct")?,
        })
      })
      .collect()
  }

  async fn save_catalog(&self, catalog: &ProgramCatalog) -> Result<(), PersistenceError> {
    let mut tx = self.pool.begin().await?;

    sqlx::query("DELETE FROM program_templates")
      .execute(&mut *tx)
      .await?;

    for (position, program) in catalog.list_all().iter().enumerate() {
      let exercises_json = serde_json::to_string(&program.exercises)?;
      sqlx::query(
        r#"
        INSERT INTO program_templates (id, name, position, exercises_json)
        VALUES (?1, ?2, ?3, ?4)
        "#,
      )
      .bind(program.id)
      .bind(&program.name)
      .bind(position as i64)
      .bind(&exercises_json)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    info!(programs = catalog.len(), "Program catalog saved");
    Ok(())
  }

  async fn load_catalog(&self) -> Result<ProgramCatalog, PersistenceError> {
    let rows = sqlx::query("SELECT id, name, exercises_json FROM program_templates ORDER BY position")
      .fetch_all(&self.pool)
      .await?;

    let mut programs = Vec::with_capacity(rows.len());
    for row in rows {
      let name: String = row.try_get("name")?;
      let exercises_json: String = row.try_get("exercises_json")?;
      let exercises: Vec<ExerciseTemplate> = serde_json::from_str(&exercises_json)
        .map_err(|e| PersistenceError::Corrupt(format!("exercises for program '{}': {}", name, e)))?;

      programs.push(ProgramTemplate {
        id: row.try_get("id")?,
        name,
        exercises,
      });
    }

    ProgramCatalog::new(programs).map_err(|e| PersistenceError::Corrupt(e.to_string()))
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
