//! Error taxonomy for the rehab engine
//!
//! Validation failures are always caller-correctable and never retried.
//! Persistence failures are surfaced unchanged from the storage collaborator.
//! "Nothing found" outcomes (no matching program, no alert) are not errors and
//! are modelled with `Option` / dedicated enums instead.

use serde::Serialize;

/// ---------------------------------------------------------------------------
/// Validation
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
  #[error("{field} must be within [0, 100], got {value}")]
  OutOfRangeValue { field: &'static str, value: f64 },

  #[error("period {period} must be after the last recorded period {last}")]
  InvalidPeriod { period: u32, last: u32 },

  #[error("exercise index {index} out of range (draft has {len} exercises)")]
  IndexOutOfRange { index: usize, len: usize },

  #[error("unknown exercise field: {0}")]
  InvalidField(String),

  #[error("invalid value for {field}: {reason}")]
  InvalidValue { field: String, reason: String },

  #[error("duplicate program name in catalog: {0}")]
  DuplicateProgram(String),
}

impl ValidationError {
  pub(crate) fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
    Self::InvalidValue {
      field: field.to_string(),
      reason: reason.into(),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Persistence
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Migration error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Corrupt stored value: {0}")]
  Corrupt(String),

  #[error("Storage unavailable: {0}")]
  Unavailable(String),
}

/// ---------------------------------------------------------------------------
/// Engine
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RehabError {
  #[error("Validation failed: {0}")]
  Validation(#[from] ValidationError),

  #[error("No progress samples recorded for patient {patient_id}")]
  NoSamples { patient_id: i64 },

  #[error("No patient bound to the assignment draft")]
  NoPatient,

  #[error("Persistence failed: {0}")]
  Persistence(#[from] PersistenceError),
}

impl RehabError {
  /// True for failures the caller can fix by changing its input
  pub fn is_validation(&self) -> bool {
    matches!(self, Self::Validation(_))
  }
}

impl Serialize for ValidationError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

impl Serialize for RehabError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}
