use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Program name recorded when a clinician confirms exercises without a template
pub const CUSTOM_PROGRAM: &str = "custom";

/// ---------------------------------------------------------------------------
/// Frequency
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Frequency {
  #[default]
  #[serde(rename = "daily")]
  Daily,
  #[serde(rename = "2x/week")]
  TwiceWeekly,
  #[serde(rename = "3x/week")]
  ThreeTimesWeekly,
  #[serde(rename = "4x/week")]
  FourTimesWeekly,
  #[serde(rename = "5x/week")]
  FiveTimesWeekly,
}

impl Frequency {
  pub const ALL: [Frequency; 5] = [
    Frequency::Daily,
    Frequency::TwiceWeekly,
    Frequency::ThreeTimesWeekly,
    Frequency::FourTimesWeekly,
    Frequency::FiveTimesWeekly,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Frequency::Daily => "daily",
      Frequency::TwiceWeekly => "2x/week",
      Frequency::ThreeTimesWeekly => "3x/week",
      Frequency::FourTimesWeekly => "4x/week",
      Frequency::FiveTimesWeekly => "5x/week",
    }
  }

  /// Sessions expected in a 7-day week
  pub fn sessions_per_week(&self) -> u32 {
    match self {
      Frequency::Daily => 7,
      Frequency::TwiceWeekly => 2,
      Frequency::ThreeTimesWeekly => 3,
      Frequency::FourTimesWeekly => 4,
      Frequency::FiveTimesWeekly => 5,
    }
  }
}

impl std::fmt::Display for Frequency {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for Frequency {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase();
    Frequency::ALL
      .into_iter()
      .find(|f| f.as_str() == normalized)
      .ok_or_else(|| ValidationError::invalid_value("frequency", format!("unknown frequency '{}'", s)))
  }
}

/// ---------------------------------------------------------------------------
/// Templates
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseTemplate {
  pub id: i64,
  pub name: String,
  pub sets: u32,
  pub reps: u32,
  pub frequency: Frequency,
}

impl ExerciseTemplate {
  pub fn validate(&self) -> Result<(), ValidationError> {
    validate_exercise(&self.name, self.sets, self.reps)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramTemplate {
  pub id: i64,
  pub name: String,
  pub exercises: Vec<ExerciseTemplate>,
}

impl ProgramTemplate {
  /// Independent copies of every exercise, ready to be customized for one patient
  pub fn assign_exercises(&self) -> Vec<ExerciseAssignment> {
    self.exercises.iter().map(ExerciseAssignment::from).collect()
  }
}

/// ---------------------------------------------------------------------------
/// Assignments
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseAssignment {
  pub id: i64,
  pub name: String,
  pub sets: u32,
  pub reps: u32,
  pub frequency: Frequency,
}

impl ExerciseAssignment {
  pub fn validate(&self) -> Result<(), ValidationError> {
    validate_exercise(&self.name, self.sets, self.reps)
  }
}

impl From<&ExerciseTemplate> for ExerciseAssignment {
  fn from(template: &ExerciseTemplate) -> Self {
    Self {
      id: template.id,
      name: template.name.clone(),
      sets: template.sets,
      reps: template.reps,
      frequency: template.frequency,
    }
  }
}

/// A confirmed program for one patient. A later confirmation replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramAssignment {
  pub patient_id: i64,
  pub program_name: String,
  pub exercises: Vec<ExerciseAssignment>,
  pub confirmed_at: DateTime<Utc>,
}

impl ProgramAssignment {
  pub fn is_custom(&self) -> bool {
    self.program_name == CUSTOM_PROGRAM
  }
}

fn validate_exercise(name: &str, sets: u32, reps: u32) -> Result<(), ValidationError> {
  if name.trim().is_empty() {
    return Err(ValidationError::invalid_value("name", "must not be blank"));
  }
  if sets < 1 {
    return Err(ValidationError::invalid_value("sets", "must be at least 1"));
  }
  if reps < 1 {
    return Err(ValidationError::invalid_value("reps", "must be at least 1"));
  }
  Ok(())
}
