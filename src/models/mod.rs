pub mod patient;
pub mod program;
pub mod progress;

pub use patient::Patient;
pub use program::{
  ExerciseAssignment, ExerciseTemplate, Frequency, ProgramAssignment, ProgramTemplate,
  CUSTOM_PROGRAM,
};
pub use progress::{AnomalyAlert, AnomalyKind, ExerciseTrend, PeriodPoint, ProgressSample, TrendSummary};
