//! Program assignment workflow
//!
//! A clinician opens a draft for a patient (pre-filled from the matched
//! program), edits it, and confirms it. Every edit is validated before it is
//! applied, so a draft is never left half-updated. Confirming hands the final
//! assignment to the persistence collaborator, superseding any earlier one.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::ProgramCatalog;
use crate::db::PersistenceStore;
use crate::error::{RehabError, ValidationError};
use crate::matcher::{match_injury, ProgramMatch};
use crate::models::{
    ExerciseAssignment, Frequency, Patient, ProgramAssignment, ProgramTemplate, CUSTOM_PROGRAM,
};

const NEW_EXERCISE_NAME: &str = "New exercise";
const NEW_EXERCISE_SETS: u32 = 3;
const NEW_EXERCISE_REPS: u32 = 10;

// ---------------------------------------------------------------------------
/// Exercise Update: one typed field change
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ExerciseUpdate {
    Name(String),
    Sets(u32),
    Reps(u32),
    Frequency(Frequency),
}

impl ExerciseUpdate {
    /// Parse a `(field, value)` pair coming from a form or request body
    pub fn parse(field: &str, value: &str) -> Result<Self, ValidationError> {
        let count = |name: &str| {
            value.trim().parse::<u32>().map_err(|_| {
                ValidationError::invalid_value(name, format!("'{}' is not a whole number", value))
            })
        };

        match field.trim().to_lowercase().as_str() {
            "name" => Ok(ExerciseUpdate::Name(value.to_string())),
            "sets" => Ok(ExerciseUpdate::Sets(count("sets")?)),
            "reps" => Ok(ExerciseUpdate::Reps(count("reps")?)),
            "frequency" => Ok(ExerciseUpdate::Frequency(value.parse()?)),
            _ => Err(ValidationError::InvalidField(field.to_string())),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ExerciseUpdate::Name(name) if name.trim().is_empty() => {
                Err(ValidationError::invalid_value("name", "must not be blank"))
            }
            ExerciseUpdate::Sets(0) => Err(ValidationError::invalid_value("sets", "must be at least 1")),
            ExerciseUpdate::Reps(0) => Err(ValidationError::invalid_value("reps", "must be at least 1")),
            _ => Ok(()),
        }
    }

    fn apply(self, exercise: &mut ExerciseAssignment) {
        match self {
            ExerciseUpdate::Name(name) => exercise.name = name.trim().to_string(),
            ExerciseUpdate::Sets(sets) => exercise.sets = sets,
            ExerciseUpdate::Reps(reps) => exercise.reps = reps,
            ExerciseUpdate::Frequency(frequency) => exercise.frequency = frequency,
        }
    }
}

// ---------------------------------------------------------------------------
/// Assignment Draft: editable, not yet confirmed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentDraft {
    patient: Option<Patient>,
    program_name: Option<String>,
    exercises: Vec<ExerciseAssignment>,
    /// Draft-scoped id counter; ids are never reused after a removal
    next_exercise_id: i64,
}

impl AssignmentDraft {
    /// A draft with no patient and no exercises
    pub fn new() -> Self {
        Self {
            next_exercise_id: 1,
            ..Self::default()
        }
    }

    pub fn for_patient(patient: Patient) -> Self {
        Self {
            patient: Some(patient),
            ..Self::new()
        }
    }

    pub fn bind_patient(&mut self, patient: Patient) {
        self.patient = Some(patient);
    }

    pub fn patient(&self) -> Option<&Patient> {
        self.patient.as_ref()
    }

    /// Selected template name; `None` means a custom program
    pub fn program_name(&self) -> Option<&str> {
        self.program_name.as_deref()
    }

    pub fn exercises(&self) -> &[ExerciseAssignment] {
        &self.exercises
    }

    /// Replace all exercises with fresh copies of the template's
    pub fn select_program(&mut self, template: &ProgramTemplate) {
        self.exercises = template.assign_exercises();
        self.program_name = Some(template.name.clone());
        self.next_exercise_id = self.max_exercise_id() + 1;
    }

    pub fn update_exercise(&mut self, index: usize, update: ExerciseUpdate) -> Result<(), ValidationError> {
        let len = self.exercises.len();
        let exercise = self
            .exercises
            .get_mut(index)
            .ok_or(ValidationError::IndexOutOfRange { index, len })?;

        update.validate()?;
        update.apply(exercise);
        Ok(())
    }

    /// Append a default exercise and return its id
    pub fn add_exercise(&mut self) -> i64 {
        let id = self.next_exercise_id.max(self.max_exercise_id() + 1);
        self.next_exercise_id = id + 1;
        self.exercises.push(ExerciseAssignment {
            id,
            name: NEW_EXERCISE_NAME.to_string(),
            sets: NEW_EXERCISE_SETS,
            reps: NEW_EXERCISE_REPS,
            frequency: Frequency::Daily,
        });
        id
    }

    /// Remove in place; remaining exercises keep their ids
    pub fn remove_exercise(&mut self, index: usize) -> Result<ExerciseAssignment, ValidationError> {
        if index >= self.exercises.len() {
            return Err(ValidationError::IndexOutOfRange {
                index,
                len: self.exercises.len(),
            });
        }
        Ok(self.exercises.remove(index))
    }

    fn max_exercise_id(&self) -> i64 {
        self.exercises.iter().map(|e| e.id).max().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
/// Assignment Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProgramAssignmentService {
    catalog: Arc<ProgramCatalog>,
}

impl ProgramAssignmentService {
    pub fn new(catalog: Arc<ProgramCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ProgramCatalog {
        &self.catalog
    }

    /// Open a draft pre-filled from the program matching the patient's injury.
    /// Without a match the draft starts empty and the clinician builds it by hand.
    pub fn start_assignment(&self, patient: &Patient) -> AssignmentDraft {
        let mut draft = AssignmentDraft::for_patient(patient.clone());
        match match_injury(&patient.injury, &self.catalog) {
            ProgramMatch::Matched(template) => draft.select_program(template),
            ProgramMatch::NoMatch => {
                info!(patient_id = patient.id, injury = %patient.injury, "No program matches injury");
            }
        }
        draft
    }

    /// Override the auto-match with a catalog program chosen by name
    pub fn select_program_by_name(
        &self,
        draft: &mut AssignmentDraft,
        program_name: &str,
    ) -> Option<&ProgramTemplate> {
        let template = self.catalog.find_by_name(program_name)?;
        draft.select_program(template);
        Some(template)
    }

    /// Materialize the assignment and hand it to persistence
    pub async fn confirm<S>(&self, draft: &AssignmentDraft, store: &S) -> Result<ProgramAssignment, RehabError>
    where
        S: PersistenceStore,
    {
        let patient = draft.patient().ok_or(RehabError::NoPatient)?;
        for exercise in draft.exercises() {
            exercise.validate()?;
        }

        let assignment = ProgramAssignment {
            patient_id: patient.id,
            program_name: draft
                .program_name()
                .unwrap_or(CUSTOM_PROGRAM)
                .to_string(),
            exercises: draft.exercises().to_vec(),
            confirmed_at: Utc::now(),
        };

        store.save_program_assignment(&assignment).await?;

        info!(
            patient_id = assignment.patient_id,
            program = %assignment.program_name,
            exercises = assignment.exercises.len(),
            "Program assignment confirmed"
        );
        Ok(assignment)
    }
}

// ---------------------------------------------------------------------------
/// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::test_utils::{mock_patient, setup_test_db, teardown_test_db, FailingStore};

    fn service() -> ProgramAssignmentService {
        ProgramAssignmentService::new(Arc::new(ProgramCatalog::builtin()))
    }

    #[test]
    fn test_start_assignment_copies_matched_program() {
        let patient = mock_patient(2, "ACL tear");
        let draft = service().start_assignment(&patient);

        assert_eq!(draft.program_name(), Some("ACL Tear Rehabilitation"));
        assert_eq!(draft.exercises().len(), 3);
        assert!(draft.exercises().iter().all(|e| e.sets >= 1 && e.reps >= 1));
        assert_eq!(draft.patient().unwrap().id, 2);
    }

    #[test]
    fn test_start_assignment_without_match_is_empty() {
        let draft = service().start_assignment(&mock_patient(9, "Tennis elbow"));
        assert!(draft.exercises().is_empty());
        assert_eq!(draft.program_name(), None);
    }

    #[test]
    fn test_draft_edits_do_not_touch_catalog() {
        let service = service();
        let mut draft = service.start_assignment(&mock_patient(2, "ACL tear"));
        draft.update_exercise(0, ExerciseUpdate::Sets(6)).unwrap();

        let template = service.catalog().find_by_name("ACL Tear Rehabilitation").unwrap();
        assert_eq!(template.exercises[0].sets, 3);
        assert_eq!(draft.exercises()[0].sets, 6);
    }

    #[test]
    fn test_update_sets_zero_rejected_and_draft_unchanged() {
        let mut draft = service().start_assignment(&mock_patient(2, "ACL tear"));
        let before = draft.clone();

        let err = draft.update_exercise(0, ExerciseUpdate::Sets(0)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
        assert_eq!(draft, before);

        let parsed = ExerciseUpdate::parse("sets", "0").unwrap();
        assert!(draft.update_exercise(0, parsed).is_err());
        assert_eq!(draft, before);
    }

    #[test]
    fn test_update_index_out_of_range() {
        let mut draft = service().start_assignment(&mock_patient(2, "ACL tear"));
        let err = draft.update_exercise(3, ExerciseUpdate::Reps(12)).unwrap_err();
        assert_eq!(err, ValidationError::IndexOutOfRange { index: 3, len: 3 });
    }

    #[test]
    fn test_update_each_field() {
        let mut draft = service().start_assignment(&mock_patient(2, "ACL tear"));
        draft.update_exercise(1, ExerciseUpdate::parse("name", " Hamstring curl ").unwrap()).unwrap();
        draft.update_exercise(1, ExerciseUpdate::parse("reps", "20").unwrap()).unwrap();
        draft.update_exercise(1, ExerciseUpdate::parse("frequency", "2x/week").unwrap()).unwrap();

        let exercise = &draft.exercises()[1];
        assert_eq!(exercise.name, "Hamstring curl");
        assert_eq!(exercise.reps, 20);
        assert_eq!(exercise.frequency, Frequency::TwiceWeekly);
    }

    #[test]
    fn test_parse_rejects_unknown_field_and_bad_values() {
        assert_eq!(
            ExerciseUpdate::parse("weight", "10"),
            Err(ValidationError::InvalidField("weight".to_string()))
        );
        assert!(matches!(
            ExerciseUpdate::parse("sets", "-2"),
            Err(ValidationError::InvalidValue { .. })
        ));
        assert!(matches!(
            ExerciseUpdate::parse("frequency", "hourly"),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut draft = service().start_assignment(&mock_patient(2, "ACL tear"));
        assert!(draft.update_exercise(0, ExerciseUpdate::Name("  ".to_string())).is_err());
        assert_eq!(draft.exercises()[0].name, "Straight leg raise");
    }

    #[test]
    fn test_add_exercise_defaults() {
        let mut draft = service().start_assignment(&mock_patient(2, "ACL tear"));
        let id = draft.add_exercise();

        assert_eq!(id, 4);
        let added = draft.exercises().last().unwrap();
        assert_eq!(added.name, NEW_EXERCISE_NAME);
        assert_eq!((added.sets, added.reps), (3, 10));
        assert_eq!(added.frequency, Frequency::Daily);
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let mut draft = service().start_assignment(&mock_patient(2, "ACL tear"));
        let removed = draft.remove_exercise(0).unwrap();
        assert_eq!(removed.id, 1);

        // Remaining ids are untouched
        let ids: Vec<i64> = draft.exercises().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3]);

        // count + 1 would collide with id 3; the counter does not
        assert_eq!(draft.add_exercise(), 4);
        assert_eq!(draft.add_exercise(), 5);
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut draft = AssignmentDraft::new();
        assert_eq!(
            draft.remove_exercise(0),
            Err(ValidationError::IndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn test_select_program_overrides_match() {
        let service = service();
        let mut draft = service.start_assignment(&mock_patient(2, "ACL tear"));
        draft.add_exercise();

        let chosen = service
            .select_program_by_name(&mut draft, "Frozen Shoulder Rehabilitation")
            .unwrap();
        assert_eq!(chosen.id, 5);
        assert_eq!(draft.program_name(), Some("Frozen Shoulder Rehabilitation"));
        assert_eq!(draft.exercises().len(), 3);
        assert_eq!(draft.exercises()[0].name, "External shoulder rotation");

        assert!(service.select_program_by_name(&mut draft, "Nope").is_none());
        assert_eq!(draft.exercises().len(), 3);
    }

    #[tokio::test]
    async fn test_confirm_without_patient_fails() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool.clone());

        let mut draft = AssignmentDraft::new();
        draft.add_exercise();
        let result = service().confirm(&draft, &store).await;
        assert!(matches!(result, Err(RehabError::NoPatient)));

        teardown_test_db(pool).await;
    }

    #[tokio::test]
    async fn test_confirm_persists_and_supersedes() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool.clone());
        let service = service();
        let patient = mock_patient(2, "ACL tear");
        store.save_patient(&patient).await.unwrap();

        let first = service
            .confirm(&service.start_assignment(&patient), &store)
            .await
            .expect("first confirm");
        assert_eq!(first.program_name, "ACL Tear Rehabilitation");

        // Second confirmation replaces the first entirely
        let mut custom = AssignmentDraft::for_patient(patient.clone());
        custom.add_exercise();
        let second = service.confirm(&custom, &store).await.expect("second confirm");
        assert!(second.is_custom());

        let stored = store
            .load_program_assignment(patient.id)
            .await
            .unwrap()
            .expect("assignment stored");
        assert_eq!(stored.program_name, CUSTOM_PROGRAM);
        assert_eq!(stored.exercises.len(), 1);
        assert_eq!(stored.exercises[0].name, NEW_EXERCISE_NAME);

        teardown_test_db(pool).await;
    }

    #[tokio::test]
    async fn test_confirm_surfaces_persistence_error() {
        let patient = mock_patient(2, "ACL tear");
        let draft = service().start_assignment(&patient);

        let result = service().confirm(&draft, &FailingStore).await;
        assert!(matches!(result, Err(RehabError::Persistence(_))));
    }
}
