//! Rehabilitation Program Catalog
//!
//! Registry of program templates, built once at startup from configuration and
//! read-only afterwards. Registration order is significant: the injury matcher
//! resolves overlapping names in favour of the first registered program.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::ValidationError;
use crate::matcher::normalize_label;
use crate::models::{ExerciseTemplate, Frequency, ProgramTemplate};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgramCatalog {
    programs: Vec<ProgramTemplate>,
}

impl ProgramCatalog {
    /// Build a catalog, rejecting duplicate names and invalid exercises
    pub fn new(programs: Vec<ProgramTemplate>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        for program in &programs {
            if !seen.insert(normalize_label(&program.name)) {
                return Err(ValidationError::DuplicateProgram(program.name.clone()));
            }
            for exercise in &program.exercises {
                exercise.validate()?;
            }
        }

        let catalog = Self { programs };
        for (shorter, longer) in catalog.overlapping_names() {
            warn!(
                shorter = %shorter,
                longer = %longer,
                "Overlapping program names; injury labels matching both resolve to the first registered"
            );
        }
        info!(programs = catalog.len(), "Program catalog loaded");
        Ok(catalog)
    }

    /// The default programs shipped with the dashboard
    pub fn builtin() -> Self {
        Self {
            programs: builtin_programs(),
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ProgramTemplate> {
        let wanted = normalize_label(name);
        self.programs
            .iter()
            .find(|p| normalize_label(&p.name) == wanted)
    }

    pub fn find_by_id(&self, id: i64) -> Option<&ProgramTemplate> {
        self.programs.iter().find(|p| p.id == id)
    }

    /// All programs in registration order
    pub fn list_all(&self) -> &[ProgramTemplate] {
        &self.programs
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Pairs of (contained, containing) names, where a label equal to the first
    /// would also match the second
    fn overlapping_names(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for a in &self.programs {
            for b in &self.programs {
                let (na, nb) = (normalize_label(&a.name), normalize_label(&b.name));
                if na != nb && nb.contains(&na) {
                    pairs.push((a.name.clone(), b.name.clone()));
                }
            }
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Built-in programs
// ---------------------------------------------------------------------------

fn exercise(id: i64, name: &str, sets: u32, reps: u32, frequency: Frequency) -> ExerciseTemplate {
    ExerciseTemplate {
        id,
        name: name.to_string(),
        sets,
        reps,
        frequency,
    }
}

fn builtin_programs() -> Vec<ProgramTemplate> {
    use Frequency::{Daily, ThreeTimesWeekly};

    vec![
        ProgramTemplate {
            id: 1,
            name: "Low Back Pain Rehabilitation".to_string(),
            exercises: vec![
                exercise(1, "Back stretches", 3, 10, Daily),
                exercise(2, "Core strengthening", 3, 15, Daily),
                exercise(3, "Piriformis stretch", 2, 5, ThreeTimesWeekly),
            ],
        },
        ProgramTemplate {
            id: 2,
            name: "ACL Tear Rehabilitation".to_string(),
            exercises: vec![
                exercise(1, "Straight leg raise", 3, 12, Daily),
                exercise(2, "Knee flexion", 3, 15, Daily),
                exercise(3, "Partial squat", 3, 10, ThreeTimesWeekly),
            ],
        },
        ProgramTemplate {
            id: 3,
            name: "Hip Replacement Rehabilitation".to_string(),
            exercises: vec![
                exercise(1, "Glute bridge", 2, 8, Daily),
                exercise(2, "Side-lying leg raise", 2, 10, Daily),
                exercise(3, "Short steps", 3, 5, ThreeTimesWeekly),
            ],
        },
        ProgramTemplate {
            id: 4,
            name: "Achilles Tendinitis Rehabilitation".to_string(),
            exercises: vec![
                exercise(1, "Ankle stretches", 3, 15, Daily),
                exercise(2, "Heel raises", 2, 12, Daily),
                exercise(3, "Calf stretch", 3, 8, ThreeTimesWeekly),
            ],
        },
        ProgramTemplate {
            id: 5,
            name: "Frozen Shoulder Rehabilitation".to_string(),
            exercises: vec![
                exercise(1, "External shoulder rotation", 2, 10, Daily),
                exercise(2, "Shoulder stretch", 3, 5, Daily),
                exercise(3, "Arm raise", 2, 8, ThreeTimesWeekly),
            ],
        },
    ]
}
