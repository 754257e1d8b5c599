//! Injury-to-program matching
//!
//! Programs are named after the condition they treat, so a program matches an
//! injury label when its name contains the label (both trimmed and case-folded).
//! The first match in catalog registration order wins.

use serde::Serialize;

use crate::catalog::ProgramCatalog;
use crate::models::ProgramTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "program", rename_all = "snake_case")]
pub enum ProgramMatch<'a> {
    Matched(&'a ProgramTemplate),
    /// No default program; the clinician assigns exercises manually
    NoMatch,
}

impl<'a> ProgramMatch<'a> {
    pub fn program(self) -> Option<&'a ProgramTemplate> {
        match self {
            ProgramMatch::Matched(p) => Some(p),
            ProgramMatch::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, ProgramMatch::Matched(_))
    }
}

/// Trim and case-fold a label for comparison
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Resolve an injury label to the first catalog program whose name contains it
pub fn match_injury<'a>(injury: &str, catalog: &'a ProgramCatalog) -> ProgramMatch<'a> {
    let label = normalize_label(injury);
    if label.is_empty() {
        return ProgramMatch::NoMatch;
    }

    catalog
        .list_all()
        .iter()
        .find(|p| normalize_label(&p.name).contains(&label))
        .map_or(ProgramMatch::NoMatch, ProgramMatch::Matched)
}

/// Every program the label matches, in registration order. More than one entry
/// means the first-registered tie-break decided the result of `match_injury`.
pub fn ambiguous_matches<'a>(injury: &str, catalog: &'a ProgramCatalog) -> Vec<&'a ProgramTemplate> {
    let label = normalize_label(injury);
    if label.is_empty() {
        return Vec::new();
    }

    catalog
        .list_all()
        .iter()
        .filter(|p| normalize_label(&p.name).contains(&label))
        .collect()
}
