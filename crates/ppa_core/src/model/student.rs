//! Students enrolled in one PPA.

use crate::model::ppa::PpaId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StudentId = Uuid;

/// Student attached to a PPA. Identity has no meaning outside its PPA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpaStudent {
    pub id: StudentId,
    pub ppa_id: PpaId,
    pub name: String,
}

impl PpaStudent {
    pub fn new(ppa_id: PpaId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ppa_id,
            name: name.into(),
        }
    }

    /// Key used for case-insensitive deduplication within one PPA.
    pub fn dedupe_key(&self) -> String {
        student_key(&self.name)
    }
}

pub(crate) fn student_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Trims, drops blanks and removes case-insensitive duplicates.
///
/// The first spelling of each name wins; input order is preserved.
pub fn normalize_student_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut normalized = Vec::new();
    for name in names {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(student_key(trimmed)) {
            normalized.push(trimmed.to_string());
        }
    }
    normalized
}
