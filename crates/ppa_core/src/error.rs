//! Caller-facing error classification.
//!
//! # Responsibility
//! - Give outer layers one stable way to tell failure kinds apart.
//!
//! # Invariants
//! - Every error type that reaches a caller exposes `kind()`.
//! - Kinds never collapse: a duplicate is never reported as a conflict.

use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Distinguishable failure kinds surfaced by core operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or blank required input.
    Validation,
    /// Referenced entity does not exist.
    NotFound,
    /// Unique constraint violated (code, file key, assignment-in-PPA).
    Duplicate,
    /// Operation attempted on an absorbing status.
    TerminalState,
    /// Concurrency or cross-aggregate business-rule violation.
    Conflict,
    /// Database or external collaborator fault.
    Storage,
}

impl ErrorKind {
    /// Stable label used in log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Duplicate => "duplicate",
            Self::TerminalState => "terminal_state",
            Self::Conflict => "conflict",
            Self::Storage => "storage",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
