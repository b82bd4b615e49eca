//! Domain model for the PPA life cycle.
//!
//! # Responsibility
//! - Define the PPA aggregate, its owned entities and the audit entry shape.
//! - Define permission tokens and roles consumed by authorization.
//!
//! # Invariants
//! - Every identifier is a non-nil `Uuid` (roles use integer ids).
//! - Status is a closed enum; integer codes exist only in persistence.
//! - Attachments are soft-deleted, never removed.

pub mod attachment;
pub mod continuation;
pub mod error;
pub mod history;
pub mod permission;
pub mod ppa;
pub mod student;

use chrono::{DateTime, SubsecRound, Utc};

/// Current time at the millisecond precision persistence keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
