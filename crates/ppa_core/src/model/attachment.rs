//! Attachment ledger entries.
//!
//! # Responsibility
//! - Describe typed file references owned by one PPA.
//! - Provide soft-delete lifecycle helpers and the policy count.
//!
//! # Invariants
//! - `file_key` is a logical storage key; bytes live in the storage
//!   collaborator. Global uniqueness is a persistence index.
//! - Soft delete is idempotent and never clears `deleted_at` once set.

use crate::model::error::{optional_text, require_id, require_text, DomainResult};
use crate::model::now;
use crate::model::ppa::{PpaId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type AttachmentId = Uuid;

/// Classification used for policy counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentType {
    /// Main PPA document. Gates completion.
    Document,
    TeacherAuthorization,
    StudentAuthorization,
    SourceCode,
    Presentation,
    ResearchInstrument,
    Evidence,
    Other,
}

impl AttachmentType {
    pub const ALL: [AttachmentType; 8] = [
        Self::Document,
        Self::TeacherAuthorization,
        Self::StudentAuthorization,
        Self::SourceCode,
        Self::Presentation,
        Self::ResearchInstrument,
        Self::Evidence,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::TeacherAuthorization => "teacher_authorization",
            Self::StudentAuthorization => "student_authorization",
            Self::SourceCode => "source_code",
            Self::Presentation => "presentation",
            Self::ResearchInstrument => "research_instrument",
            Self::Evidence => "evidence",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Storage folder used when uploading bytes of this type.
    pub fn storage_folder(self) -> &'static str {
        match self {
            Self::Document => "ppa/documents",
            Self::TeacherAuthorization | Self::StudentAuthorization => "ppa/authorizations",
            Self::SourceCode => "ppa/source",
            Self::Presentation => "ppa/presentations",
            Self::ResearchInstrument => "ppa/instruments",
            Self::Evidence => "ppa/evidence",
            Self::Other => "ppa/other",
        }
    }
}

impl Display for AttachmentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed file reference owned by one PPA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpaAttachment {
    pub id: AttachmentId,
    pub ppa_id: PpaId,
    #[serde(rename = "type")]
    pub kind: AttachmentType,
    pub name: String,
    pub file_key: String,
    pub content_type: Option<String>,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PpaAttachment {
    /// Creates a live attachment record.
    ///
    /// # Errors
    /// - `BlankField` when `name` or `file_key` is blank.
    /// - `NilId` for nil PPA or uploader ids.
    pub fn new(
        ppa_id: PpaId,
        kind: AttachmentType,
        name: &str,
        file_key: &str,
        content_type: Option<&str>,
        uploaded_by: UserId,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            ppa_id: require_id("ppa id", ppa_id)?,
            kind,
            name: require_text("attachment name", name)?,
            file_key: require_text("file key", file_key)?,
            content_type: optional_text(content_type),
            uploaded_by: require_id("uploader id", uploaded_by)?,
            uploaded_at: now(),
            is_deleted: false,
            deleted_at: None,
        })
    }

    /// Soft-deletes this attachment. Returns `false` when already deleted.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_deleted {
            return false;
        }
        self.is_deleted = true;
        self.deleted_at = Some(at);
        true
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Counts attachments of `kind` for `ppa_id`.
///
/// Soft-deleted rows are skipped unless `include_deleted` is set.
pub fn count_by_type(
    attachments: &[PpaAttachment],
    ppa_id: PpaId,
    kind: AttachmentType,
    include_deleted: bool,
) -> usize {
    attachments
        .iter()
        .filter(|attachment| attachment.ppa_id == ppa_id && attachment.kind == kind)
        .filter(|attachment| include_deleted || attachment.is_active())
        .count()
}
