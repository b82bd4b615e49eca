//! Core domain logic for PPA capstone project records.
//! This crate is the single source of truth for life-cycle and lineage
//! invariants.

pub mod collab;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use collab::{
    Authorizer, FileStorage, ReferenceData, ReferenceDataError, StorageError,
};
pub use config::{bootstrap, BootstrapError, CompletionPolicy, ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use error::ErrorKind;
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::attachment::{AttachmentId, AttachmentType, PpaAttachment};
pub use model::error::DomainError;
pub use model::history::{HistoryAction, PpaHistoryEntry};
pub use model::permission::{Permission, Role, User};
pub use model::ppa::{
    AcademicPeriodId, Ppa, PpaChange, PpaDraft, PpaId, PpaStatus, TeacherAssignmentId, UserId,
};
pub use repo::attachment_repo::{AttachmentRepository, SqliteAttachmentRepository};
pub use repo::history_repo::{HistoryRepository, SqliteHistoryRepository};
pub use repo::ppa_repo::{PpaListQuery, PpaPage, PpaRepository, PpaSummary, SqlitePpaRepository};
pub use repo::role_repo::{RoleRepository, SqliteRoleRepository};
pub use repo::{RepoError, RepoResult};
pub use service::attachment_service::{AttachmentService, AttachmentUpload};
pub use service::continuation::{ContinuationOutcome, ContinuationRequest, ContinuationService};
pub use service::ppa_service::PpaService;
pub use service::role_service::RoleService;
pub use service::{PpaServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
