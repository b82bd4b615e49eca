//! Collaborator contracts consumed by the services.
//!
//! # Responsibility
//! - Describe authorization, file storage and reference-data lookups as
//!   traits the host application implements.
//!
//! # Invariants
//! - Collaborator failures surface as typed errors; the core never retries.

use crate::model::permission::{Permission, User};
use crate::model::ppa::{AcademicPeriodId, TeacherAssignmentId};
use thiserror::Error;

/// Answers permission questions for the acting principal.
///
/// Services assume the caller gated the request before invoking them.
pub trait Authorizer {
    fn has_permission(&self, permission: &Permission) -> bool;
}

impl Authorizer for User {
    fn has_permission(&self, permission: &Permission) -> bool {
        User::has_permission(self, permission)
    }
}

/// Failure reported by a file storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Physical file storage addressed by logical keys.
pub trait FileStorage {
    /// Stores `bytes` under `folder` and returns the generated file key.
    fn upload(
        &self,
        bytes: &[u8],
        file_name: &str,
        content_type: Option<&str>,
        folder: &str,
    ) -> Result<String, StorageError>;
    fn delete(&self, file_key: &str) -> Result<(), StorageError>;
    fn get(&self, file_key: &str) -> Result<Vec<u8>, StorageError>;
}

impl<T: FileStorage + ?Sized> FileStorage for &T {
    fn upload(
        &self,
        bytes: &[u8],
        file_name: &str,
        content_type: Option<&str>,
        folder: &str,
    ) -> Result<String, StorageError> {
        (**self).upload(bytes, file_name, content_type, folder)
    }

    fn delete(&self, file_key: &str) -> Result<(), StorageError> {
        (**self).delete(file_key)
    }

    fn get(&self, file_key: &str) -> Result<Vec<u8>, StorageError> {
        (**self).get(file_key)
    }
}

/// Failure reported by the reference-data lookup.
#[derive(Debug, Error)]
#[error("reference data unavailable: {0}")]
pub struct ReferenceDataError(pub String);

/// Existence and activity checks for academic periods and teacher
/// assignments owned by other aggregates.
pub trait ReferenceData {
    fn period_exists(&self, id: AcademicPeriodId) -> Result<bool, ReferenceDataError>;
    fn period_is_active(&self, id: AcademicPeriodId) -> Result<bool, ReferenceDataError>;
    fn assignment_exists(&self, id: TeacherAssignmentId) -> Result<bool, ReferenceDataError>;
    fn assignment_is_active(&self, id: TeacherAssignmentId) -> Result<bool, ReferenceDataError>;
}

impl<T: ReferenceData + ?Sized> ReferenceData for &T {
    fn period_exists(&self, id: AcademicPeriodId) -> Result<bool, ReferenceDataError> {
        (**self).period_exists(id)
    }

    fn period_is_active(&self, id: AcademicPeriodId) -> Result<bool, ReferenceDataError> {
        (**self).period_is_active(id)
    }

    fn assignment_exists(&self, id: TeacherAssignmentId) -> Result<bool, ReferenceDataError> {
        (**self).assignment_exists(id)
    }

    fn assignment_is_active(&self, id: TeacherAssignmentId) -> Result<bool, ReferenceDataError> {
        (**self).assignment_is_active(id)
    }
}

#[cfg(test)]
mod tests {
    use super::Authorizer;
    use crate::model::permission::{system_roles, Permission, User};
    use uuid::Uuid;

    #[test]
    fn user_authorizes_through_role_union() {
        let teacher = system_roles()
            .into_iter()
            .find(|role| role.code() == "teacher")
            .unwrap();
        let user = User::new(Uuid::new_v4(), vec![teacher]);
        let authorizer: &dyn Authorizer = &user;

        assert!(authorizer.has_permission(&Permission::parse("ppa.view").unwrap()));
        assert!(!authorizer.has_permission(&Permission::parse("roles.manage").unwrap()));
    }
}
