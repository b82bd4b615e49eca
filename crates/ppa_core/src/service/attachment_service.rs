//! Attachment use-case service.
//!
//! # Responsibility
//! - Upload bytes through `FileStorage` and register the returned key.
//! - Soft-delete attachments and purge stored files on request.
//!
//! # Invariants
//! - A failed registration deletes the file it just uploaded.
//! - Removing an attachment never deletes stored bytes; only
//!   `purge_attachment_file` does, and only for removed rows.
//! - Attachments cannot be added to or removed from terminal PPAs.

use crate::collab::{FileStorage, StorageError};
use crate::model::attachment::{AttachmentId, AttachmentType, PpaAttachment};
use crate::model::error::DomainError;
use crate::model::history::PpaHistoryEntry;
use crate::model::now;
use crate::model::ppa::{Ppa, PpaId, UserId};
use crate::repo::attachment_repo::AttachmentRepository;
use crate::repo::ppa_repo::PpaRepository;
use crate::repo::RepoError;
use crate::service::{log_outcome, PpaServiceError, ServiceResult};
use log::warn;

/// File payload handed to `upload_attachment`.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentUpload<'a> {
    pub ppa_id: PpaId,
    pub kind: AttachmentType,
    pub file_name: &'a str,
    pub content_type: Option<&'a str>,
    pub bytes: &'a [u8],
}

/// Attachment service facade.
pub struct AttachmentService<R, A, S>
where
    R: PpaRepository,
    A: AttachmentRepository,
    S: FileStorage,
{
    ppas: R,
    attachments: A,
    storage: S,
}

impl<R, A, S> AttachmentService<R, A, S>
where
    R: PpaRepository,
    A: AttachmentRepository,
    S: FileStorage,
{
    pub fn new(ppas: R, attachments: A, storage: S) -> Self {
        Self {
            ppas,
            attachments,
            storage,
        }
    }

    /// Stores the bytes and registers the attachment.
    ///
    /// When registration fails after the upload succeeded, the uploaded file
    /// is deleted again and the registration error is returned.
    pub fn upload_attachment(
        &self,
        upload: AttachmentUpload<'_>,
        actor_id: UserId,
    ) -> ServiceResult<PpaAttachment> {
        let result = self.upload_inner(upload, actor_id);
        log_outcome("attachment_upload", upload.ppa_id, &result);
        result
    }

    fn upload_inner(
        &self,
        upload: AttachmentUpload<'_>,
        actor_id: UserId,
    ) -> ServiceResult<PpaAttachment> {
        self.load_mutable(upload.ppa_id)?;
        let file_name = upload.file_name.trim();
        if file_name.is_empty() {
            return Err(DomainError::BlankField {
                field: "attachment name",
            }
            .into());
        }

        let file_key = self.storage.upload(
            upload.bytes,
            file_name,
            upload.content_type,
            upload.kind.storage_folder(),
        )?;

        let registered = self.register_inner(
            upload.ppa_id,
            upload.kind,
            file_name,
            &file_key,
            upload.content_type,
            actor_id,
        );
        if registered.is_err() {
            if let Err(cleanup) = self.storage.delete(&file_key) {
                warn!(
                    "event=attachment_upload_cleanup module=service status=error ppa_id={} error={cleanup}",
                    upload.ppa_id
                );
            }
        }
        registered
    }

    /// Registers a file that is already stored under `file_key`.
    ///
    /// # Errors
    /// - `Duplicate` when the key is already registered anywhere, including
    ///   by a removed attachment.
    /// - `TerminalState` when the PPA is archived or continued.
    pub fn register_attachment(
        &self,
        ppa_id: PpaId,
        kind: AttachmentType,
        name: &str,
        file_key: &str,
        content_type: Option<&str>,
        actor_id: UserId,
    ) -> ServiceResult<PpaAttachment> {
        let result = self.register_inner(ppa_id, kind, name, file_key, content_type, actor_id);
        log_outcome("attachment_register", ppa_id, &result);
        result
    }

    fn register_inner(
        &self,
        ppa_id: PpaId,
        kind: AttachmentType,
        name: &str,
        file_key: &str,
        content_type: Option<&str>,
        actor_id: UserId,
    ) -> ServiceResult<PpaAttachment> {
        self.load_mutable(ppa_id)?;
        let attachment = PpaAttachment::new(ppa_id, kind, name, file_key, content_type, actor_id)?;
        // The unique index still guards concurrent registrations.
        if self.attachments.file_key_exists(&attachment.file_key)? {
            return Err(RepoError::Duplicate {
                entity: "attachment file key",
                key: attachment.file_key,
            }
            .into());
        }
        let entry =
            PpaHistoryEntry::for_attachment(actor_id, attachment.uploaded_at, &attachment, false)?;
        self.attachments.add_attachment(&attachment, &[entry])?;
        Ok(attachment)
    }

    /// Soft-deletes an attachment.
    ///
    /// Returns `false` when it was already removed; no history is written
    /// in that case.
    pub fn remove_attachment(
        &self,
        attachment_id: AttachmentId,
        actor_id: UserId,
    ) -> ServiceResult<bool> {
        let result = (|| -> ServiceResult<bool> {
            let attachment = self.load_attachment(attachment_id)?;
            if !attachment.is_active() {
                return Ok(false);
            }
            self.load_mutable(attachment.ppa_id)?;
            let at = now();
            let entry = PpaHistoryEntry::for_attachment(actor_id, at, &attachment, true)?;
            Ok(self.attachments.mark_deleted(attachment_id, at, &[entry])?)
        })();
        log_outcome("attachment_remove", attachment_id, &result);
        result
    }

    /// Deletes the stored bytes of a removed attachment.
    ///
    /// A file already missing from storage counts as purged.
    pub fn purge_attachment_file(&self, attachment_id: AttachmentId) -> ServiceResult<()> {
        let result = (|| -> ServiceResult<()> {
            let attachment = self.load_attachment(attachment_id)?;
            if attachment.is_active() {
                return Err(PpaServiceError::AttachmentNotRemoved(attachment_id));
            }
            match self.storage.delete(&attachment.file_key) {
                Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
                Err(err) => Err(err.into()),
            }
        })();
        log_outcome("attachment_purge", attachment_id, &result);
        result
    }

    /// Returns metadata and bytes of a live attachment.
    pub fn download_attachment(
        &self,
        attachment_id: AttachmentId,
    ) -> ServiceResult<(PpaAttachment, Vec<u8>)> {
        let attachment = self.load_attachment(attachment_id)?;
        if !attachment.is_active() {
            return Err(PpaServiceError::AttachmentNotFound(attachment_id));
        }
        let bytes = self.storage.get(&attachment.file_key)?;
        Ok((attachment, bytes))
    }

    pub fn list_attachments(
        &self,
        ppa_id: PpaId,
        include_deleted: bool,
    ) -> ServiceResult<Vec<PpaAttachment>> {
        self.load(ppa_id)?;
        Ok(self.attachments.list_for_ppa(ppa_id, include_deleted)?)
    }

    pub fn count_by_type(
        &self,
        ppa_id: PpaId,
        kind: AttachmentType,
        include_deleted: bool,
    ) -> ServiceResult<u64> {
        Ok(self
            .attachments
            .count_by_type(ppa_id, kind, include_deleted)?)
    }

    fn load(&self, ppa_id: PpaId) -> ServiceResult<Ppa> {
        self.ppas
            .get_ppa(ppa_id)?
            .ok_or(PpaServiceError::PpaNotFound(ppa_id))
    }

    fn load_mutable(&self, ppa_id: PpaId) -> ServiceResult<Ppa> {
        let ppa = self.load(ppa_id)?;
        if ppa.status().is_terminal() {
            return Err(DomainError::TerminalState {
                ppa_id,
                status: ppa.status(),
            }
            .into());
        }
        Ok(ppa)
    }

    fn load_attachment(&self, attachment_id: AttachmentId) -> ServiceResult<PpaAttachment> {
        self.attachments
            .get_attachment(attachment_id)?
            .ok_or(PpaServiceError::AttachmentNotFound(attachment_id))
    }
}
