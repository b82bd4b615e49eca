//! Attachment ledger persistence.
//!
//! # Invariants
//! - `file_key` is unique across all PPAs (unique index).
//! - Rows are soft-deleted only; `deleted_at` is set once.
//! - Ledger writes and their history entries share one transaction.

use crate::db::migrations::ensure_current;
use crate::model::attachment::{AttachmentId, AttachmentType, PpaAttachment};
use crate::model::history::PpaHistoryEntry;
use crate::model::ppa::PpaId;
use crate::repo::history_repo::insert_history_entries;
use crate::repo::{
    bool_to_int, from_millis, int_to_bool, map_unique_violation, parse_uuid, to_millis,
    RepoError, RepoResult,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const ATTACHMENT_SELECT_SQL: &str = "SELECT
    id,
    ppa_id,
    type,
    name,
    file_key,
    content_type,
    uploaded_by,
    uploaded_at,
    is_deleted,
    deleted_at
FROM ppa_attachments";

/// Repository interface for the attachment ledger.
pub trait AttachmentRepository {
    /// Registers a new attachment row together with its history.
    ///
    /// Fails with `Duplicate` when the file key is already registered.
    fn add_attachment(
        &self,
        attachment: &PpaAttachment,
        history: &[PpaHistoryEntry],
    ) -> RepoResult<()>;
    fn get_attachment(&self, id: AttachmentId) -> RepoResult<Option<PpaAttachment>>;
    fn file_key_exists(&self, file_key: &str) -> RepoResult<bool>;
    /// Soft-deletes one attachment.
    ///
    /// Returns `false` without writing history when the row was already
    /// deleted.
    fn mark_deleted(
        &self,
        id: AttachmentId,
        at: DateTime<Utc>,
        history: &[PpaHistoryEntry],
    ) -> RepoResult<bool>;
    fn count_by_type(
        &self,
        ppa_id: PpaId,
        kind: AttachmentType,
        include_deleted: bool,
    ) -> RepoResult<u64>;
    /// Lists attachments oldest upload first.
    fn list_for_ppa(&self, ppa_id: PpaId, include_deleted: bool)
        -> RepoResult<Vec<PpaAttachment>>;
}

/// SQLite-backed attachment ledger.
pub struct SqliteAttachmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAttachmentRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_current(conn)?;
        Ok(Self { conn })
    }
}

impl AttachmentRepository for SqliteAttachmentRepository<'_> {
    fn add_attachment(
        &self,
        attachment: &PpaAttachment,
        history: &[PpaHistoryEntry],
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO ppa_attachments (
                id,
                ppa_id,
                type,
                name,
                file_key,
                content_type,
                uploaded_by,
                uploaded_at,
                is_deleted,
                deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                attachment.id.to_string(),
                attachment.ppa_id.to_string(),
                attachment.kind.as_str(),
                attachment.name.as_str(),
                attachment.file_key.as_str(),
                attachment.content_type.as_deref(),
                attachment.uploaded_by.to_string(),
                to_millis(attachment.uploaded_at),
                bool_to_int(attachment.is_deleted),
                attachment.deleted_at.map(to_millis),
            ],
        )
        .map_err(|err| map_unique_violation(err, "attachment file key", &attachment.file_key))?;
        insert_history_entries(&tx, history)?;
        tx.commit()?;
        Ok(())
    }

    fn get_attachment(&self, id: AttachmentId) -> RepoResult<Option<PpaAttachment>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ATTACHMENT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_attachment_row(row)?)),
            None => Ok(None),
        }
    }

    fn file_key_exists(&self, file_key: &str) -> RepoResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM ppa_attachments WHERE file_key = ?1 LIMIT 1;",
                [file_key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_deleted(
        &self,
        id: AttachmentId,
        at: DateTime<Utc>,
        history: &[PpaHistoryEntry],
    ) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE ppa_attachments
             SET is_deleted = 1, deleted_at = ?2
             WHERE id = ?1 AND is_deleted = 0;",
            params![id.to_string(), to_millis(at)],
        )?;

        if changed == 0 {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM ppa_attachments WHERE id = ?1;",
                    [id.to_string()],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .is_some();
            // Nothing was written; dropping the transaction rolls back.
            if !exists {
                return Err(RepoError::not_found("attachment", id));
            }
            return Ok(false);
        }

        insert_history_entries(&tx, history)?;
        tx.commit()?;
        Ok(true)
    }

    fn count_by_type(
        &self,
        ppa_id: PpaId,
        kind: AttachmentType,
        include_deleted: bool,
    ) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM ppa_attachments
             WHERE ppa_id = ?1
               AND type = ?2
               AND (?3 = 1 OR is_deleted = 0);",
            params![ppa_id.to_string(), kind.as_str(), bool_to_int(include_deleted)],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn list_for_ppa(
        &self,
        ppa_id: PpaId,
        include_deleted: bool,
    ) -> RepoResult<Vec<PpaAttachment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ATTACHMENT_SELECT_SQL}
             WHERE ppa_id = ?1
               AND (?2 = 1 OR is_deleted = 0)
             ORDER BY uploaded_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query(params![ppa_id.to_string(), bool_to_int(include_deleted)])?;
        let mut attachments = Vec::new();
        while let Some(row) = rows.next()? {
            attachments.push(parse_attachment_row(row)?);
        }
        Ok(attachments)
    }
}

fn parse_attachment_row(row: &Row<'_>) -> RepoResult<PpaAttachment> {
    let kind_text: String = row.get("type")?;
    let kind = AttachmentType::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid attachment type `{kind_text}` in ppa_attachments.type"
        ))
    })?;

    Ok(PpaAttachment {
        id: parse_uuid(&row.get::<_, String>("id")?, "ppa_attachments.id")?,
        ppa_id: parse_uuid(&row.get::<_, String>("ppa_id")?, "ppa_attachments.ppa_id")?,
        kind,
        name: row.get("name")?,
        file_key: row.get("file_key")?,
        content_type: row.get("content_type")?,
        uploaded_by: parse_uuid(
            &row.get::<_, String>("uploaded_by")?,
            "ppa_attachments.uploaded_by",
        )?,
        uploaded_at: from_millis(row.get("uploaded_at")?, "ppa_attachments.uploaded_at")?,
        is_deleted: int_to_bool(row.get("is_deleted")?, "ppa_attachments.is_deleted")?,
        deleted_at: row
            .get::<_, Option<i64>>("deleted_at")?
            .map(|value| from_millis(value, "ppa_attachments.deleted_at"))
            .transpose()?,
    })
}
