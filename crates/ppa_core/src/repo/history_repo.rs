//! Append-only history log persistence.
//!
//! # Invariants
//! - There is no update or delete path; the table triggers abort both.
//! - `record_batch` commits all entries or none.
//! - Listing is newest first: `at DESC`, then reverse insertion order.

use crate::db::migrations::ensure_current;
use crate::model::history::{HistoryAction, HistoryEntryParts, PpaHistoryEntry};
use crate::model::ppa::PpaId;
use crate::repo::{from_millis, parse_uuid, to_millis, RepoError, RepoResult};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

/// Repository interface for the audit log.
pub trait HistoryRepository {
    fn record(&self, entry: &PpaHistoryEntry) -> RepoResult<()>;
    fn record_batch(&self, entries: &[PpaHistoryEntry]) -> RepoResult<()>;
    fn list_for_ppa(&self, ppa_id: PpaId) -> RepoResult<Vec<PpaHistoryEntry>>;
    fn count_for_ppa(&self, ppa_id: PpaId) -> RepoResult<u64>;
}

/// SQLite-backed history log.
pub struct SqliteHistoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHistoryRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_current(conn)?;
        Ok(Self { conn })
    }
}

impl HistoryRepository for SqliteHistoryRepository<'_> {
    fn record(&self, entry: &PpaHistoryEntry) -> RepoResult<()> {
        insert_history_entries(self.conn, std::slice::from_ref(entry))
    }

    fn record_batch(&self, entries: &[PpaHistoryEntry]) -> RepoResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        insert_history_entries(&tx, entries)?;
        tx.commit()?;
        Ok(())
    }

    fn list_for_ppa(&self, ppa_id: PpaId) -> RepoResult<Vec<PpaHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ppa_id, actor_id, at, action, old_value, new_value, note
             FROM ppa_history
             WHERE ppa_id = ?1
             ORDER BY at DESC, rowid DESC;",
        )?;
        let mut rows = stmt.query([ppa_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_history_row(row)?);
        }
        Ok(entries)
    }

    fn count_for_ppa(&self, ppa_id: PpaId) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ppa_history WHERE ppa_id = ?1;",
            [ppa_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Inserts entries on `conn`, which may be an open transaction.
pub(crate) fn insert_history_entries(
    conn: &Connection,
    entries: &[PpaHistoryEntry],
) -> RepoResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO ppa_history (id, ppa_id, actor_id, at, action, old_value, new_value, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
    )?;
    for entry in entries {
        stmt.execute(params![
            entry.id().to_string(),
            entry.ppa_id().to_string(),
            entry.actor_id().to_string(),
            to_millis(entry.at()),
            entry.action().as_str(),
            entry.old_value(),
            entry.new_value(),
            entry.note(),
        ])?;
    }
    Ok(())
}

fn parse_history_row(row: &Row<'_>) -> RepoResult<PpaHistoryEntry> {
    let action_text: String = row.get("action")?;
    let action = HistoryAction::parse(&action_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid action `{action_text}` in ppa_history.action"))
    })?;

    Ok(PpaHistoryEntry::reconstruct(HistoryEntryParts {
        id: parse_uuid(&row.get::<_, String>("id")?, "ppa_history.id")?,
        ppa_id: parse_uuid(&row.get::<_, String>("ppa_id")?, "ppa_history.ppa_id")?,
        actor_id: parse_uuid(&row.get::<_, String>("actor_id")?, "ppa_history.actor_id")?,
        at: from_millis(row.get("at")?, "ppa_history.at")?,
        action,
        old_value: row.get("old_value")?,
        new_value: row.get("new_value")?,
        note: row.get("note")?,
    }))
}
