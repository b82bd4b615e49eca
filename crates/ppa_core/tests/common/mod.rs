#![allow(dead_code)]

use ppa_core::{
    FileStorage, PpaService, ReferenceData, ReferenceDataError, SqliteAttachmentRepository,
    SqliteHistoryRepository, SqlitePpaRepository, StorageError,
};
use rusqlite::Connection;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use uuid::Uuid;

/// File storage double keeping bytes in a map.
#[derive(Default)]
pub struct InMemoryStorage {
    files: RefCell<HashMap<String, Vec<u8>>>,
    uploads: Cell<u32>,
    forced_key: RefCell<Option<String>>,
    fail_uploads: Cell<bool>,
}

impl InMemoryStorage {
    pub fn contains(&self, file_key: &str) -> bool {
        self.files.borrow().contains_key(file_key)
    }

    pub fn file_count(&self) -> usize {
        self.files.borrow().len()
    }

    /// Makes the next upload return `file_key` instead of a fresh key.
    pub fn force_next_key(&self, file_key: &str) {
        *self.forced_key.borrow_mut() = Some(file_key.to_string());
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.set(true);
    }
}

impl FileStorage for InMemoryStorage {
    fn upload(
        &self,
        bytes: &[u8],
        file_name: &str,
        _content_type: Option<&str>,
        folder: &str,
    ) -> Result<String, StorageError> {
        if self.fail_uploads.get() {
            return Err(StorageError::Backend("upload rejected".to_string()));
        }
        let sequence = self.uploads.get() + 1;
        self.uploads.set(sequence);
        let file_key = self
            .forced_key
            .borrow_mut()
            .take()
            .unwrap_or_else(|| format!("{folder}/{sequence}-{file_name}"));
        // A forced key may collide with an existing file; keep the original bytes.
        self.files
            .borrow_mut()
            .entry(file_key.clone())
            .or_insert_with(|| bytes.to_vec());
        Ok(file_key)
    }

    fn delete(&self, file_key: &str) -> Result<(), StorageError> {
        self.files
            .borrow_mut()
            .remove(file_key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(file_key.to_string()))
    }

    fn get(&self, file_key: &str) -> Result<Vec<u8>, StorageError> {
        self.files
            .borrow()
            .get(file_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(file_key.to_string()))
    }
}

/// Reference data double: known ids mapped to their active flag.
#[derive(Default)]
pub struct StaticReferenceData {
    periods: HashMap<Uuid, bool>,
    assignments: HashMap<Uuid, bool>,
    unavailable: bool,
}

impl StaticReferenceData {
    pub fn with_period(mut self, id: Uuid, active: bool) -> Self {
        self.periods.insert(id, active);
        self
    }

    pub fn with_assignment(mut self, id: Uuid, active: bool) -> Self {
        self.assignments.insert(id, active);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn check(&self) -> Result<(), ReferenceDataError> {
        if self.unavailable {
            return Err(ReferenceDataError("lookup offline".to_string()));
        }
        Ok(())
    }
}

impl ReferenceData for StaticReferenceData {
    fn period_exists(&self, id: Uuid) -> Result<bool, ReferenceDataError> {
        self.check()?;
        Ok(self.periods.contains_key(&id))
    }

    fn period_is_active(&self, id: Uuid) -> Result<bool, ReferenceDataError> {
        self.check()?;
        Ok(self.periods.get(&id).copied().unwrap_or(false))
    }

    fn assignment_exists(&self, id: Uuid) -> Result<bool, ReferenceDataError> {
        self.check()?;
        Ok(self.assignments.contains_key(&id))
    }

    fn assignment_is_active(&self, id: Uuid) -> Result<bool, ReferenceDataError> {
        self.check()?;
        Ok(self.assignments.get(&id).copied().unwrap_or(false))
    }
}

/// Ids shared by most scenarios.
pub struct World {
    pub period: Uuid,
    pub next_period: Uuid,
    pub closed_period: Uuid,
    pub teacher: Uuid,
    pub actor: Uuid,
    pub assignment: Uuid,
    pub other_assignment: Uuid,
    pub inactive_assignment: Uuid,
}

impl World {
    pub fn new() -> Self {
        Self {
            period: Uuid::new_v4(),
            next_period: Uuid::new_v4(),
            closed_period: Uuid::new_v4(),
            teacher: Uuid::new_v4(),
            actor: Uuid::new_v4(),
            assignment: Uuid::new_v4(),
            other_assignment: Uuid::new_v4(),
            inactive_assignment: Uuid::new_v4(),
        }
    }

    pub fn reference(&self) -> StaticReferenceData {
        StaticReferenceData::default()
            .with_period(self.period, true)
            .with_period(self.next_period, true)
            .with_period(self.closed_period, false)
            .with_assignment(self.assignment, true)
            .with_assignment(self.other_assignment, true)
            .with_assignment(self.inactive_assignment, false)
    }
}

pub type SqlitePpaService<'a> = PpaService<
    SqlitePpaRepository<'a>,
    SqliteAttachmentRepository<'a>,
    SqliteHistoryRepository<'a>,
    &'a StaticReferenceData,
>;

pub fn ppa_service<'a>(
    conn: &'a Connection,
    reference: &'a StaticReferenceData,
) -> SqlitePpaService<'a> {
    PpaService::new(
        SqlitePpaRepository::try_new(conn).unwrap(),
        SqliteAttachmentRepository::try_new(conn).unwrap(),
        SqliteHistoryRepository::try_new(conn).unwrap(),
        reference,
    )
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}
