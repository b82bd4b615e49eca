//! PPA repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the PPA aggregate (row, assignment links, students).
//! - Write history entries in the same transaction as the aggregate.
//! - Provide the paged list query.
//!
//! # Invariants
//! - Every update is guarded by the optimistic `version` column.
//! - An active PPA with a non-empty assignment set never shares that exact
//!   set with another active PPA in the same period. The check runs inside
//!   the write transaction.
//! - `commit_continuation` inserts the target, freezes the source and writes
//!   the history batch atomically.
//! - Status integers appear only in `status_to_db` / `parse_status`.

use crate::db::migrations::ensure_current;
use crate::model::history::PpaHistoryEntry;
use crate::model::ppa::{
    AcademicPeriodId, Ppa, PpaId, PpaParts, PpaStatus, TeacherAssignmentId, UserId,
};
use crate::model::student::PpaStudent;
use crate::repo::history_repo::insert_history_entries;
use crate::repo::{
    from_millis, parse_optional_uuid, parse_uuid, to_millis, RepoError, RepoResult,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rusqlite::{Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::BTreeSet;

const PPA_DEFAULT_LIMIT: u32 = 20;
const PPA_LIMIT_MAX: u32 = 100;

const PPA_SELECT_SQL: &str = "SELECT
    id,
    title,
    general_objective,
    specific_objectives,
    description,
    status,
    academic_period_id,
    primary_teacher_id,
    continuation_of_ppa_id,
    continued_by_ppa_id,
    created_at,
    updated_at,
    version
FROM ppas";

/// Filters and pagination for listing PPAs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpaListQuery {
    /// Case-insensitive substring match on title or description.
    pub search: Option<String>,
    pub academic_period_id: Option<AcademicPeriodId>,
    pub status: Option<PpaStatus>,
    pub primary_teacher_id: Option<UserId>,
    pub teacher_assignment_id: Option<TeacherAssignmentId>,
    /// Defaults to 20 and clamps to 100.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// List row for PPA browsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PpaSummary {
    pub id: PpaId,
    pub title: String,
    pub status: PpaStatus,
    pub academic_period_id: AcademicPeriodId,
    pub primary_teacher_id: UserId,
    pub continuation_of_ppa_id: Option<PpaId>,
    pub continued_by_ppa_id: Option<PpaId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One page of list results plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PpaPage {
    pub items: Vec<PpaSummary>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// Repository interface for the PPA aggregate.
pub trait PpaRepository {
    /// Inserts a new PPA together with its creation history.
    ///
    /// Fails with `AssignmentSetOccupied` when another active PPA in the
    /// period holds the same assignment set.
    fn insert_ppa(&self, ppa: &Ppa, history: &[PpaHistoryEntry]) -> RepoResult<()>;
    /// Saves `ppa` if its stored version still equals `ppa.version()`.
    ///
    /// Returns the new version. Applies the same occupancy rule as
    /// `insert_ppa`.
    fn update_ppa(&self, ppa: &Ppa, history: &[PpaHistoryEntry]) -> RepoResult<u32>;
    fn get_ppa(&self, id: PpaId) -> RepoResult<Option<Ppa>>;
    fn list_ppas(&self, query: &PpaListQuery) -> RepoResult<PpaPage>;
    /// Inserts `target`, saves the frozen `source` and writes `history` in
    /// one transaction. Returns the new source version.
    fn commit_continuation(
        &self,
        source: &Ppa,
        target: &Ppa,
        history: &[PpaHistoryEntry],
    ) -> RepoResult<u32>;
}

/// SQLite-backed PPA repository.
pub struct SqlitePpaRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePpaRepository<'conn> {
    /// Creates the repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_current(conn)?;
        Ok(Self { conn })
    }
}

impl PpaRepository for SqlitePpaRepository<'_> {
    fn insert_ppa(&self, ppa: &Ppa, history: &[PpaHistoryEntry]) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        insert_ppa_rows(&tx, ppa)?;
        ensure_unoccupied(&tx, ppa)?;
        insert_history_entries(&tx, history)?;
        tx.commit()?;
        Ok(())
    }

    fn update_ppa(&self, ppa: &Ppa, history: &[PpaHistoryEntry]) -> RepoResult<u32> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let version = update_ppa_rows(&tx, ppa, false)?;
        ensure_unoccupied(&tx, ppa)?;
        insert_history_entries(&tx, history)?;
        tx.commit()?;
        Ok(version)
    }

    fn get_ppa(&self, id: PpaId) -> RepoResult<Option<Ppa>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PPA_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(load_ppa(self.conn, row)?)),
            None => Ok(None),
        }
    }

    fn list_ppas(&self, query: &PpaListQuery) -> RepoResult<PpaPage> {
        let mut filter = String::from(" WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(search) = query.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                filter.push_str(
                    " AND (title LIKE ? ESCAPE '\\' OR IFNULL(description, '') LIKE ? ESCAPE '\\')",
                );
                let pattern = format!("%{}%", escape_like(search));
                bind_values.push(Value::Text(pattern.clone()));
                bind_values.push(Value::Text(pattern));
            }
        }
        if let Some(period) = query.academic_period_id {
            filter.push_str(" AND academic_period_id = ?");
            bind_values.push(Value::Text(period.to_string()));
        }
        if let Some(status) = query.status {
            filter.push_str(" AND status = ?");
            bind_values.push(Value::Integer(status_to_db(status)));
        }
        if let Some(teacher) = query.primary_teacher_id {
            filter.push_str(" AND primary_teacher_id = ?");
            bind_values.push(Value::Text(teacher.to_string()));
        }
        if let Some(assignment) = query.teacher_assignment_id {
            filter.push_str(
                " AND EXISTS (
                    SELECT 1 FROM ppa_teacher_assignments pta
                    WHERE pta.ppa_id = ppas.id AND pta.teacher_assignment_id = ?
                )",
            );
            bind_values.push(Value::Text(assignment.to_string()));
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM ppas{filter};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let limit = normalize_ppa_limit(query.limit);
        let mut sql = format!(
            "{PPA_SELECT_SQL}{filter} ORDER BY COALESCE(updated_at, created_at) DESC, id ASC LIMIT ?"
        );
        bind_values.push(Value::Integer(i64::from(limit)));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_summary_row(row)?);
        }

        Ok(PpaPage {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            limit,
            offset: query.offset,
        })
    }

    fn commit_continuation(
        &self,
        source: &Ppa,
        target: &Ppa,
        history: &[PpaHistoryEntry],
    ) -> RepoResult<u32> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        insert_ppa_rows(&tx, target)?;
        let source_version = update_ppa_rows(&tx, source, true)?;
        ensure_unoccupied(&tx, target)?;
        insert_history_entries(&tx, history)?;
        tx.commit()?;
        Ok(source_version)
    }
}

/// Normalizes list limit according to the list contract.
pub fn normalize_ppa_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => PPA_DEFAULT_LIMIT,
        Some(value) => value.min(PPA_LIMIT_MAX),
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn insert_ppa_rows(conn: &Connection, ppa: &Ppa) -> RepoResult<()> {
    let id = ppa.id().to_string();
    conn.execute(
        "INSERT INTO ppas (
            id,
            title,
            general_objective,
            specific_objectives,
            description,
            status,
            academic_period_id,
            primary_teacher_id,
            continuation_of_ppa_id,
            continued_by_ppa_id,
            created_at,
            updated_at,
            version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
        params![
            id,
            ppa.title(),
            ppa.general_objective(),
            ppa.specific_objectives(),
            ppa.description(),
            status_to_db(ppa.status()),
            ppa.academic_period_id().to_string(),
            ppa.primary_teacher_id().to_string(),
            ppa.continuation_of_ppa_id().map(|value| value.to_string()),
            ppa.continued_by_ppa_id().map(|value| value.to_string()),
            to_millis(ppa.created_at()),
            ppa.updated_at().map(to_millis),
            ppa.version(),
        ],
    )
    .map_err(|err| crate::repo::map_unique_violation(err, "ppa", &id))?;

    write_assignment_links(conn, &id, ppa)?;
    write_students(conn, &id, ppa.students())?;
    Ok(())
}

/// Writes every mutable column behind the version guard.
///
/// With `require_uncontinued`, the stored row must not have a successor yet.
fn update_ppa_rows(conn: &Connection, ppa: &Ppa, require_uncontinued: bool) -> RepoResult<u32> {
    let id = ppa.id().to_string();
    let expected = ppa.version();
    let next = expected + 1;
    let guard = if require_uncontinued {
        " AND continued_by_ppa_id IS NULL"
    } else {
        ""
    };

    let changed = conn.execute(
        &format!(
            "UPDATE ppas
             SET
                title = ?2,
                general_objective = ?3,
                specific_objectives = ?4,
                description = ?5,
                status = ?6,
                primary_teacher_id = ?7,
                continued_by_ppa_id = ?8,
                updated_at = ?9,
                version = ?10
             WHERE id = ?1
               AND version = ?11{guard};"
        ),
        params![
            id,
            ppa.title(),
            ppa.general_objective(),
            ppa.specific_objectives(),
            ppa.description(),
            status_to_db(ppa.status()),
            ppa.primary_teacher_id().to_string(),
            ppa.continued_by_ppa_id().map(|value| value.to_string()),
            ppa.updated_at().map(to_millis),
            next,
            expected,
        ],
    )?;

    if changed == 0 {
        return Err(classify_missed_update(conn, ppa, require_uncontinued)?);
    }

    conn.execute(
        "DELETE FROM ppa_teacher_assignments WHERE ppa_id = ?1;",
        [id.as_str()],
    )?;
    write_assignment_links(conn, &id, ppa)?;
    conn.execute("DELETE FROM ppa_students WHERE ppa_id = ?1;", [id.as_str()])?;
    write_students(conn, &id, ppa.students())?;

    Ok(next)
}

fn classify_missed_update(
    conn: &Connection,
    ppa: &Ppa,
    require_uncontinued: bool,
) -> RepoResult<RepoError> {
    let stored: Option<(u32, Option<String>)> = conn
        .query_row(
            "SELECT version, continued_by_ppa_id FROM ppas WHERE id = ?1;",
            [ppa.id().to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match stored {
        None => RepoError::not_found("ppa", ppa.id()),
        Some((_, Some(_))) if require_uncontinued => RepoError::AlreadyContinued(ppa.id()),
        Some(_) => RepoError::VersionConflict {
            entity: "ppa",
            id: ppa.id().to_string(),
            expected: ppa.version(),
        },
    })
}

/// Rejects `ppa` when another active PPA in its period holds exactly its
/// assignment set. Inactive PPAs and empty sets never collide.
fn ensure_unoccupied(conn: &Connection, ppa: &Ppa) -> RepoResult<()> {
    if !ppa.status().is_active() || ppa.teacher_assignment_ids().is_empty() {
        return Ok(());
    }
    let period = ppa.academic_period_id();
    match find_occupant(conn, period, ppa.teacher_assignment_ids(), ppa.id())? {
        Some(occupant) => Err(RepoError::AssignmentSetOccupied { period, occupant }),
        None => Ok(()),
    }
}

/// Oldest active PPA in `period`, other than `exclude`, whose links equal
/// `assignments`.
///
/// Links are unique per PPA, so matching both the link count and the number
/// of links inside `assignments` means the sets are equal.
fn find_occupant(
    conn: &Connection,
    period: AcademicPeriodId,
    assignments: &BTreeSet<TeacherAssignmentId>,
    exclude: PpaId,
) -> RepoResult<Option<PpaId>> {
    let active: Vec<i64> = PpaStatus::ALL
        .into_iter()
        .filter(|status| status.is_active())
        .map(status_to_db)
        .collect();
    let status_placeholders = vec!["?"; active.len()].join(", ");
    let id_placeholders = vec!["?"; assignments.len()].join(", ");
    let size = i64::try_from(assignments.len()).unwrap_or(i64::MAX);

    let mut bind_values = vec![
        Value::Text(period.to_string()),
        Value::Text(exclude.to_string()),
    ];
    bind_values.extend(active.into_iter().map(Value::Integer));
    bind_values.push(Value::Integer(size));
    bind_values.extend(assignments.iter().map(|id| Value::Text(id.to_string())));
    bind_values.push(Value::Integer(size));

    let occupant: Option<String> = conn
        .query_row(
            &format!(
                "SELECT p.id
                 FROM ppas p
                 JOIN ppa_teacher_assignments pta ON pta.ppa_id = p.id
                 WHERE p.academic_period_id = ?
                   AND p.id <> ?
                   AND p.status IN ({status_placeholders})
                 GROUP BY p.id
                 HAVING COUNT(*) = ?
                    AND SUM(pta.teacher_assignment_id IN ({id_placeholders})) = ?
                 ORDER BY p.created_at ASC, p.id ASC
                 LIMIT 1;"
            ),
            params_from_iter(bind_values),
            |row| row.get(0),
        )
        .optional()?;

    occupant
        .map(|id| parse_uuid(&id, "ppas.id"))
        .transpose()
}

fn write_assignment_links(conn: &Connection, ppa_id: &str, ppa: &Ppa) -> RepoResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO ppa_teacher_assignments (ppa_id, teacher_assignment_id) VALUES (?1, ?2);",
    )?;
    for assignment_id in ppa.teacher_assignment_ids() {
        stmt.execute(params![ppa_id, assignment_id.to_string()])?;
    }
    Ok(())
}

fn write_students(conn: &Connection, ppa_id: &str, students: &[PpaStudent]) -> RepoResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO ppa_students (id, ppa_id, name, position) VALUES (?1, ?2, ?3, ?4);",
    )?;
    for (position, student) in students.iter().enumerate() {
        stmt.execute(params![
            student.id.to_string(),
            ppa_id,
            student.name.as_str(),
            position as i64,
        ])
        .map_err(|err| crate::repo::map_unique_violation(err, "student", &student.name))?;
    }
    Ok(())
}

fn load_assignment_ids(conn: &Connection, ppa_id: &str) -> RepoResult<Vec<TeacherAssignmentId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT teacher_assignment_id
         FROM ppa_teacher_assignments
         WHERE ppa_id = ?1
         ORDER BY teacher_assignment_id ASC;",
    )?;
    let mut rows = stmt.query([ppa_id])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(
            &value,
            "ppa_teacher_assignments.teacher_assignment_id",
        )?);
    }
    Ok(ids)
}

fn load_students(conn: &Connection, ppa_id: &str) -> RepoResult<Vec<PpaStudent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, ppa_id, name
         FROM ppa_students
         WHERE ppa_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([ppa_id])?;
    let mut students = Vec::new();
    while let Some(row) = rows.next()? {
        students.push(PpaStudent {
            id: parse_uuid(&row.get::<_, String>("id")?, "ppa_students.id")?,
            ppa_id: parse_uuid(&row.get::<_, String>("ppa_id")?, "ppa_students.ppa_id")?,
            name: row.get("name")?,
        });
    }
    Ok(students)
}

fn load_ppa(conn: &Connection, row: &Row<'_>) -> RepoResult<Ppa> {
    let id_text: String = row.get("id")?;
    let parts = PpaParts {
        id: parse_uuid(&id_text, "ppas.id")?,
        title: row.get("title")?,
        general_objective: row.get("general_objective")?,
        specific_objectives: row.get("specific_objectives")?,
        description: row.get("description")?,
        status: parse_status_column(row)?,
        academic_period_id: parse_uuid(
            &row.get::<_, String>("academic_period_id")?,
            "ppas.academic_period_id",
        )?,
        primary_teacher_id: parse_uuid(
            &row.get::<_, String>("primary_teacher_id")?,
            "ppas.primary_teacher_id",
        )?,
        teacher_assignment_ids: load_assignment_ids(conn, &id_text)?,
        students: load_students(conn, &id_text)?,
        continuation_of_ppa_id: parse_optional_uuid(
            row.get("continuation_of_ppa_id")?,
            "ppas.continuation_of_ppa_id",
        )?,
        continued_by_ppa_id: parse_optional_uuid(
            row.get("continued_by_ppa_id")?,
            "ppas.continued_by_ppa_id",
        )?,
        created_at: from_millis(row.get("created_at")?, "ppas.created_at")?,
        updated_at: row
            .get::<_, Option<i64>>("updated_at")?
            .map(|value| from_millis(value, "ppas.updated_at"))
            .transpose()?,
        version: row.get("version")?,
    };
    Ok(Ppa::reconstruct(parts)?)
}

fn parse_summary_row(row: &Row<'_>) -> RepoResult<PpaSummary> {
    Ok(PpaSummary {
        id: parse_uuid(&row.get::<_, String>("id")?, "ppas.id")?,
        title: row.get("title")?,
        status: parse_status_column(row)?,
        academic_period_id: parse_uuid(
            &row.get::<_, String>("academic_period_id")?,
            "ppas.academic_period_id",
        )?,
        primary_teacher_id: parse_uuid(
            &row.get::<_, String>("primary_teacher_id")?,
            "ppas.primary_teacher_id",
        )?,
        continuation_of_ppa_id: parse_optional_uuid(
            row.get("continuation_of_ppa_id")?,
            "ppas.continuation_of_ppa_id",
        )?,
        continued_by_ppa_id: parse_optional_uuid(
            row.get("continued_by_ppa_id")?,
            "ppas.continued_by_ppa_id",
        )?,
        created_at: from_millis(row.get("created_at")?, "ppas.created_at")?,
        updated_at: row
            .get::<_, Option<i64>>("updated_at")?
            .map(|value| from_millis(value, "ppas.updated_at"))
            .transpose()?,
    })
}

fn parse_status_column(row: &Row<'_>) -> RepoResult<PpaStatus> {
    let value: i64 = row.get("status")?;
    parse_status(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid status `{value}` in ppas.status")))
}

fn status_to_db(status: PpaStatus) -> i64 {
    match status {
        PpaStatus::Proposal => 0,
        PpaStatus::InProgress => 1,
        PpaStatus::Completed => 2,
        PpaStatus::Archived => 3,
        PpaStatus::InContinuing => 4,
    }
}

fn parse_status(value: i64) -> Option<PpaStatus> {
    match value {
        0 => Some(PpaStatus::Proposal),
        1 => Some(PpaStatus::InProgress),
        2 => Some(PpaStatus::Completed),
        3 => Some(PpaStatus::Archived),
        4 => Some(PpaStatus::InContinuing),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        escape_like, find_occupant, normalize_ppa_limit, parse_status, status_to_db,
        PpaRepository, SqlitePpaRepository,
    };
    use crate::db::open_db_in_memory;
    use crate::model::ppa::{Ppa, PpaDraft, PpaStatus};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    #[test]
    fn status_codes_are_stable() {
        let codes: Vec<i64> = PpaStatus::ALL.into_iter().map(status_to_db).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4]);
        for status in PpaStatus::ALL {
            assert_eq!(parse_status(status_to_db(status)), Some(status));
        }
        assert_eq!(parse_status(5), None);
    }

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(normalize_ppa_limit(None), 20);
        assert_eq!(normalize_ppa_limit(Some(0)), 20);
        assert_eq!(normalize_ppa_limit(Some(7)), 7);
        assert_eq!(normalize_ppa_limit(Some(500)), 100);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    #[test]
    fn occupant_must_hold_exactly_the_same_set() {
        let conn = open_db_in_memory().expect("db");
        let repo = SqlitePpaRepository::try_new(&conn).expect("repo");
        let period = Uuid::new_v4();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (holder, _) = Ppa::create(
            PpaDraft::new("Holder", period, Uuid::new_v4()).with_assignments([a, b]),
        )
        .expect("valid draft");
        repo.insert_ppa(&holder, &[]).expect("insert");

        let set = |ids: &[Uuid]| ids.iter().copied().collect::<BTreeSet<_>>();
        let other = Uuid::new_v4();
        let lookup = |period, ids: &[Uuid], exclude| {
            find_occupant(&conn, period, &set(ids), exclude).expect("query")
        };

        assert_eq!(lookup(period, &[b, a], other), Some(holder.id()));
        assert_eq!(lookup(period, &[a], other), None);
        assert_eq!(lookup(period, &[a, b, c], other), None);
        assert_eq!(lookup(period, &[a, c], other), None);
        assert_eq!(lookup(Uuid::new_v4(), &[a, b], other), None);
        assert_eq!(lookup(period, &[a, b], holder.id()), None);

        let mut archived = holder.clone();
        archived
            .change_status(PpaStatus::Archived)
            .expect("archive");
        repo.update_ppa(&archived, &[]).expect("update");
        assert_eq!(lookup(period, &[a, b], other), None);
    }
}
