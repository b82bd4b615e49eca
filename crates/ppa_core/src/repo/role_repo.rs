//! Role catalog persistence.
//!
//! # Responsibility
//! - Store roles and their permission sets.
//! - Refuse to delete built-in (system) roles.
//!
//! # Invariants
//! - Role codes are unique.
//! - `save_permissions` replaces the stored set atomically.

use crate::db::migrations::ensure_current;
use crate::model::permission::{Permission, Role};
use crate::repo::{bool_to_int, int_to_bool, map_unique_violation, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

/// Repository interface for roles.
pub trait RoleRepository {
    /// Inserts `role` and returns it with the assigned id.
    fn create_role(&self, role: &Role) -> RepoResult<Role>;
    fn get_role(&self, id: i64) -> RepoResult<Option<Role>>;
    fn get_role_by_code(&self, code: &str) -> RepoResult<Option<Role>>;
    /// Lists roles ordered by code.
    fn list_roles(&self) -> RepoResult<Vec<Role>>;
    /// Replaces the stored permission set of `role`.
    fn save_permissions(&self, role: &Role) -> RepoResult<()>;
    fn delete_role(&self, id: i64) -> RepoResult<()>;
}

/// SQLite-backed role catalog.
pub struct SqliteRoleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRoleRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_current(conn)?;
        Ok(Self { conn })
    }

    fn load(&self, filter: &str, value: &dyn rusqlite::ToSql) -> RepoResult<Option<Role>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, code, name, description, is_system FROM roles WHERE {filter} = ?1;"
        ))?;
        let mut rows = stmt.query([value])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_role_row(self.conn, row)?)),
            None => Ok(None),
        }
    }
}

impl RoleRepository for SqliteRoleRepository<'_> {
    fn create_role(&self, role: &Role) -> RepoResult<Role> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO roles (code, name, description, is_system) VALUES (?1, ?2, ?3, ?4);",
            params![
                role.code(),
                role.name(),
                role.description(),
                bool_to_int(role.is_system()),
            ],
        )
        .map_err(|err| map_unique_violation(err, "role", role.code()))?;
        let id = tx.last_insert_rowid();
        write_permissions(&tx, id, role)?;
        tx.commit()?;
        Ok(role.clone().with_id(id))
    }

    fn get_role(&self, id: i64) -> RepoResult<Option<Role>> {
        self.load("id", &id)
    }

    fn get_role_by_code(&self, code: &str) -> RepoResult<Option<Role>> {
        self.load("code", &code.trim())
    }

    fn list_roles(&self) -> RepoResult<Vec<Role>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, code, name, description, is_system FROM roles ORDER BY code ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut roles = Vec::new();
        while let Some(row) = rows.next()? {
            roles.push(parse_role_row(self.conn, row)?);
        }
        Ok(roles)
    }

    fn save_permissions(&self, role: &Role) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let exists = tx
            .query_row("SELECT 1 FROM roles WHERE id = ?1;", [role.id()], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if !exists {
            return Err(RepoError::not_found("role", role.id()));
        }
        tx.execute("DELETE FROM role_permissions WHERE role_id = ?1;", [role.id()])?;
        write_permissions(&tx, role.id(), role)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_role(&self, id: i64) -> RepoResult<()> {
        let stored: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT code, is_system FROM roles WHERE id = ?1;",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((code, is_system)) = stored else {
            return Err(RepoError::not_found("role", id));
        };
        if int_to_bool(is_system, "roles.is_system")? {
            return Err(RepoError::SystemRole(code));
        }
        self.conn
            .execute("DELETE FROM roles WHERE id = ?1;", [id])?;
        Ok(())
    }
}

fn write_permissions(conn: &Connection, role_id: i64, role: &Role) -> RepoResult<()> {
    let mut stmt = conn
        .prepare_cached("INSERT INTO role_permissions (role_id, permission) VALUES (?1, ?2);")?;
    for permission in role.permissions() {
        stmt.execute(params![role_id, permission.as_str()])?;
    }
    Ok(())
}

fn parse_role_row(conn: &Connection, row: &Row<'_>) -> RepoResult<Role> {
    let id: i64 = row.get("id")?;
    let code: String = row.get("code")?;
    let name: String = row.get("name")?;
    let description: Option<String> = row.get("description")?;
    let is_system = int_to_bool(row.get("is_system")?, "roles.is_system")?;

    let mut stmt = conn.prepare_cached(
        "SELECT permission FROM role_permissions WHERE role_id = ?1 ORDER BY permission ASC;",
    )?;
    let mut rows = stmt.query([id])?;
    let mut permissions = Vec::new();
    while let Some(perm_row) = rows.next()? {
        let code: String = perm_row.get(0)?;
        permissions.push(Permission::parse(&code).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid permission `{code}` in role_permissions.permission"
            ))
        })?);
    }

    Ok(Role::new(
        id,
        &code,
        &name,
        description.as_deref(),
        is_system,
        permissions,
    )?)
}
