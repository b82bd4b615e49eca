//! Role catalog use-cases.
//!
//! # Responsibility
//! - Seed built-in roles once.
//! - Grant and revoke permissions by code.

use crate::model::permission::{system_roles, Permission, Role};
use crate::repo::role_repo::RoleRepository;
use crate::repo::{RepoError, RepoResult};
use log::info;

pub struct RoleService<R: RoleRepository> {
    repo: R,
}

impl<R: RoleRepository> RoleService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Inserts missing system roles. Existing codes are left untouched.
    ///
    /// Returns how many roles were created.
    pub fn seed_system_roles(&self) -> RepoResult<usize> {
        let mut created = 0;
        for role in system_roles() {
            if self.repo.get_role_by_code(role.code())?.is_none() {
                self.repo.create_role(&role)?;
                created += 1;
            }
        }
        info!("event=roles_seed module=service status=ok created={created}");
        Ok(created)
    }

    pub fn create_role(
        &self,
        code: &str,
        name: &str,
        description: Option<&str>,
        permissions: &[&str],
    ) -> RepoResult<Role> {
        let permissions = permissions
            .iter()
            .map(|code| Permission::parse(code))
            .collect::<Result<Vec<_>, _>>()?;
        let role = Role::new(0, code, name, description, false, permissions)?;
        let created = self.repo.create_role(&role)?;
        info!(
            "event=role_create module=service status=ok role_id={}",
            created.id()
        );
        Ok(created)
    }

    pub fn list_roles(&self) -> RepoResult<Vec<Role>> {
        self.repo.list_roles()
    }

    /// Adds `permission` to the role. Returns the saved role.
    pub fn grant(&self, role_id: i64, permission: &str) -> RepoResult<Role> {
        let permission = Permission::parse(permission)?;
        let mut role = self.load(role_id)?;
        if role.grant(permission) {
            self.repo.save_permissions(&role)?;
            info!("event=role_grant module=service status=ok role_id={role_id}");
        }
        Ok(role)
    }

    /// Removes `permission` from the role. Returns the saved role.
    pub fn revoke(&self, role_id: i64, permission: &str) -> RepoResult<Role> {
        let permission = Permission::parse(permission)?;
        let mut role = self.load(role_id)?;
        if role.revoke(&permission) {
            self.repo.save_permissions(&role)?;
            info!("event=role_revoke module=service status=ok role_id={role_id}");
        }
        Ok(role)
    }

    pub fn delete_role(&self, role_id: i64) -> RepoResult<()> {
        self.repo.delete_role(role_id)?;
        info!("event=role_delete module=service status=ok role_id={role_id}");
        Ok(())
    }

    fn load(&self, role_id: i64) -> RepoResult<Role> {
        self.repo
            .get_role(role_id)?
            .ok_or_else(|| RepoError::not_found("role", role_id))
    }
}
