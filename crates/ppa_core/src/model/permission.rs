//! Capability tokens and role bundles.
//!
//! # Responsibility
//! - Validate `module.action` permission codes once, at construction.
//! - Aggregate permissions into roles and users.
//!
//! # Invariants
//! - A `Permission` always holds exactly one `.` between two non-empty tokens.
//! - Role identity and code never change after creation.
//! - System roles are flagged so persistence can refuse to delete them.

use crate::model::error::{require_text, DomainError, DomainResult};
use crate::model::ppa::UserId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static PERMISSION_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^.\s]+\.[^.\s]+$").expect("permission code pattern must compile")
});

pub const PERMISSION_PPA_VIEW: &str = "ppa.view";
pub const PERMISSION_PPA_CREATE: &str = "ppa.create";
pub const PERMISSION_PPA_UPDATE: &str = "ppa.update";
pub const PERMISSION_PPA_CHANGE_STATUS: &str = "ppa.change_status";
pub const PERMISSION_PPA_CONTINUE: &str = "ppa.continue";
pub const PERMISSION_PPA_UPLOAD_ATTACHMENT: &str = "ppa.upload_attachment";
pub const PERMISSION_PPA_DELETE_ATTACHMENT: &str = "ppa.delete_attachment";
pub const PERMISSION_PPA_VIEW_HISTORY: &str = "ppa.view_history";
pub const PERMISSION_ROLES_MANAGE: &str = "roles.manage";

const ALL_PERMISSION_CODES: &[&str] = &[
    PERMISSION_PPA_VIEW,
    PERMISSION_PPA_CREATE,
    PERMISSION_PPA_UPDATE,
    PERMISSION_PPA_CHANGE_STATUS,
    PERMISSION_PPA_CONTINUE,
    PERMISSION_PPA_UPLOAD_ATTACHMENT,
    PERMISSION_PPA_DELETE_ATTACHMENT,
    PERMISSION_PPA_VIEW_HISTORY,
    PERMISSION_ROLES_MANAGE,
];

/// Returns every permission code known to the core.
pub fn known_permission_codes() -> &'static [&'static str] {
    ALL_PERMISSION_CODES
}

/// Immutable `module.action` capability token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

impl Permission {
    /// Parses and validates a permission code.
    ///
    /// Surrounding whitespace is ignored; anything else that is not exactly
    /// `module.action` fails with `DomainError::PermissionFormat`.
    pub fn parse(code: &str) -> DomainResult<Self> {
        let trimmed = code.trim();
        if !PERMISSION_CODE.is_match(trimmed) {
            return Err(DomainError::PermissionFormat {
                code: code.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn module(&self) -> &str {
        self.split().0
    }

    pub fn action(&self) -> &str {
        self.split().1
    }

    fn split(&self) -> (&str, &str) {
        // Construction guarantees the separator.
        self.0.split_once('.').unwrap_or((self.0.as_str(), ""))
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Permission {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Permission {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.0
    }
}

// Lets permission sets be queried by code without parsing.
impl Borrow<str> for Permission {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Anything a permission membership test can be run against.
pub trait PermissionRef {
    fn permission_code(&self) -> &str;
}

impl PermissionRef for Permission {
    fn permission_code(&self) -> &str {
        self.as_str()
    }
}

impl PermissionRef for &Permission {
    fn permission_code(&self) -> &str {
        self.as_str()
    }
}

impl PermissionRef for &str {
    fn permission_code(&self) -> &str {
        self.trim()
    }
}

impl PermissionRef for String {
    fn permission_code(&self) -> &str {
        self.trim()
    }
}

/// Named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: i64,
    code: String,
    name: String,
    description: Option<String>,
    is_system: bool,
    permissions: BTreeSet<Permission>,
}

impl Role {
    /// Builds a role; `code` and `name` are trimmed and must not be blank.
    pub fn new(
        id: i64,
        code: &str,
        name: &str,
        description: Option<&str>,
        is_system: bool,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            code: require_text("role code", code)?,
            name: require_text("role name", name)?,
            description: description
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            is_system,
            permissions: permissions.into_iter().collect(),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_system(&self) -> bool {
        self.is_system
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    /// Returns a copy carrying the persisted identity.
    pub(crate) fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn has_permission(&self, permission: impl PermissionRef) -> bool {
        self.permissions.contains(permission.permission_code())
    }

    /// True when every listed permission is held. Vacuously true for no input.
    pub fn has_all_permissions<P: PermissionRef>(
        &self,
        permissions: impl IntoIterator<Item = P>,
    ) -> bool {
        permissions
            .into_iter()
            .all(|permission| self.has_permission(permission))
    }

    /// True when at least one listed permission is held.
    pub fn has_any_permission<P: PermissionRef>(
        &self,
        permissions: impl IntoIterator<Item = P>,
    ) -> bool {
        permissions
            .into_iter()
            .any(|permission| self.has_permission(permission))
    }

    /// Adds a permission. Returns `false` when it was already present.
    pub fn grant(&mut self, permission: Permission) -> bool {
        self.permissions.insert(permission)
    }

    /// Removes a permission. Returns `false` when it was absent.
    pub fn revoke(&mut self, permission: &Permission) -> bool {
        self.permissions.remove(permission)
    }
}

/// Authenticated principal as seen by the core: an id and its roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    roles: Vec<Role>,
}

impl User {
    pub fn new(id: UserId, roles: Vec<Role>) -> Self {
        Self { id, roles }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn has_role(&self, code: &str) -> bool {
        self.roles.iter().any(|role| role.code() == code)
    }

    pub fn has_permission(&self, permission: impl PermissionRef) -> bool {
        let code = permission.permission_code();
        self.roles.iter().any(|role| role.has_permission(code))
    }

    /// Union of permissions across all roles.
    pub fn all_permissions(&self) -> BTreeSet<Permission> {
        self.roles
            .iter()
            .flat_map(|role| role.permissions().iter().cloned())
            .collect()
    }
}

/// Built-in roles seeded into a fresh catalog.
pub fn system_roles() -> Vec<Role> {
    let seed: [(&str, &str, &str, &[&str]); 3] = [
        ("admin", "Administrator", "Full access", ALL_PERMISSION_CODES),
        (
            "coordinator",
            "Coordinator",
            "Manages PPA life cycle across periods",
            &[
                PERMISSION_PPA_VIEW,
                PERMISSION_PPA_CREATE,
                PERMISSION_PPA_UPDATE,
                PERMISSION_PPA_CHANGE_STATUS,
                PERMISSION_PPA_CONTINUE,
                PERMISSION_PPA_UPLOAD_ATTACHMENT,
                PERMISSION_PPA_DELETE_ATTACHMENT,
                PERMISSION_PPA_VIEW_HISTORY,
            ],
        ),
        (
            "teacher",
            "Teacher",
            "Works on own PPA records",
            &[
                PERMISSION_PPA_VIEW,
                PERMISSION_PPA_UPDATE,
                PERMISSION_PPA_UPLOAD_ATTACHMENT,
                PERMISSION_PPA_VIEW_HISTORY,
            ],
        ),
    ];

    seed.iter()
        .map(|(code, name, description, codes)| Role {
            id: 0,
            code: (*code).to_string(),
            name: (*name).to_string(),
            description: Some((*description).to_string()),
            is_system: true,
            permissions: codes
                .iter()
                .map(|value| Permission((*value).to_string()))
                .collect(),
        })
        .collect()
}
