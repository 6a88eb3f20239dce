//! Access control types
//!
//! Core types used by the access control system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource type that matches any type
pub const WILDCARD_RESOURCE_TYPE: &str = "*";

/// Resource id that matches any id within a matched type
pub const WILDCARD_RESOURCE_ID: u64 = 0;

/// Type name of groups, both as a member type and as a rule resource type
pub const GROUP_TYPE_NAME: &str = "Group";

/// Type name of users
pub const USER_TYPE_NAME: &str = "User";

/// Identifier of a user
pub type UserId = u64;

/// Identifier of a group
pub type GroupId = u64;

/// Permission level of an accessor within a scope
///
/// Levels are totally ordered; holding a level implies holding every lower
/// level. `None` is what an accessor without a membership row resolves to and
/// satisfies no rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    #[default]
    None = 0,
    Everyone = 10,
    Viewer = 17,
    Editor = 18,
    Admin = 19,
    Owner = 20,
}

impl PermissionLevel {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::Everyone => "everyone",
            PermissionLevel::Viewer => "viewer",
            PermissionLevel::Editor => "editor",
            PermissionLevel::Admin => "admin",
            PermissionLevel::Owner => "owner",
        }
    }

    /// Whether an accessor at this level satisfies a rule requiring `required`
    pub fn satisfies(self, required: PermissionLevel) -> bool {
        self >= required
    }
}

impl TryFrom<u8> for PermissionLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PermissionLevel::None),
            10 => Ok(PermissionLevel::Everyone),
            17 => Ok(PermissionLevel::Viewer),
            18 => Ok(PermissionLevel::Editor),
            19 => Ok(PermissionLevel::Admin),
            20 => Ok(PermissionLevel::Owner),
            other => Err(other),
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.as_u8())
    }
}

/// Action performed on a resource
///
/// Actions are open strings; the common ones have constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
    pub const READ: &'static str = "read";
    pub const WRITE: &'static str = "write";
    pub const CREATE: &'static str = "create";
    pub const UPDATE: &'static str = "update";
    pub const DELETE: &'static str = "delete";
    pub const WILDCARD: &'static str = "*";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn read() -> Self {
        Self::new(Self::READ)
    }

    pub fn write() -> Self {
        Self::new(Self::WRITE)
    }

    pub fn create() -> Self {
        Self::new(Self::CREATE)
    }

    pub fn update() -> Self {
        Self::new(Self::UPDATE)
    }

    pub fn delete() -> Self {
        Self::new(Self::DELETE)
    }

    pub fn wildcard() -> Self {
        Self::new(Self::WILDCARD)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of tenant boundary a scope refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    /// Not bound to any tenant; used by globally seeded rules
    #[default]
    Global,
    Account,
    Project,
}

impl ScopeType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Global => "global",
            ScopeType::Account => "account",
            ScopeType::Project => "project",
        }
    }

    pub fn try_parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(ScopeType::Global),
            "account" => Some(ScopeType::Account),
            "project" => Some(ScopeType::Project),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant boundary a rule or permission level applies within
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope {
    pub scope_type: ScopeType,
    pub scope_id: u64,
}

impl Scope {
    pub const fn new(scope_type: ScopeType, scope_id: u64) -> Self {
        Self {
            scope_type,
            scope_id,
        }
    }

    pub const fn global() -> Self {
        Self::new(ScopeType::Global, 0)
    }

    pub const fn account(id: u64) -> Self {
        Self::new(ScopeType::Account, id)
    }

    pub const fn project(id: u64) -> Self {
        Self::new(ScopeType::Project, id)
    }

    pub fn is_global(&self) -> bool {
        self.scope_type == ScopeType::Global
    }

    /// A global scope carries no id, a tenant scope always does
    pub fn is_consistent(&self) -> bool {
        match self.scope_type {
            ScopeType::Global => self.scope_id == 0,
            _ => self.scope_id != 0,
        }
    }

    /// Whether a rule bound to this scope applies to something inside `target`
    pub fn covers(&self, target: &Scope) -> bool {
        self.is_global() || self == target
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            f.write_str("global")
        } else {
            write!(f, "{}:{}", self.scope_type, self.scope_id)
        }
    }
}

/// Anything that can be a member of a group
pub trait Entity: Send + Sync {
    fn id(&self) -> u64;

    fn type_name(&self) -> &str;
}

/// Anything access can be decided on
pub trait Resource: Entity {
    /// Owning user, if the resource has one
    fn owner_user_id(&self) -> Option<UserId>;

    /// Tenant boundary the resource lives in
    fn scope(&self) -> Scope;

    /// Short label for logs and error messages
    fn label(&self) -> String {
        format!("{}#{}", self.type_name(), self.id())
    }
}
