//! Domain records the engine reads
//!
//! Every resource kind implements [`Resource`] directly; there is no runtime
//! type inspection. Rows that only describe relations (group edges, project
//! memberships) are plain serde records.

use crate::access_control::types::{
    Entity, GROUP_TYPE_NAME, GroupId, PermissionLevel, Resource, Scope, USER_TYPE_NAME, UserId,
};
use serde::{Deserialize, Serialize};

/// The accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
}

impl User {
    pub const fn new(id: UserId) -> Self {
        Self { id }
    }
}

impl Entity for User {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &str {
        USER_TYPE_NAME
    }
}

/// Tenant root; owns projects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub name: String,
    pub owner_user_id: UserId,
}

impl Entity for Account {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &str {
        "Account"
    }
}

impl Resource for Account {
    fn owner_user_id(&self) -> Option<UserId> {
        Some(self.owner_user_id)
    }

    fn scope(&self) -> Scope {
        Scope::account(self.id)
    }
}

/// A container of resources shared among users of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub account_id: u64,
    pub owner_user_id: UserId,
}

impl Entity for Project {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &str {
        "Project"
    }
}

impl Resource for Project {
    fn owner_user_id(&self) -> Option<UserId> {
        Some(self.owner_user_id)
    }

    // Membership levels for a project are recorded against the project itself.
    fn scope(&self) -> Scope {
        Scope::project(self.id)
    }
}

/// Per-user profile; lives in the owner's account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    pub account_id: u64,
    pub owner_user_id: UserId,
}

impl Entity for Profile {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &str {
        "Profile"
    }
}

impl Resource for Profile {
    fn owner_user_id(&self) -> Option<UserId> {
        Some(self.owner_user_id)
    }

    fn scope(&self) -> Scope {
        Scope::account(self.account_id)
    }
}

/// A named collection of entities or other groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Type name of the entities this group is meant to collect
    pub member_type: String,
    #[serde(default)]
    pub owner_user_id: Option<UserId>,
    #[serde(default)]
    pub scope: Scope,
}

impl Group {
    pub fn new(id: GroupId, name: impl Into<String>, member_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            member_type: member_type.into(),
            owner_user_id: None,
            scope: Scope::global(),
        }
    }

    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner_user_id = Some(owner);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

impl Entity for Group {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &str {
        GROUP_TYPE_NAME
    }
}

impl Resource for Group {
    fn owner_user_id(&self) -> Option<UserId> {
        self.owner_user_id
    }

    fn scope(&self) -> Scope {
        self.scope
    }
}

/// Membership edge: `member` belongs to `group_id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: GroupId,
    pub member_type: String,
    pub member_id: u64,
}

impl GroupMember {
    pub fn new(group_id: GroupId, member_type: impl Into<String>, member_id: u64) -> Self {
        Self {
            group_id,
            member_type: member_type.into(),
            member_id,
        }
    }

    /// Edge nesting one group inside another
    pub fn nested(parent: GroupId, child: GroupId) -> Self {
        Self::new(parent, GROUP_TYPE_NAME, child)
    }

    pub fn user(group_id: GroupId, user_id: UserId) -> Self {
        Self::new(group_id, USER_TYPE_NAME, user_id)
    }

    pub fn is_group_edge(&self) -> bool {
        self.member_type == GROUP_TYPE_NAME
    }
}

/// A user's permission level within a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPermission {
    pub user_id: UserId,
    pub scope: Scope,
    pub level: PermissionLevel,
}

impl ProjectPermission {
    pub fn new(user_id: UserId, scope: Scope, level: PermissionLevel) -> Self {
        Self {
            user_id,
            scope,
            level,
        }
    }
}

/// A resource described only by its access metadata
///
/// Used where the concrete record is not at hand, such as the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub type_name: String,
    pub id: u64,
    #[serde(default)]
    pub owner_user_id: Option<UserId>,
    #[serde(default)]
    pub scope: Scope,
}

impl ResourceRef {
    pub fn new(type_name: impl Into<String>, id: u64, scope: Scope) -> Self {
        Self {
            type_name: type_name.into(),
            id,
            owner_user_id: None,
            scope,
        }
    }

    pub fn owned_by(mut self, owner: UserId) -> Self {
        self.owner_user_id = Some(owner);
        self
    }
}

impl Entity for ResourceRef {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl Resource for ResourceRef {
    fn owner_user_id(&self) -> Option<UserId> {
        self.owner_user_id
    }

    fn scope(&self) -> Scope {
        self.scope
    }
}
