//! Storage collaborators
//!
//! The engine does not own persistence. It reads four relations through the
//! [`AccessStore`] trait, using equality and membership filters only:
//!
//! - `role_access(resource_type, resource_id, action, level, scope_type, scope_id)`
//! - `group(id, name, member_type)`
//! - `group_member(group_id, member_type, member_id)`
//! - `permission(user_id, scope) -> level`
//!
//! [`MemoryStore`] is the in-process implementation used by the CLI and the
//! tests, and [`Seeder`] fills any store from a seed file.

pub mod memory;
pub mod seed;

pub use memory::MemoryStore;
pub use seed::{SeedData, SeedReport, Seeder};

use crate::access_control::rules::{RoleAccess, RuleKey};
use crate::access_control::types::{GroupId, PermissionLevel, Scope, UserId};
use crate::error::StoreResult;
use crate::model::{Group, GroupMember};
// async_trait required for dyn-compatibility with Arc<dyn AccessStore>
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Read-only query interface over the access relations
///
/// Every call receives the caller's cancellation token. Implementations must
/// return [`StoreError::Cancelled`](crate::error::StoreError::Cancelled) once
/// it fires and [`StoreError::Unavailable`](crate::error::StoreError::Unavailable)
/// when the backend fails; they must never turn a failure into an empty result.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Rule rows whose `(resource_type, resource_id, action)` equal `key`, in id order
    ///
    /// Scope is not filtered here; the rule store decides which scopes apply.
    async fn role_accesses(
        &self,
        key: &RuleKey,
        ct: &CancellationToken,
    ) -> StoreResult<Vec<RoleAccess>>;

    /// Edges with the given member, i.e. the groups that directly contain it
    async fn memberships_of(
        &self,
        member_type: &str,
        member_id: u64,
        ct: &CancellationToken,
    ) -> StoreResult<Vec<GroupMember>>;

    /// Groups whose id is in `ids`; unknown ids are left out
    async fn groups(&self, ids: &[GroupId], ct: &CancellationToken) -> StoreResult<Vec<Group>>;

    /// Recorded level of `user_id` within `scope`, if any
    async fn permission_level(
        &self,
        user_id: UserId,
        scope: &Scope,
        ct: &CancellationToken,
    ) -> StoreResult<Option<PermissionLevel>>;
}

/// Shared handle to a store
pub type SharedStore = Arc<dyn AccessStore>;
