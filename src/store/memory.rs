//! In-memory access store
//!
//! Thread-safe tables behind a single lock. Reads take the read lock, so
//! concurrent decisions never block each other.

use super::AccessStore;
use crate::access_control::rules::{RoleAccess, RuleKey, default_project_rules};
use crate::access_control::types::{GroupId, PermissionLevel, Scope, UserId};
use crate::error::{StoreError, StoreResult};
use crate::model::{Group, GroupMember, Project, ProjectPermission};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
struct Tables {
    rules: Vec<RoleAccess>,
    groups: BTreeMap<GroupId, Group>,
    members: Vec<GroupMember>,
    permissions: HashMap<(UserId, Scope), PermissionLevel>,
    next_rule_id: u64,
    next_group_id: GroupId,
}

/// Access store kept entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

fn check_cancelled(ct: &CancellationToken) -> StoreResult<()> {
    if ct.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Recover from poisoned locks; the tables hold no invariants a panicking
    // writer could have broken halfway.

    fn write_tables(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|poisoned| {
            tracing::warn!("store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|poisoned| {
            tracing::warn!("store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Insert a rule and return its assigned id
    pub fn insert_rule(&self, rule: RoleAccess) -> u64 {
        let mut tables = self.write_tables();
        tables.next_rule_id += 1;
        let id = tables.next_rule_id;
        tables.rules.push(RoleAccess {
            id,
            ..rule.normalized()
        });
        id
    }

    /// Insert a rule unless one with the same key and scope exists
    ///
    /// Returns the id of the new row, or `None` if it was already present.
    pub fn insert_rule_if_absent(&self, rule: RoleAccess) -> Option<u64> {
        let rule = rule.normalized();
        let mut tables = self.write_tables();
        let key = rule.key();
        if tables
            .rules
            .iter()
            .any(|existing| existing.key() == key && existing.scope == rule.scope)
        {
            return None;
        }
        tables.next_rule_id += 1;
        let id = tables.next_rule_id;
        tables.rules.push(RoleAccess { id, ..rule });
        Some(id)
    }

    /// Remove a rule by id
    pub fn delete_rule(&self, id: u64) -> bool {
        let mut tables = self.write_tables();
        let before = tables.rules.len();
        tables.rules.retain(|rule| rule.id != id);
        tables.rules.len() != before
    }

    /// Snapshot of every rule, in id order
    pub fn rules(&self) -> Vec<RoleAccess> {
        self.read_tables().rules.clone()
    }

    /// Create a group; an id of 0 is replaced by the next free id
    ///
    /// Fails once an explicit id of `u64::MAX` leaves no id to allocate.
    pub fn create_group(&self, mut group: Group) -> StoreResult<GroupId> {
        let mut tables = self.write_tables();
        if group.id == 0 {
            group.id = tables
                .next_group_id
                .checked_add(1)
                .ok_or(StoreError::IdsExhausted { table: "group" })?;
        }
        tables.next_group_id = tables.next_group_id.max(group.id);
        let id = group.id;
        tables.groups.insert(id, group);
        Ok(id)
    }

    /// Delete a group together with every edge that mentions it
    ///
    /// Edges where the group is the container and edges where it is a member
    /// are both removed, so no dangling edge can keep granting access.
    pub fn delete_group(&self, id: GroupId) -> bool {
        let mut tables = self.write_tables();
        let existed = tables.groups.remove(&id).is_some();
        let before = tables.members.len();
        tables
            .members
            .retain(|edge| edge.group_id != id && !(edge.is_group_edge() && edge.member_id == id));
        let removed = before - tables.members.len();
        if existed {
            debug!(group_id = id, removed_edges = removed, "Deleted group");
        }
        existed
    }

    /// Add a membership edge; returns false if it already existed
    pub fn add_member(&self, edge: GroupMember) -> bool {
        let mut tables = self.write_tables();
        if tables.members.contains(&edge) {
            return false;
        }
        tables.members.push(edge);
        true
    }

    /// Remove a membership edge
    pub fn remove_member(&self, edge: &GroupMember) -> bool {
        let mut tables = self.write_tables();
        let before = tables.members.len();
        tables.members.retain(|existing| existing != edge);
        tables.members.len() != before
    }

    /// Record a user's level within a scope, replacing any previous level
    pub fn set_permission(&self, permission: ProjectPermission) {
        self.write_tables()
            .permissions
            .insert((permission.user_id, permission.scope), permission.level);
    }

    pub fn remove_permission(&self, user_id: UserId, scope: &Scope) -> bool {
        self.write_tables()
            .permissions
            .remove(&(user_id, *scope))
            .is_some()
    }

    /// Register a project: installs its default rules
    pub fn create_project(&self, project: &Project) -> Vec<u64> {
        default_project_rules(project.id)
            .into_iter()
            .map(|rule| self.insert_rule(rule))
            .collect()
    }

    /// Forget a project: drops its membership rows and project-scoped rules
    pub fn remove_project(&self, project_id: u64) {
        let scope = Scope::project(project_id);
        let mut tables = self.write_tables();
        tables.permissions.retain(|(_, s), _| *s != scope);
        tables.rules.retain(|rule| rule.scope != scope);
    }

    pub fn rule_count(&self) -> usize {
        self.read_tables().rules.len()
    }

    pub fn group_count(&self) -> usize {
        self.read_tables().groups.len()
    }

    pub fn member_count(&self) -> usize {
        self.read_tables().members.len()
    }

    pub fn permission_count(&self) -> usize {
        self.read_tables().permissions.len()
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn role_accesses(
        &self,
        key: &RuleKey,
        ct: &CancellationToken,
    ) -> StoreResult<Vec<RoleAccess>> {
        check_cancelled(ct)?;
        Ok(self
            .read_tables()
            .rules
            .iter()
            .filter(|rule| rule.key() == *key)
            .cloned()
            .collect())
    }

    async fn memberships_of(
        &self,
        member_type: &str,
        member_id: u64,
        ct: &CancellationToken,
    ) -> StoreResult<Vec<GroupMember>> {
        check_cancelled(ct)?;
        Ok(self
            .read_tables()
            .members
            .iter()
            .filter(|edge| edge.member_type == member_type && edge.member_id == member_id)
            .cloned()
            .collect())
    }

    async fn groups(&self, ids: &[GroupId], ct: &CancellationToken) -> StoreResult<Vec<Group>> {
        check_cancelled(ct)?;
        let tables = self.read_tables();
        Ok(ids
            .iter()
            .filter_map(|id| tables.groups.get(id).cloned())
            .collect())
    }

    async fn permission_level(
        &self,
        user_id: UserId,
        scope: &Scope,
        ct: &CancellationToken,
    ) -> StoreResult<Option<PermissionLevel>> {
        check_cancelled(ct)?;
        Ok(self
            .read_tables()
            .permissions
            .get(&(user_id, *scope))
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_control::types::Action;

    #[tokio::test]
    async fn test_role_accesses_filters_by_key() {
        let store = MemoryStore::new();
        store.insert_rule(RoleAccess::new("Project", 0, "read", PermissionLevel::Viewer));
        store.insert_rule(RoleAccess::new("Project", 0, "update", PermissionLevel::Editor));

        let key = RuleKey {
            resource_type: "Project".to_string(),
            resource_id: 0,
            action: Action::read(),
        };
        let rows = store
            .role_accesses(&key, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_calls() {
        let store = MemoryStore::new();
        let ct = CancellationToken::new();
        ct.cancel();

        let result = store.groups(&[1], &ct).await;
        assert_eq!(result, Err(StoreError::Cancelled));
    }

    #[test]
    fn test_insert_rule_if_absent_is_idempotent() {
        let store = MemoryStore::new();
        let rule = RoleAccess::new("Project", 0, "read", PermissionLevel::Viewer);
        assert!(store.insert_rule_if_absent(rule.clone()).is_some());
        assert!(store.insert_rule_if_absent(rule.clone()).is_none());
        // Same key in another scope is a different row
        assert!(
            store
                .insert_rule_if_absent(rule.in_scope(Scope::project(2)))
                .is_some()
        );
        assert_eq!(store.rule_count(), 2);
    }

    #[test]
    fn test_create_group_assigns_ids() {
        let store = MemoryStore::new();
        let first = store.create_group(Group::new(0, "a", "User")).unwrap();
        let explicit = store.create_group(Group::new(10, "b", "User")).unwrap();
        let next = store.create_group(Group::new(0, "c", "User")).unwrap();
        assert_eq!(first, 1);
        assert_eq!(explicit, 10);
        assert_eq!(next, 11);
    }

    #[test]
    fn test_create_group_after_max_id_fails() {
        let store = MemoryStore::new();
        store.create_group(Group::new(5, "first", "User")).unwrap();
        assert_eq!(
            store.create_group(Group::new(u64::MAX, "last", "User")),
            Ok(u64::MAX)
        );

        let result = store.create_group(Group::new(0, "overflow", "User"));
        assert_eq!(result, Err(StoreError::IdsExhausted { table: "group" }));
        // Existing groups are untouched and explicit ids still work
        assert_eq!(store.group_count(), 2);
        assert_eq!(store.create_group(Group::new(7, "explicit", "User")), Ok(7));
    }

    #[test]
    fn test_delete_group_removes_edges_both_ways() {
        let store = MemoryStore::new();
        store.create_group(Group::new(1, "parent", "Group")).unwrap();
        store.create_group(Group::new(2, "child", "User")).unwrap();
        store.add_member(GroupMember::nested(1, 2));
        store.add_member(GroupMember::user(2, 7));
        assert_eq!(store.member_count(), 2);

        assert!(store.delete_group(2));
        assert_eq!(store.member_count(), 0);
        assert!(!store.delete_group(2));
    }

    #[test]
    fn test_add_member_deduplicates() {
        let store = MemoryStore::new();
        assert!(store.add_member(GroupMember::user(1, 7)));
        assert!(!store.add_member(GroupMember::user(1, 7)));
        assert!(store.remove_member(&GroupMember::user(1, 7)));
        assert_eq!(store.member_count(), 0);
    }

    #[test]
    fn test_project_lifecycle() {
        let store = MemoryStore::new();
        let project = Project {
            id: 4,
            name: "site".to_string(),
            account_id: 1,
            owner_user_id: 1,
        };
        assert_eq!(store.create_project(&project).len(), 1);
        store.set_permission(ProjectPermission::new(
            9,
            Scope::project(4),
            PermissionLevel::Editor,
        ));
        assert_eq!(store.permission_count(), 1);

        store.remove_project(4);
        assert_eq!(store.permission_count(), 0);
        assert_eq!(store.rule_count(), 0);
    }

    #[tokio::test]
    async fn test_removed_rows_are_no_longer_read() {
        let store = MemoryStore::new();
        let ct = CancellationToken::new();
        let scope = Scope::project(4);
        let id = store.insert_rule(RoleAccess::new("Project", 0, "read", PermissionLevel::Viewer));
        store.set_permission(ProjectPermission::new(9, scope, PermissionLevel::Editor));

        assert!(store.delete_rule(id));
        assert!(!store.delete_rule(id));
        assert!(store.remove_permission(9, &scope));

        let key = RoleAccess::new("Project", 0, "read", PermissionLevel::Viewer).key();
        assert!(store.role_accesses(&key, &ct).await.unwrap().is_empty());
        assert_eq!(store.permission_level(9, &scope, &ct).await.unwrap(), None);
    }
}
