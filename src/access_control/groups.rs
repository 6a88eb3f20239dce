//! Group graph resolution
//!
//! Groups contain entities and other groups. The membership edges are not
//! validated when written, so the graph can contain cycles. Both lookups here
//! walk upward (from a member to the groups containing it) with an explicit
//! stack and a visited set, so every group is expanded at most once and the
//! walk terminates on any edge data.

use crate::access_control::types::{Entity, GROUP_TYPE_NAME, GroupId};
use crate::error::{AccessError, StoreResult};
use crate::model::Group;
use crate::store::SharedStore;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Groups in discovery order, without duplicates
#[derive(Default)]
struct GroupSet {
    ids: HashSet<GroupId>,
    groups: Vec<Group>,
}

impl GroupSet {
    fn insert(&mut self, group: &Group) -> bool {
        if self.ids.insert(group.id) {
            self.groups.push(group.clone());
            true
        } else {
            false
        }
    }

    fn into_vec(self) -> Vec<Group> {
        self.groups
    }
}

/// Resolves the groups an entity belongs to
#[derive(Clone)]
pub struct GroupResolver {
    store: SharedStore,
}

impl GroupResolver {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Every group that directly or transitively contains `group`
    ///
    /// If `group` sits on a cycle it is its own ancestor and appears once in
    /// the result.
    pub async fn ancestors(
        &self,
        group: &Group,
        ct: &CancellationToken,
    ) -> StoreResult<Vec<Group>> {
        let mut found = GroupSet::default();
        self.climb(vec![group.clone()], &mut found, ct).await?;
        debug!(group_id = group.id, ancestors = found.groups.len(), "Resolved ancestors");
        Ok(found.into_vec())
    }

    /// Groups `entity` is a direct member of, plus all their ancestors
    ///
    /// Groups themselves are rejected; use [`ancestors`](Self::ancestors).
    pub async fn groups_of(
        &self,
        entity: &dyn Entity,
        ct: &CancellationToken,
    ) -> Result<Vec<Group>, AccessError> {
        if entity.type_name() == GROUP_TYPE_NAME {
            return Err(AccessError::GroupEntity {
                type_name: entity.type_name().to_string(),
            });
        }

        Ok(self.enclosing(entity.type_name(), entity.id(), ct).await?)
    }

    /// Groups directly or transitively containing the member `(type_name, id)`
    ///
    /// Unlike [`groups_of`](Self::groups_of) this accepts groups, which is
    /// what the decision engine needs for group-typed resources.
    pub(crate) async fn enclosing(
        &self,
        type_name: &str,
        id: u64,
        ct: &CancellationToken,
    ) -> StoreResult<Vec<Group>> {
        let direct = self.containing_groups(type_name, id, ct).await?;
        let mut found = GroupSet::default();
        for group in &direct {
            found.insert(group);
        }
        self.climb(direct, &mut found, ct).await?;

        debug!(
            entity_type = type_name,
            entity_id = id,
            groups = found.groups.len(),
            "Resolved groups"
        );
        Ok(found.into_vec())
    }

    /// Walk upward from `stack`, adding every container reached to `found`
    async fn climb(
        &self,
        mut stack: Vec<Group>,
        found: &mut GroupSet,
        ct: &CancellationToken,
    ) -> StoreResult<()> {
        let mut visited: HashSet<GroupId> = HashSet::new();

        while let Some(group) = stack.pop() {
            if !visited.insert(group.id) {
                trace!(group_id = group.id, "Group already visited");
                continue;
            }
            let parents = self
                .containing_groups(GROUP_TYPE_NAME, group.id, ct)
                .await?;
            for parent in parents {
                found.insert(&parent);
                if !visited.contains(&parent.id) {
                    stack.push(parent);
                }
            }
        }
        Ok(())
    }

    /// Groups holding a direct edge to `(member_type, member_id)`
    async fn containing_groups(
        &self,
        member_type: &str,
        member_id: u64,
        ct: &CancellationToken,
    ) -> StoreResult<Vec<Group>> {
        let edges = self.store.memberships_of(member_type, member_id, ct).await?;
        let mut ids: Vec<GroupId> = edges.iter().map(|edge| edge.group_id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let groups = self.store.groups(&ids, ct).await?;
        if groups.len() != ids.len() {
            trace!(
                member_type,
                member_id,
                edges = ids.len(),
                groups = groups.len(),
                "Ignoring edges to missing groups"
            );
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupMember, User};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn store_with_groups(ids: &[GroupId]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for id in ids {
            store
                .create_group(Group::new(*id, format!("g{}", id), GROUP_TYPE_NAME))
                .unwrap();
        }
        store
    }

    fn ids(groups: &[Group]) -> Vec<GroupId> {
        let mut ids: Vec<_> = groups.iter().map(|g| g.id).collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test]
    async fn test_ancestors_of_top_level_group_is_empty() {
        let store = store_with_groups(&[1]);
        let resolver = GroupResolver::new(store);
        let group = Group::new(1, "g1", GROUP_TYPE_NAME);

        let found = resolver
            .ancestors(&group, &CancellationToken::new())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_ancestors_follow_chain() {
        // 1 contains 2 contains 3
        let store = store_with_groups(&[1, 2, 3]);
        store.add_member(GroupMember::nested(1, 2));
        store.add_member(GroupMember::nested(2, 3));
        let resolver = GroupResolver::new(store);

        let found = resolver
            .ancestors(&Group::new(3, "g3", GROUP_TYPE_NAME), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_ancestors_terminate_on_cycle() {
        // 1 contains 2, 2 contains 3, 3 contains 1
        let store = store_with_groups(&[1, 2, 3]);
        store.add_member(GroupMember::nested(1, 2));
        store.add_member(GroupMember::nested(2, 3));
        store.add_member(GroupMember::nested(3, 1));
        let resolver = GroupResolver::new(store);

        let found = resolver
            .ancestors(&Group::new(1, "g1", GROUP_TYPE_NAME), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_self_membership_terminates() {
        let store = store_with_groups(&[1]);
        store.add_member(GroupMember::nested(1, 1));
        let resolver = GroupResolver::new(store);

        let found = resolver
            .ancestors(&Group::new(1, "g1", GROUP_TYPE_NAME), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![1]);
    }

    #[tokio::test]
    async fn test_diamond_has_no_duplicates() {
        // 1 contains 2 and 3, both contain 4
        let store = store_with_groups(&[1, 2, 3, 4]);
        store.add_member(GroupMember::nested(1, 2));
        store.add_member(GroupMember::nested(1, 3));
        store.add_member(GroupMember::nested(2, 4));
        store.add_member(GroupMember::nested(3, 4));
        let resolver = GroupResolver::new(store);

        let found = resolver
            .ancestors(&Group::new(4, "g4", GROUP_TYPE_NAME), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_groups_of_user_includes_ancestors() {
        let store = store_with_groups(&[1, 2, 5]);
        store.add_member(GroupMember::nested(1, 2));
        store.add_member(GroupMember::user(2, 42));
        store.add_member(GroupMember::user(5, 42));
        let resolver = GroupResolver::new(store);

        let found = resolver
            .groups_of(&User::new(42), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![1, 2, 5]);
    }

    #[tokio::test]
    async fn test_groups_of_ignores_dangling_edges() {
        let store = store_with_groups(&[1]);
        store.add_member(GroupMember::user(1, 42));
        store.add_member(GroupMember::user(99, 42));
        let resolver = GroupResolver::new(store);

        let found = resolver
            .groups_of(&User::new(42), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![1]);
    }

    #[tokio::test]
    async fn test_groups_of_rejects_groups() {
        let store = store_with_groups(&[1]);
        let resolver = GroupResolver::new(store);

        let result = resolver
            .groups_of(&Group::new(1, "g1", GROUP_TYPE_NAME), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AccessError::GroupEntity { .. })));
    }

    #[tokio::test]
    async fn test_enclosing_accepts_groups() {
        let store = store_with_groups(&[1, 2]);
        store.add_member(GroupMember::nested(1, 2));
        let resolver = GroupResolver::new(store);

        let found = resolver
            .enclosing(GROUP_TYPE_NAME, 2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![1]);
    }
}
