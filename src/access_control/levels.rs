//! Permission level resolution
//!
//! Looks up the level an accessor holds within a scope. The lookup is
//! swappable per scope type through [`LevelResolvers`].

use crate::access_control::types::{PermissionLevel, Scope, ScopeType};
use crate::error::StoreResult;
use crate::model::User;
use crate::store::SharedStore;
// async_trait required for dyn-compatibility with Arc<dyn LevelResolver>
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Resolves an accessor's permission level within a scope
#[async_trait]
pub trait LevelResolver: Send + Sync {
    async fn resolve_level(
        &self,
        accessor: &User,
        scope: &Scope,
        ct: &CancellationToken,
    ) -> StoreResult<PermissionLevel>;

    /// Name of the resolver (for logging)
    fn name(&self) -> &'static str;
}

/// Reads the accessor's membership row for the scope
///
/// An accessor without a row resolves to [`PermissionLevel::None`].
pub struct MembershipLevelResolver {
    store: SharedStore,
}

impl MembershipLevelResolver {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LevelResolver for MembershipLevelResolver {
    async fn resolve_level(
        &self,
        accessor: &User,
        scope: &Scope,
        ct: &CancellationToken,
    ) -> StoreResult<PermissionLevel> {
        let level = self
            .store
            .permission_level(accessor.id, scope, ct)
            .await?
            .unwrap_or_default();
        trace!(user_id = accessor.id, scope = %scope, level = %level, "Resolved membership level");
        Ok(level)
    }

    fn name(&self) -> &'static str {
        "membership"
    }
}

/// Grants the same level to everyone; meant for scopes without memberships
pub struct FixedLevelResolver {
    level: PermissionLevel,
}

impl FixedLevelResolver {
    pub fn new(level: PermissionLevel) -> Self {
        Self { level }
    }
}

#[async_trait]
impl LevelResolver for FixedLevelResolver {
    async fn resolve_level(
        &self,
        _accessor: &User,
        _scope: &Scope,
        _ct: &CancellationToken,
    ) -> StoreResult<PermissionLevel> {
        Ok(self.level)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Level resolvers keyed by scope type, with a fallback
#[derive(Clone)]
pub struct LevelResolvers {
    fallback: Arc<dyn LevelResolver>,
    by_scope_type: HashMap<ScopeType, Arc<dyn LevelResolver>>,
}

impl LevelResolvers {
    pub fn new(fallback: Arc<dyn LevelResolver>) -> Self {
        Self {
            fallback,
            by_scope_type: HashMap::new(),
        }
    }

    /// Membership lookup for every scope type
    pub fn membership(store: SharedStore) -> Self {
        Self::new(Arc::new(MembershipLevelResolver::new(store)))
    }

    /// Use `resolver` for scopes of `scope_type`
    pub fn with(mut self, scope_type: ScopeType, resolver: Arc<dyn LevelResolver>) -> Self {
        self.by_scope_type.insert(scope_type, resolver);
        self
    }

    pub fn resolver_for(&self, scope_type: ScopeType) -> &Arc<dyn LevelResolver> {
        self.by_scope_type
            .get(&scope_type)
            .unwrap_or(&self.fallback)
    }

    pub async fn resolve(
        &self,
        accessor: &User,
        scope: &Scope,
        ct: &CancellationToken,
    ) -> StoreResult<PermissionLevel> {
        self.resolver_for(scope.scope_type)
            .resolve_level(accessor, scope, ct)
            .await
    }
}
