//! Access decision engine
//!
//! Evaluates whether a user may perform an action on a resource. Checks run in
//! the following order, and the first one that produces an answer wins:
//! 1. Engine disabled (open-access mode): allowed
//! 2. Implicit ownership: the resource owner is allowed everything
//! 3. Direct rule cascade on the resource itself
//! 4. Group-pair fallback on the groups containing the resource
//! 5. Default deny
//!
//! A rule found by the direct cascade is final even when it denies; the
//! group fallback only runs when no tier had an applicable row.

use crate::access_control::groups::GroupResolver;
use crate::access_control::levels::LevelResolvers;
use crate::access_control::rules::{RuleMatch, RuleStore, RuleTier};
use crate::access_control::types::{
    Action, GROUP_TYPE_NAME, GroupId, PermissionLevel, Resource, UserId,
};
use crate::config::{AuthorizationConfig, Environment};
use crate::error::{AccessDeniedError, AccessError, AppError, ConfigError};
use crate::metrics::{DecisionMetrics, Outcome};
use crate::model::{Group, User};
use crate::store::{MemoryStore, SharedStore};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Why access was granted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Grant {
    /// The engine is disabled
    Bypassed,
    /// The accessor owns the resource
    Owner,
    /// A rule on the resource itself
    DirectRule { tier: RuleTier, rule_id: u64 },
    /// A rule on a group containing the resource
    GroupRule {
        accessor_group: GroupId,
        resource_group: GroupId,
        tier: RuleTier,
        rule_id: u64,
    },
}

impl Grant {
    fn outcome(&self) -> Outcome {
        match self {
            Grant::Bypassed => Outcome::Bypassed,
            Grant::Owner => Outcome::Owner,
            Grant::DirectRule { .. } => Outcome::DirectRule,
            Grant::GroupRule { .. } => Outcome::GroupRule,
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::Bypassed => write!(f, "authorization disabled"),
            Grant::Owner => write!(f, "resource owner"),
            Grant::DirectRule { tier, rule_id } => write!(f, "rule {} ({})", rule_id, tier),
            Grant::GroupRule {
                accessor_group,
                resource_group,
                tier,
                rule_id,
            } => write!(
                f,
                "rule {} ({}) on group {} via group {}",
                rule_id, tier, resource_group, accessor_group
            ),
        }
    }
}

/// Result of an access check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "detail", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Access is allowed
    Allowed(Grant),
    /// Access is denied with a reason
    Denied(String),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, AccessDecision::Denied(_))
    }
}

/// Pre-filter for list queries
///
/// Restricts rows to those the accessor owns directly. Rows reachable only
/// through rules or groups are not included; callers check those with
/// [`AccessResolver::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum ScopedFilter {
    /// Engine disabled: every row is visible
    Unrestricted,
    /// Only rows whose owner column equals `user_id`
    OwnedBy {
        column: &'static str,
        user_id: UserId,
    },
}

impl ScopedFilter {
    /// Owner column used by every resource table
    pub const OWNER_COLUMN: &'static str = "user_id";

    pub fn matches(&self, resource: &dyn Resource) -> bool {
        match self {
            ScopedFilter::Unrestricted => true,
            ScopedFilter::OwnedBy { user_id, .. } => resource.owner_user_id() == Some(*user_id),
        }
    }

    /// Keep the rows this filter admits
    pub fn apply<R: Resource>(&self, rows: Vec<R>) -> Vec<R> {
        rows.into_iter().filter(|row| self.matches(row)).collect()
    }
}

impl fmt::Display for ScopedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopedFilter::Unrestricted => write!(f, "TRUE"),
            ScopedFilter::OwnedBy { column, user_id } => write!(f, "{} = {}", column, user_id),
        }
    }
}

/// Access decision engine
///
/// Holds no mutable state; one instance can serve concurrent checks.
#[derive(Clone)]
pub struct AccessResolver {
    enabled: bool,
    allow_implicit_owner_access: bool,
    environment: Environment,
    rules: RuleStore,
    groups: GroupResolver,
    levels: LevelResolvers,
    metrics: Option<Arc<DecisionMetrics>>,
}

impl AccessResolver {
    /// Create an engine over `store`
    ///
    /// Levels are read from the store's membership rows for every scope
    /// type; use [`with_level_resolvers`](Self::with_level_resolvers) to
    /// change that.
    pub fn new(config: &AuthorizationConfig, store: SharedStore) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_config(config, store))
    }

    /// Build from an already validated configuration
    fn from_config(config: &AuthorizationConfig, store: SharedStore) -> Self {
        if !config.enabled {
            warn!(
                environment = config.environment.as_str(),
                "Authorization is DISABLED: every request will be allowed"
            );
        }
        if !config.allow_implicit_owner_access {
            debug!("Implicit owner access disabled");
        }

        Self {
            enabled: config.enabled,
            allow_implicit_owner_access: config.allow_implicit_owner_access,
            environment: config.environment,
            rules: RuleStore::new(store.clone()),
            groups: GroupResolver::new(store.clone()),
            levels: LevelResolvers::membership(store),
            metrics: None,
        }
    }

    /// Replace the per-scope-type level resolvers
    pub fn with_level_resolvers(mut self, levels: LevelResolvers) -> Self {
        self.levels = levels;
        self
    }

    /// Record every decision into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<DecisionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Create a permissive engine that allows everything
    ///
    /// The engine is marked as running in the test environment, so it never
    /// reports itself as a production engine.
    pub fn allow_all() -> Self {
        Self::from_config(
            &AuthorizationConfig::disabled(Environment::Test),
            Arc::new(MemoryStore::new()),
        )
    }

    /// Create a restrictive engine over an empty store: nothing but
    /// ownership is ever granted
    pub fn deny_all() -> Self {
        Self::from_config(&AuthorizationConfig::default(), Arc::new(MemoryStore::new()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn allows_implicit_owner_access(&self) -> bool {
        self.allow_implicit_owner_access
    }

    /// Decide whether `accessor` may perform `action` on `resource`
    ///
    /// Store failures and cancellation surface as [`AccessError`]; callers
    /// should treat them as deny but report them separately.
    pub async fn check(
        &self,
        accessor: &User,
        resource: &dyn Resource,
        action: &Action,
        ct: &CancellationToken,
    ) -> Result<AccessDecision, AccessError> {
        let started = Instant::now();
        debug!(
            user_id = accessor.id,
            resource = %resource.label(),
            action = %action,
            scope = %resource.scope(),
            "Checking access"
        );

        let result = self.evaluate(accessor, resource, action, ct).await;

        match &result {
            Ok(AccessDecision::Allowed(grant)) => {
                debug!(user_id = accessor.id, resource = %resource.label(), action = %action, grant = %grant, "Access allowed");
                self.record(accessor, resource, action, grant.outcome(), started, None);
            }
            Ok(AccessDecision::Denied(reason)) => {
                debug!(user_id = accessor.id, resource = %resource.label(), action = %action, reason = %reason, "Access denied");
                self.record(accessor, resource, action, Outcome::Denied, started, Some(reason));
            }
            Err(e) => {
                error!(
                    user_id = accessor.id,
                    resource = %resource.label(),
                    action = %action,
                    error = %e,
                    "Access undetermined"
                );
                let detail = e.to_string();
                self.record(
                    accessor,
                    resource,
                    action,
                    Outcome::Undetermined,
                    started,
                    Some(&detail),
                );
            }
        }

        result
    }

    /// Boolean form of [`check`](Self::check)
    pub async fn can_access(
        &self,
        accessor: &User,
        resource: &dyn Resource,
        action: &Action,
        ct: &CancellationToken,
    ) -> Result<bool, AccessError> {
        Ok(self.check(accessor, resource, action, ct).await?.is_allowed())
    }

    /// Check access, returning an error if it is denied or undetermined
    pub async fn require(
        &self,
        accessor: &User,
        resource: &dyn Resource,
        action: &Action,
        ct: &CancellationToken,
    ) -> Result<(), AppError> {
        match self.check(accessor, resource, action, ct).await? {
            AccessDecision::Allowed(_) => Ok(()),
            AccessDecision::Denied(reason) => Err(AccessDeniedError::new(
                action.as_str(),
                resource.label(),
                reason,
            )
            .into()),
        }
    }

    /// Filter restricting list queries to rows `accessor` owns
    pub fn scoped_query(&self, accessor: &User) -> ScopedFilter {
        if !self.enabled {
            return ScopedFilter::Unrestricted;
        }
        ScopedFilter::OwnedBy {
            column: ScopedFilter::OWNER_COLUMN,
            user_id: accessor.id,
        }
    }

    async fn evaluate(
        &self,
        accessor: &User,
        resource: &dyn Resource,
        action: &Action,
        ct: &CancellationToken,
    ) -> Result<AccessDecision, AccessError> {
        // 1. Open-access mode
        if !self.enabled {
            trace!("Authorization disabled, bypassing evaluation");
            return Ok(AccessDecision::Allowed(Grant::Bypassed));
        }

        // 2. Implicit ownership
        if self.allow_implicit_owner_access && resource.owner_user_id() == Some(accessor.id) {
            trace!("Accessor owns the resource");
            return Ok(AccessDecision::Allowed(Grant::Owner));
        }

        let scope = resource.scope();
        let level = self.levels.resolve(accessor, &scope, ct).await?;
        trace!(level = %level, scope = %scope, "Resolved accessor level");

        // 3. Direct rule cascade
        if let Some(found) = self
            .rules
            .find_rule(resource.type_name(), resource.id(), action, &scope, ct)
            .await?
        {
            return Ok(Self::decide_direct(&found, level));
        }

        // 4. Group-pair fallback
        if let Some(grant) = self
            .group_fallback(accessor, resource, action, level, ct)
            .await?
        {
            return Ok(AccessDecision::Allowed(grant));
        }

        // 5. Default deny
        trace!("No rule or group path matched");
        Ok(AccessDecision::Denied(
            "no matching rule or group path".to_string(),
        ))
    }

    fn decide_direct(found: &RuleMatch, level: PermissionLevel) -> AccessDecision {
        if found.grants(level) {
            AccessDecision::Allowed(Grant::DirectRule {
                tier: found.tier,
                rule_id: found.rule.id,
            })
        } else {
            AccessDecision::Denied(format!(
                "rule {} ({}) requires {}, accessor has {}",
                found.rule.id, found.tier, found.required, level
            ))
        }
    }

    /// Try every (accessor group, resource group) pair
    ///
    /// The cascade for a pair depends only on the resource group, so each
    /// resource group is evaluated once. An insufficient match on one pair
    /// does not end the search.
    async fn group_fallback(
        &self,
        accessor: &User,
        resource: &dyn Resource,
        action: &Action,
        level: PermissionLevel,
        ct: &CancellationToken,
    ) -> Result<Option<Grant>, AccessError> {
        let accessor_groups = self.groups.groups_of(accessor, ct).await?;
        if accessor_groups.is_empty() {
            trace!("Accessor belongs to no group");
            return Ok(None);
        }

        let resource_groups: Vec<Group> = self
            .groups
            .enclosing(resource.type_name(), resource.id(), ct)
            .await?;
        if resource_groups.is_empty() {
            trace!("Resource belongs to no group");
            return Ok(None);
        }

        let scope = resource.scope();
        let mut evaluated: HashMap<GroupId, Option<RuleMatch>> = HashMap::new();

        for accessor_group in &accessor_groups {
            for resource_group in &resource_groups {
                let found = match evaluated.get(&resource_group.id) {
                    Some(found) => found.clone(),
                    None => {
                        let found = self
                            .rules
                            .find_rule(GROUP_TYPE_NAME, resource_group.id, action, &scope, ct)
                            .await?;
                        evaluated.insert(resource_group.id, found.clone());
                        found
                    }
                };

                match found {
                    Some(found) if found.grants(level) => {
                        trace!(
                            accessor_group = accessor_group.id,
                            resource_group = resource_group.id,
                            rule_id = found.rule.id,
                            "Group pair granted access"
                        );
                        return Ok(Some(Grant::GroupRule {
                            accessor_group: accessor_group.id,
                            resource_group: resource_group.id,
                            tier: found.tier,
                            rule_id: found.rule.id,
                        }));
                    }
                    Some(found) => {
                        trace!(
                            resource_group = resource_group.id,
                            rule_id = found.rule.id,
                            required = %found.required,
                            "Group rule requires a higher level"
                        );
                    }
                    None => {}
                }
            }
        }

        Ok(None)
    }

    fn record(
        &self,
        accessor: &User,
        resource: &dyn Resource,
        action: &Action,
        outcome: Outcome,
        started: Instant,
        detail: Option<&str>,
    ) {
        if let Some(metrics) = &self.metrics {
            metrics.record(
                accessor.id,
                &resource.label(),
                action.as_str(),
                outcome,
                started.elapsed(),
                detail,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_control::rules::RoleAccess;
    use crate::access_control::types::Scope;
    use crate::model::{GroupMember, Project, ProjectPermission, ResourceRef};

    fn project(id: u64, owner: UserId) -> Project {
        Project {
            id,
            name: format!("p{}", id),
            account_id: 1,
            owner_user_id: owner,
        }
    }

    fn engine(store: Arc<MemoryStore>) -> AccessResolver {
        AccessResolver::new(&AuthorizationConfig::default(), store).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_engine_bypasses() {
        let resolver = AccessResolver::allow_all();
        let decision = resolver
            .check(
                &User::new(1),
                &project(7, 2),
                &Action::delete(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(decision, AccessDecision::Allowed(Grant::Bypassed));
        assert_eq!(resolver.scoped_query(&User::new(1)), ScopedFilter::Unrestricted);
    }

    #[test]
    fn test_allow_all_is_never_production() {
        let resolver = AccessResolver::allow_all();
        assert!(!resolver.is_enabled());
        assert_eq!(resolver.environment(), Environment::Test);

        // The same configuration with the environment left at its default
        // is refused
        let config = AuthorizationConfig {
            environment: Environment::default(),
            ..AuthorizationConfig::disabled(resolver.environment())
        };
        let result = AccessResolver::new(&config, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_disabled_engine_allowed_outside_production() {
        for environment in [Environment::Development, Environment::Test] {
            let config = AuthorizationConfig::disabled(environment);
            let resolver = AccessResolver::new(&config, Arc::new(MemoryStore::new())).unwrap();
            assert!(!resolver.is_enabled());
            assert_eq!(resolver.environment(), environment);
        }
    }

    #[test]
    fn test_disabled_engine_rejected_in_production() {
        let config = AuthorizationConfig::disabled(Environment::Production);
        let result = AccessResolver::new(&config, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_owner_shortcut_can_be_disabled() {
        let config = AuthorizationConfig {
            allow_implicit_owner_access: false,
            ..Default::default()
        };
        let resolver = AccessResolver::new(&config, Arc::new(MemoryStore::new())).unwrap();
        let decision = resolver
            .check(
                &User::new(2),
                &project(7, 2),
                &Action::read(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(decision.is_denied());
    }

    #[tokio::test]
    async fn test_deny_all_still_grants_owner() {
        let resolver = AccessResolver::deny_all();
        let ct = CancellationToken::new();
        assert!(resolver
            .can_access(&User::new(2), &project(7, 2), &Action::read(), &ct)
            .await
            .unwrap());
        assert!(!resolver
            .can_access(&User::new(3), &project(7, 2), &Action::read(), &ct)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_insufficient_direct_rule_skips_group_fallback() {
        let store = Arc::new(MemoryStore::new());
        let scope = Scope::project(7);
        store.insert_rule(
            RoleAccess::new("Document", 5, Action::read(), PermissionLevel::Admin).in_scope(scope),
        );
        // A group path that would grant on its own
        store.create_group(Group::new(1, "g1", GROUP_TYPE_NAME)).unwrap();
        store.add_member(GroupMember::user(1, 10));
        store.add_member(GroupMember::new(1, "Document", 5));
        store.insert_rule(
            RoleAccess::new(GROUP_TYPE_NAME, 1, Action::read(), PermissionLevel::Viewer)
                .in_scope(scope),
        );
        store.set_permission(ProjectPermission::new(10, scope, PermissionLevel::Editor));

        let resolver = engine(store);
        let doc = ResourceRef::new("Document", 5, scope);
        let decision = resolver
            .check(&User::new(10), &doc, &Action::read(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(decision.is_denied());
    }

    #[tokio::test]
    async fn test_require_reports_denial() {
        let resolver = engine(Arc::new(MemoryStore::new()));
        let result = resolver
            .require(
                &User::new(1),
                &project(7, 2),
                &Action::update(),
                &CancellationToken::new(),
            )
            .await;
        match result {
            Err(AppError::AccessDenied(e)) => {
                assert_eq!(e.action, "update");
                assert_eq!(e.resource, "Project#7");
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_check_is_undetermined() {
        let resolver = engine(Arc::new(MemoryStore::new()));
        let ct = CancellationToken::new();
        ct.cancel();

        let result = resolver
            .check(&User::new(1), &project(7, 2), &Action::read(), &ct)
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_metrics_record_outcomes() {
        let metrics = Arc::new(DecisionMetrics::new());
        let resolver = engine(Arc::new(MemoryStore::new())).with_metrics(metrics.clone());
        let ct = CancellationToken::new();

        resolver
            .check(&User::new(2), &project(7, 2), &Action::read(), &ct)
            .await
            .unwrap();
        resolver
            .check(&User::new(3), &project(7, 2), &Action::read(), &ct)
            .await
            .unwrap();

        assert_eq!(metrics.count(Outcome::Owner), 1);
        assert_eq!(metrics.count(Outcome::Denied), 1);
    }

    #[test]
    fn test_scoped_filter() {
        let resolver = engine(Arc::new(MemoryStore::new()));
        let filter = resolver.scoped_query(&User::new(2));
        assert_eq!(filter.to_string(), "user_id = 2");

        let rows = vec![project(1, 2), project(2, 3), project(3, 2)];
        let visible: Vec<u64> = filter.apply(rows).iter().map(|p| p.id).collect();
        assert_eq!(visible, vec![1, 3]);
    }
}
