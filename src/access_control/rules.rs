//! Rule store
//!
//! Finds the `RoleAccess` row that governs a `(resource type, resource id,
//! action)` triple. Rows are looked up tier by tier, most specific first:
//!
//! 1. exact `(type, id, action)`
//! 2. `(type, *, action)`
//! 3. `(*, *, action)`
//! 4. `(*, *, *)`
//!
//! The first tier with an applicable row decides, whether or not that row
//! grants access. A matched-but-insufficient rule is a denial, not a reason to
//! keep looking.

use crate::access_control::types::{
    Action, PermissionLevel, Scope, WILDCARD_RESOURCE_ID, WILDCARD_RESOURCE_TYPE,
};
use crate::error::StoreResult;
use crate::store::AccessStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

fn wildcard_type() -> String {
    WILDCARD_RESOURCE_TYPE.to_string()
}

/// A persisted access rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAccess {
    /// Row id; lower ids were created first
    #[serde(default)]
    pub id: u64,

    /// `*` (or empty) matches any type
    #[serde(default = "wildcard_type")]
    pub resource_type: String,

    /// `0` matches any id of the matched type
    #[serde(default)]
    pub resource_id: u64,

    pub action: Action,

    /// Required level, as stored
    pub level: u8,

    #[serde(flatten)]
    pub scope: Scope,
}

impl RoleAccess {
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: u64,
        action: impl Into<Action>,
        level: PermissionLevel,
    ) -> Self {
        Self {
            id: 0,
            resource_type: resource_type.into(),
            resource_id,
            action: action.into(),
            level: level.as_u8(),
            scope: Scope::global(),
        }
        .normalized()
    }

    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Map the empty resource type onto the wildcard sentinel
    pub fn normalized(mut self) -> Self {
        if self.resource_type.is_empty() {
            self.resource_type = wildcard_type();
        }
        self
    }

    pub fn key(&self) -> RuleKey {
        RuleKey {
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id,
            action: self.action.clone(),
        }
    }

    /// Level this rule requires, if the stored value is a known level
    pub fn required_level(&self) -> Option<PermissionLevel> {
        PermissionLevel::try_from(self.level).ok()
    }

    /// Check the row for wildcard and scope combinations that make no sense
    pub fn validate(&self) -> Result<PermissionLevel, MalformedRule> {
        if self.action.as_str().is_empty() {
            return Err(MalformedRule::EmptyAction);
        }
        let is_wildcard_type = self.resource_type == WILDCARD_RESOURCE_TYPE;
        if is_wildcard_type && self.resource_id != WILDCARD_RESOURCE_ID {
            return Err(MalformedRule::WildcardTypeWithId(self.resource_id));
        }
        if self.action.is_wildcard() && !is_wildcard_type {
            return Err(MalformedRule::WildcardActionOnType(
                self.resource_type.clone(),
            ));
        }
        if !self.scope.is_consistent() {
            return Err(MalformedRule::InconsistentScope(self.scope));
        }
        match self.required_level() {
            Some(PermissionLevel::None) | None => Err(MalformedRule::UnknownLevel(self.level)),
            Some(level) => Ok(level),
        }
    }
}

/// Why a rule row was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRule {
    EmptyAction,
    WildcardTypeWithId(u64),
    WildcardActionOnType(String),
    InconsistentScope(Scope),
    UnknownLevel(u8),
}

impl fmt::Display for MalformedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRule::EmptyAction => write!(f, "empty action"),
            MalformedRule::WildcardTypeWithId(id) => {
                write!(f, "wildcard resource type with specific id {}", id)
            }
            MalformedRule::WildcardActionOnType(resource_type) => write!(
                f,
                "wildcard action bound to concrete resource type '{}'",
                resource_type
            ),
            MalformedRule::InconsistentScope(scope) => write!(
                f,
                "scope type '{}' does not agree with scope id {}",
                scope.scope_type, scope.scope_id
            ),
            MalformedRule::UnknownLevel(level) => write!(f, "unknown permission level {}", level),
        }
    }
}

/// Equality filter over the rule relation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub resource_type: String,
    pub resource_id: u64,
    pub action: Action,
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.resource_type, self.resource_id, self.action
        )
    }
}

/// Precedence tier of the rule cascade, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTier {
    Exact = 1,
    AnyId = 2,
    AnyType = 3,
    AnyAction = 4,
}

impl RuleTier {
    pub const ALL: [RuleTier; 4] = [
        RuleTier::Exact,
        RuleTier::AnyId,
        RuleTier::AnyType,
        RuleTier::AnyAction,
    ];

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Filter this tier queries for
    pub fn key(self, resource_type: &str, resource_id: u64, action: &Action) -> RuleKey {
        let (resource_type, resource_id, action) = match self {
            RuleTier::Exact => (resource_type.to_string(), resource_id, action.clone()),
            RuleTier::AnyId => (resource_type.to_string(), WILDCARD_RESOURCE_ID, action.clone()),
            RuleTier::AnyType => (wildcard_type(), WILDCARD_RESOURCE_ID, action.clone()),
            RuleTier::AnyAction => (wildcard_type(), WILDCARD_RESOURCE_ID, Action::wildcard()),
        };
        RuleKey {
            resource_type,
            resource_id,
            action,
        }
    }
}

impl fmt::Display for RuleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {}", self.as_u8())
    }
}

/// The row that decided a cascade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub tier: RuleTier,
    pub rule: RoleAccess,
    pub required: PermissionLevel,
}

impl RuleMatch {
    pub fn grants(&self, level: PermissionLevel) -> bool {
        level.satisfies(self.required)
    }
}

/// Cascade lookup over an [`AccessStore`]
#[derive(Clone)]
pub struct RuleStore {
    store: Arc<dyn AccessStore>,
}

impl RuleStore {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Find the rule governing `action` on `(resource_type, resource_id)` within `scope`
    ///
    /// Returns `None` when no tier has an applicable row.
    pub async fn find_rule(
        &self,
        resource_type: &str,
        resource_id: u64,
        action: &Action,
        scope: &Scope,
        ct: &CancellationToken,
    ) -> StoreResult<Option<RuleMatch>> {
        for tier in RuleTier::ALL {
            let key = tier.key(resource_type, resource_id, action);
            let rows = self.store.role_accesses(&key, ct).await?;

            if let Some(found) = Self::select(tier, &key, scope, rows) {
                trace!(tier = %tier, key = %key, rule_id = found.rule.id, "Matched rule");
                return Ok(Some(found));
            }
            trace!(tier = %tier, key = %key, "No applicable rule at tier");
        }
        Ok(None)
    }

    /// Pick the deciding row of one tier: rows bound to the exact scope win
    /// over global rows, then lower ids win.
    fn select(
        tier: RuleTier,
        key: &RuleKey,
        scope: &Scope,
        rows: Vec<RoleAccess>,
    ) -> Option<RuleMatch> {
        let mut global: Option<RuleMatch> = None;

        for rule in rows {
            let rule = rule.normalized();
            if rule.key() != *key {
                trace!(rule_id = rule.id, key = %key, "Skipping row outside the requested key");
                continue;
            }
            let required = match rule.validate() {
                Ok(level) => level,
                Err(reason) => {
                    warn!(rule_id = rule.id, reason = %reason, "Skipping malformed rule");
                    continue;
                }
            };
            if !rule.scope.covers(scope) {
                trace!(rule_id = rule.id, rule_scope = %rule.scope, scope = %scope, "Rule scope does not apply");
                continue;
            }

            let candidate = RuleMatch {
                tier,
                rule,
                required,
            };
            if candidate.rule.scope == *scope {
                return Some(candidate);
            }
            let replace = global
                .as_ref()
                .is_none_or(|current| candidate.rule.id < current.rule.id);
            if replace {
                global = Some(candidate);
            }
        }

        global
    }
}

/// Rules every new project starts with: members of the project may view
/// everything in it.
pub fn default_project_rules(project_id: u64) -> Vec<RoleAccess> {
    vec![
        RoleAccess::new(
            WILDCARD_RESOURCE_TYPE,
            WILDCARD_RESOURCE_ID,
            Action::wildcard(),
            PermissionLevel::Viewer,
        )
        .in_scope(Scope::project(project_id)),
    ]
}
