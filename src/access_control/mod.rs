//! Access control module
//!
//! Decides whether a user may perform an action on a resource.
//!
//! ## Access Control Model
//!
//! A decision is made from three sources, in order:
//!
//! 1. **Implicit ownership** - the recorded owner of a resource may do anything with it
//! 2. **Direct rules** - `RoleAccess` rows naming the resource, searched most specific first:
//!    `(type, id, action)`, `(type, *, action)`, `(*, *, action)`, `(*, *, *)`
//! 3. **Group rules** - the same search on `(Group, id)` for every group containing the resource,
//!    taken when the accessor belongs to at least one group
//!
//! The first tier holding an applicable row decides, even when the accessor's
//! level is too low: a rule that requires more than the accessor holds is a
//! deny, not a reason to keep looking. Anything not granted is denied.
//!
//! Rules carry a minimum [`PermissionLevel`]. The accessor's level is looked
//! up once per decision, from the membership row for the resource's scope.
//!
//! ## Example Seed Rows
//!
//! ```toml
//! [[role_accesses]]
//! resource_type = "Project"      # any project ...
//! resource_id = 0
//! action = "read"                # ... may be read ...
//! level = 17                     # ... by viewers and above
//! scope_type = "project"
//! scope_id = 7
//! ```

pub mod groups;
pub mod levels;
pub mod resolver;
pub mod rules;
pub mod types;

pub use groups::GroupResolver;
pub use levels::{FixedLevelResolver, LevelResolver, LevelResolvers, MembershipLevelResolver};
pub use resolver::{AccessDecision, AccessResolver, Grant, ScopedFilter};
pub use rules::{MalformedRule, RoleAccess, RuleKey, RuleMatch, RuleStore, RuleTier};
pub use types::{Action, Entity, PermissionLevel, Resource, Scope, ScopeType};
