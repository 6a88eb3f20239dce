//! rolegate
//!
//! A multi-tenant access-control engine: decides whether a user may perform
//! an action on a resource from ownership, scoped rules, and nested groups.
//!
//! ## Features
//!
//! - **Rule cascade** from `(type, id, action)` down to `(*, *, *)`, stopping at the first applicable row
//! - **Permission levels** (`Everyone` < `Viewer` < `Editor` < `Admin` < `Owner`) resolved per scope
//! - **Nested groups** with cycle-safe ancestor resolution
//! - **Tenant isolation** - rules only apply inside their own scope or globally
//! - **Fail-closed errors** - store failures are reported, never mistaken for a deny
//!
//! ## Decision Model
//!
//! ```text
//! owner → direct rule cascade → group-pair rule cascade → deny
//! ```
//!
//! ## Example Configuration
//!
//! ```toml
//! [authorization]
//! enabled = true
//! allow_implicit_owner_access = true
//! environment = "production"
//!
//! [seed]
//! path = "rules.toml"
//! ```

pub mod access_control;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod store;

// Re-export main types
pub use access_control::{AccessDecision, AccessResolver, Action, PermissionLevel, Scope};
pub use crate::config::{AppConfig, load_config};
pub use error::{AppError, Result};
pub use metrics::DecisionMetrics;
pub use store::{AccessStore, MemoryStore, SharedStore};
