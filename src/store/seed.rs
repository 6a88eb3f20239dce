//! Seed data loading
//!
//! A seed file lists rule rows, groups, membership edges and permission
//! levels. JSON and TOML are accepted, chosen by file extension. Rule seeding
//! is idempotent: a row whose key and scope already exist is left alone.

use super::MemoryStore;
use crate::access_control::rules::RoleAccess;
use crate::error::SeedError;
use crate::model::{Group, GroupMember, ProjectPermission};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Contents of a seed file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub role_accesses: Vec<RoleAccess>,
    pub groups: Vec<Group>,
    pub group_members: Vec<GroupMember>,
    pub permissions: Vec<ProjectPermission>,
}

impl SeedData {
    pub fn from_json(s: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_toml(s: &str) -> Result<Self, SeedError> {
        Ok(toml::from_str(s)?)
    }

    /// Read a seed file, picking the parser from its extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            Some("toml") => Self::from_toml(&contents),
            other => Err(SeedError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// How many rows a seeding run wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub rules_inserted: usize,
    pub rules_skipped: usize,
    pub groups: usize,
    pub group_members: usize,
    pub permissions: usize,
}

/// Writes seed data into a [`MemoryStore`]
pub struct Seeder<'a> {
    store: &'a MemoryStore,
}

impl<'a> Seeder<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self { store }
    }

    pub fn seed_role_accesses(&self, rules: &[RoleAccess], report: &mut SeedReport) {
        info!(count = rules.len(), "Seeding role accesses");
        for rule in rules {
            match self.store.insert_rule_if_absent(rule.clone()) {
                Some(_) => report.rules_inserted += 1,
                None => report.rules_skipped += 1,
            }
        }
    }

    pub fn seed_groups(&self, data: &SeedData, report: &mut SeedReport) -> Result<(), SeedError> {
        info!(
            groups = data.groups.len(),
            edges = data.group_members.len(),
            "Seeding groups"
        );
        for group in &data.groups {
            self.store.create_group(group.clone())?;
            report.groups += 1;
        }
        for edge in &data.group_members {
            if self.store.add_member(edge.clone()) {
                report.group_members += 1;
            }
        }
        Ok(())
    }

    pub fn seed_permissions(&self, permissions: &[ProjectPermission], report: &mut SeedReport) {
        info!(count = permissions.len(), "Seeding permissions");
        for permission in permissions {
            self.store.set_permission(permission.clone());
            report.permissions += 1;
        }
    }

    pub fn seed(&self, data: &SeedData) -> Result<SeedReport, SeedError> {
        let mut report = SeedReport::default();
        self.seed_role_accesses(&data.role_accesses, &mut report);
        self.seed_groups(data, &mut report)?;
        self.seed_permissions(&data.permissions, &mut report);
        Ok(report)
    }

    pub fn seed_from_path(&self, path: impl AsRef<Path>) -> Result<SeedReport, SeedError> {
        let data = SeedData::from_path(path)?;
        self.seed(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_control::types::{PermissionLevel, Scope};
    use crate::error::StoreError;

    const SEED_JSON: &str = r#"{
        "role_accesses": [
            {"resource_type": "*", "resource_id": 0, "action": "*", "level": 17, "scope_type": "project", "scope_id": 1},
            {"resource_type": "Project", "action": "update", "level": 19}
        ],
        "groups": [
            {"id": 1, "name": "staff", "member_type": "User"}
        ],
        "group_members": [
            {"group_id": 1, "member_type": "User", "member_id": 42}
        ],
        "permissions": [
            {"user_id": 42, "scope": {"scope_type": "project", "scope_id": 1}, "level": "editor"}
        ]
    }"#;

    #[test]
    fn test_seed_from_json() {
        let store = MemoryStore::new();
        let data = SeedData::from_json(SEED_JSON).unwrap();
        let report = Seeder::new(&store).seed(&data).unwrap();

        assert_eq!(report.rules_inserted, 2);
        assert_eq!(report.groups, 1);
        assert_eq!(report.group_members, 1);
        assert_eq!(report.permissions, 1);

        let rules = store.rules();
        assert_eq!(rules[0].scope, Scope::project(1));
        assert_eq!(rules[1].scope, Scope::global());
        assert_eq!(rules[1].required_level(), Some(PermissionLevel::Admin));
    }

    #[test]
    fn test_reseeding_does_not_duplicate_rules() {
        let store = MemoryStore::new();
        let data = SeedData::from_json(SEED_JSON).unwrap();
        let seeder = Seeder::new(&store);
        seeder.seed(&data).unwrap();
        let report = seeder.seed(&data).unwrap();

        assert_eq!(report.rules_inserted, 0);
        assert_eq!(report.rules_skipped, 2);
        assert_eq!(store.rule_count(), 2);
        assert_eq!(store.member_count(), 1);
    }

    #[test]
    fn test_seed_fails_when_group_ids_run_out() {
        let store = MemoryStore::new();
        let data = SeedData::from_json(
            r#"{"groups": [
                {"id": 18446744073709551615, "name": "last", "member_type": "User"},
                {"id": 0, "name": "auto", "member_type": "User"}
            ]}"#,
        )
        .unwrap();

        let result = Seeder::new(&store).seed(&data);
        assert!(matches!(
            result,
            Err(SeedError::Store(StoreError::IdsExhausted { .. }))
        ));
        assert_eq!(store.group_count(), 1);
    }

    #[test]
    fn test_seed_from_toml() {
        let toml = r#"
[[role_accesses]]
resource_type = "Project"
resource_id = 0
action = "read"
level = 17
scope_type = "account"
scope_id = 3
"#;
        let data = SeedData::from_toml(toml).unwrap();
        assert_eq!(data.role_accesses.len(), 1);
        assert_eq!(data.role_accesses[0].scope, Scope::account(3));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.yaml");
        std::fs::write(&path, "role_accesses: []").unwrap();

        let result = SeedData::from_path(&path);
        assert!(matches!(result, Err(SeedError::UnsupportedFormat(ext)) if ext == "yaml"));
    }
}
