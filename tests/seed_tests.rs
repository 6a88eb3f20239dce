//! Seed file loading tests
//!
//! Loads seed files from disk and evaluates decisions against the result.

use rolegate::access_control::{AccessResolver, Action, Scope};
use rolegate::config::AuthorizationConfig;
use rolegate::error::SeedError;
use rolegate::model::{ResourceRef, User};
use rolegate::store::{MemoryStore, Seeder};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

const SEED_TOML: &str = r#"
[[role_accesses]]
resource_type = "Project"
resource_id = 0
action = "read"
level = 17
scope_type = "project"
scope_id = 7

[[role_accesses]]
resource_type = "Group"
resource_id = 1
action = "update"
level = 18
scope_type = "project"
scope_id = 7

[[role_accesses]]
resource_type = ""
action = "*"
level = 42

[[groups]]
id = 1
name = "engineering"
member_type = "Group"

[[groups]]
id = 2
name = "platform"
member_type = "User"

[[group_members]]
group_id = 1
member_type = "Group"
member_id = 2

[[group_members]]
group_id = 2
member_type = "User"
member_id = 10

[[group_members]]
group_id = 1
member_type = "Document"
member_id = 5

[[permissions]]
user_id = 10
level = "editor"

[permissions.scope]
scope_type = "project"
scope_id = 7
"#;

fn write_seed(name: &str, contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn test_seed_toml_file() {
    let (_dir, path) = write_seed("rules.toml", SEED_TOML);
    let store = MemoryStore::new();

    let report = Seeder::new(&store).seed_from_path(&path).unwrap();

    assert_eq!(report.rules_inserted, 3);
    assert_eq!(report.rules_skipped, 0);
    assert_eq!(report.groups, 2);
    assert_eq!(report.group_members, 3);
    assert_eq!(report.permissions, 1);
    assert_eq!(store.rule_count(), 3);
}

#[test]
fn test_seeding_twice_is_idempotent_for_rules() {
    let (_dir, path) = write_seed("rules.toml", SEED_TOML);
    let store = MemoryStore::new();
    let seeder = Seeder::new(&store);

    seeder.seed_from_path(&path).unwrap();
    let second = seeder.seed_from_path(&path).unwrap();

    assert_eq!(second.rules_inserted, 0);
    assert_eq!(second.rules_skipped, 3);
    assert_eq!(store.rule_count(), 3);
    assert_eq!(store.member_count(), 3);
}

#[test]
fn test_empty_resource_type_is_normalized() {
    let (_dir, path) = write_seed("rules.toml", SEED_TOML);
    let store = MemoryStore::new();
    Seeder::new(&store).seed_from_path(&path).unwrap();

    let rules = store.rules();
    let wildcard = rules.iter().find(|r| r.action.is_wildcard()).unwrap();
    assert_eq!(wildcard.resource_type, "*");
    // Level 42 is not a known level and is kept for `validate` to report
    assert!(wildcard.validate().is_err());
}

#[test]
fn test_unsupported_extension() {
    let (_dir, path) = write_seed("rules.yaml", "role_accesses: []");
    let store = MemoryStore::new();

    let result = Seeder::new(&store).seed_from_path(&path);
    assert!(matches!(result, Err(SeedError::UnsupportedFormat(_))));
}

#[test]
fn test_invalid_json() {
    let (_dir, path) = write_seed("rules.json", "{ not json");
    let store = MemoryStore::new();

    let result = Seeder::new(&store).seed_from_path(&path);
    assert!(matches!(result, Err(SeedError::Json(_))));
}

#[test]
fn test_missing_file() {
    let store = MemoryStore::new();
    let result = Seeder::new(&store).seed_from_path("/definitely/not/here.toml");
    assert!(matches!(result, Err(SeedError::Io(_))));
}

#[tokio::test]
async fn test_decisions_against_seeded_store() {
    let (_dir, path) = write_seed("rules.toml", SEED_TOML);
    let store = Arc::new(MemoryStore::new());
    Seeder::new(&store).seed_from_path(&path).unwrap();
    let resolver = AccessResolver::new(&AuthorizationConfig::default(), store).unwrap();
    let ct = CancellationToken::new();
    let user = User::new(10);
    let scope = Scope::project(7);

    let project = ResourceRef::new("Project", 7, scope);
    assert!(resolver
        .can_access(&user, &project, &Action::read(), &ct)
        .await
        .unwrap());

    // Only the group rule covers update, through groups 2 and 1
    let document = ResourceRef::new("Document", 5, scope);
    assert!(resolver
        .can_access(&user, &document, &Action::update(), &ct)
        .await
        .unwrap());

    let outsider = ResourceRef::new("Document", 6, scope);
    assert!(!resolver
        .can_access(&user, &outsider, &Action::update(), &ct)
        .await
        .unwrap());

    // The malformed wildcard row never grants anything
    assert!(!resolver
        .can_access(&user, &outsider, &Action::delete(), &ct)
        .await
        .unwrap());
}
