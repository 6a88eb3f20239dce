//! rolegate
//!
//! Command-line front end for the access decision engine.

use anyhow::Context;
use clap::{Parser, Subcommand};
use rolegate::{
    access_control::{
        AccessDecision, AccessResolver, Action, GroupResolver, Resource, Scope, ScopeType,
        types::GROUP_TYPE_NAME,
    },
    config::{AppConfig, LogFormat, load_config},
    model::{Group, ResourceRef, User},
    store::{MemoryStore, SeedReport, Seeder, SharedStore},
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// rolegate - access decisions from ownership, scoped rules and nested groups
#[derive(Parser, Debug)]
#[command(name = "rolegate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "ROLEGATE_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the configuration file
    #[arg(long, env = "ROLEGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Seed file (JSON or TOML); overrides seed.path
    #[arg(short, long, env = "ROLEGATE_SEED", global = true)]
    seed: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one access decision and print it as JSON
    Check {
        /// Accessing user
        #[arg(long)]
        user: u64,

        /// Resource type name, e.g. Project
        #[arg(long = "type")]
        resource_type: String,

        /// Resource id
        #[arg(long)]
        id: u64,

        /// Action, e.g. read or update
        #[arg(long)]
        action: String,

        /// Owner of the resource
        #[arg(long)]
        owner: Option<u64>,

        /// Scope type of the resource (global, account, project)
        #[arg(long, default_value = "global")]
        scope_type: String,

        /// Scope id of the resource
        #[arg(long, default_value_t = 0)]
        scope_id: u64,
    },

    /// Print the groups an entity belongs to, directly or transitively
    Groups {
        /// Entity type name, e.g. User or Group
        #[arg(long = "type", default_value = "User")]
        entity_type: String,

        /// Entity id
        #[arg(long)]
        id: u64,
    },

    /// Load the seed file and report its contents
    Validate,
}

#[derive(Serialize)]
struct CheckOutput {
    user_id: u64,
    resource: String,
    action: String,
    allowed: bool,
    #[serde(flatten)]
    decision: AccessDecision,
}

#[derive(Serialize)]
struct GroupOutput {
    id: u64,
    name: String,
}

#[derive(Serialize)]
struct MalformedOutput {
    rule_id: u64,
    reason: String,
}

#[derive(Serialize)]
struct ValidateOutput {
    #[serde(flatten)]
    report: SeedReport,
    malformed: Vec<MalformedOutput>,
}

fn init_logging(config: &AppConfig, cli_level: Option<&str>) {
    let level = cli_level.unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

/// Build a store from the seed file, if any
fn load_store(seed: Option<&str>) -> anyhow::Result<Arc<MemoryStore>> {
    let store = Arc::new(MemoryStore::new());
    match seed {
        Some(path) => {
            let path = shellexpand::tilde(path);
            let report = Seeder::new(&store)
                .seed_from_path(path.as_ref())
                .inspect_err(|e| error!(error = %e, path = %path, "Failed to load seed file"))?;
            info!(
                path = %path,
                rules = report.rules_inserted,
                groups = report.groups,
                "Loaded seed data"
            );
        }
        None => warn!("No seed file configured, starting with an empty store"),
    }
    Ok(store)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(args.config.as_deref())
        .inspect_err(|e| eprintln!("Failed to load configuration: {}", e))?;

    // Initialize logging
    init_logging(&config, args.log_level.as_deref());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.authorization.environment.as_str(),
        "Starting rolegate"
    );

    let seed = args.seed.clone().or_else(|| config.seed.path.clone());

    // Ctrl-C cancels any in-flight decision
    let ct = CancellationToken::new();
    let signal = ct.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    match args.command {
        Command::Check {
            user,
            resource_type,
            id,
            action,
            owner,
            scope_type,
            scope_id,
        } => {
            let scope_type = ScopeType::try_parse(&scope_type)
                .with_context(|| format!("Unknown scope type: {}", scope_type))?;
            let scope = Scope::new(scope_type, scope_id);
            anyhow::ensure!(scope.is_consistent(), "Inconsistent scope: {}", scope);

            let store: SharedStore = load_store(seed.as_deref())?;
            let access = AccessResolver::new(&config.authorization, store)
                .inspect_err(|e| error!(error = %e, "Failed to create access resolver"))?;

            let mut resource = ResourceRef::new(resource_type, id, scope);
            if let Some(owner) = owner {
                resource = resource.owned_by(owner);
            }
            let action = Action::new(action);
            let accessor = User::new(user);

            let decision = access
                .check(&accessor, &resource, &action, &ct)
                .await
                .inspect_err(|e| error!(error = %e, "Access decision undetermined"))?;

            print_json(&CheckOutput {
                user_id: accessor.id,
                resource: resource.label(),
                action: action.to_string(),
                allowed: decision.is_allowed(),
                decision,
            })?;
        }
        Command::Groups { entity_type, id } => {
            let store: SharedStore = load_store(seed.as_deref())?;
            let resolver = GroupResolver::new(store);

            let groups = if entity_type == GROUP_TYPE_NAME {
                let group = Group::new(id, "", GROUP_TYPE_NAME);
                resolver.ancestors(&group, &ct).await?
            } else {
                let entity = ResourceRef::new(entity_type, id, Scope::global());
                resolver.groups_of(&entity, &ct).await?
            };

            let output: Vec<GroupOutput> = groups
                .into_iter()
                .map(|group| GroupOutput {
                    id: group.id,
                    name: group.name,
                })
                .collect();
            print_json(&output)?;
        }
        Command::Validate => {
            let path = seed.context("No seed file given (use --seed or seed.path)")?;
            let store = MemoryStore::new();
            let report = Seeder::new(&store)
                .seed_from_path(shellexpand::tilde(&path).as_ref())
                .inspect_err(|e| error!(error = %e, path = %path, "Failed to load seed file"))?;

            let malformed: Vec<MalformedOutput> = store
                .rules()
                .iter()
                .filter_map(|rule| {
                    rule.validate().err().map(|reason| MalformedOutput {
                        rule_id: rule.id,
                        reason: reason.to_string(),
                    })
                })
                .collect();
            for entry in &malformed {
                warn!(rule_id = entry.rule_id, reason = %entry.reason, "Malformed rule");
            }

            print_json(&ValidateOutput { report, malformed })?;
        }
    }

    Ok(())
}
