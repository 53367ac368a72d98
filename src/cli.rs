//! Command-line interface.
//!
//! `serve` lives in the binary because it owns the global recorder and signal
//! handling; the other commands are plain functions over the library.

use crate::config::Config;
use crate::embeddings::provider_from_config;
use crate::indexing::{index_catalog, index_status};
use crate::persistence::{connect, migrations, ToolIndexStore};
use crate::tools::{builtin, ToolRegistry};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// toolscout - semantic tool discovery and invocation service
#[derive(Parser, Debug)]
#[command(name = "toolscout")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Bind address (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Embed every registered tool and upsert it into the index
    Index,

    /// List registered tools and their index state
    Tools {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Manage the database schema
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },

    /// Soft-delete a tool from the index
    Retire {
        /// Tool name
        name: String,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Revert the most recent migration
    Down,
    /// Show applied and pending migrations
    Status,
}

impl Cli {
    /// Apply command-line overrides on top of the environment configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(path) = &self.database {
            config.database_path = path.clone();
        }
        if let Commands::Serve { host, port } = &self.command {
            if let Some(host) = host {
                config.host = host.clone();
            }
            if let Some(port) = port {
                config.port = *port;
            }
        }
    }
}

/// Build the process-wide registry with every built-in tool.
pub fn build_registry() -> anyhow::Result<Arc<ToolRegistry>> {
    let registry = ToolRegistry::new();
    builtin::register_all(&registry).context("invalid tool registration")?;
    tracing::info!(tools = registry.len(), "Tool catalog built");
    Ok(Arc::new(registry))
}

pub fn open_store(config: &Config) -> anyhow::Result<ToolIndexStore> {
    ToolIndexStore::open(
        &config.database_path,
        config.db_pool_size,
        config.embedding.dimensions,
    )
    .with_context(|| format!("failed to open database {}", config.database_path.display()))
}

pub async fn run_index(config: &Config) -> anyhow::Result<()> {
    let registry = build_registry()?;
    let provider =
        provider_from_config(&config.embedding).context("failed to create embedding provider")?;
    let store = open_store(config)?;

    let report = index_catalog(&registry, provider.as_ref(), &store).await?;
    println!(
        "Indexed {} tools ({} new, {} updated) in {} ms",
        report.indexed, report.inserted, report.updated, report.elapsed_ms
    );
    println!("Catalog digest: {}", report.digest);
    Ok(())
}

#[derive(Serialize)]
struct ToolListing {
    name: String,
    description: String,
    indexed: bool,
    updated_at: Option<String>,
}

#[derive(Serialize)]
struct ToolsReport {
    index_fresh: bool,
    live_rows: usize,
    tools: Vec<ToolListing>,
}

pub fn run_tools(config: &Config, json: bool) -> anyhow::Result<()> {
    let registry = build_registry()?;
    let store = open_store(config)?;
    let status = index_status(&registry, &config.embedding.model_id(), &store)?;

    let indexed = store.list()?;
    let tools: Vec<ToolListing> = registry
        .all_tools()
        .into_iter()
        .map(|def| {
            let row = indexed.iter().find(|t| t.name == def.name);
            ToolListing {
                indexed: row.is_some(),
                updated_at: row.map(|t| t.updated_at.to_rfc3339()),
                name: def.name,
                description: def.description,
            }
        })
        .collect();

    let report = ToolsReport {
        index_fresh: status.fresh,
        live_rows: status.live_rows,
        tools,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{:<20} {:<8} {:<26} DESCRIPTION", "NAME", "INDEXED", "UPDATED");
    for tool in &report.tools {
        println!(
            "{:<20} {:<8} {:<26} {}",
            tool.name,
            if tool.indexed { "yes" } else { "no" },
            tool.updated_at.as_deref().unwrap_or("-"),
            tool.description
        );
    }
    println!();
    println!(
        "{} live rows; index is {}",
        report.live_rows,
        if report.index_fresh {
            "up to date"
        } else {
            "stale (run `toolscout index`)"
        }
    );
    Ok(())
}

pub fn run_migrate(config: &Config, action: MigrateAction) -> anyhow::Result<()> {
    let mut conn = connect(&config.database_path)
        .with_context(|| format!("connect db {}", config.database_path.display()))?;

    match action {
        MigrateAction::Up => {
            let applied = migrations::migrate_up(&mut conn).context("migrate up")?;
            if applied.is_empty() {
                println!("Schema is up to date");
            }
            for version in applied {
                println!("Applied migration {}", version);
            }
        }
        MigrateAction::Down => match migrations::migrate_down(&mut conn).context("migrate down")? {
            Some(version) => println!("Reverted migration {}", version),
            None => println!("No migrations to revert"),
        },
        MigrateAction::Status => {
            for m in migrations::status(&conn).context("status")? {
                println!(
                    "{:>4}  {:<24} {}",
                    m.version,
                    m.name,
                    if m.applied { "applied" } else { "pending" }
                );
            }
        }
    }
    Ok(())
}

pub fn run_retire(config: &Config, name: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if store.retire(name)? {
        println!("Retired {}", name);
    } else {
        anyhow::bail!("no live tool named {:?}", name);
    }
    Ok(())
}
