//! ctxdb CLI
//!
//! Command-line tool for migrating and inspecting the context database.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ctxdb_store::prelude::*;

/// Schema migrations for the context database.
#[derive(Parser)]
#[command(name = "ctxdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML file with a `[database]` table.
    #[arg(short, long, env = "CTXDB_CONFIG", conflicts_with = "sqlite")]
    config: Option<PathBuf>,

    /// SQLite database file, used instead of a config file.
    #[arg(long, env = "CTXDB_SQLITE_PATH")]
    sqlite: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations.
    Migrate,

    /// Roll back the most recently applied migrations.
    Rollback {
        /// Number of migrations to roll back.
        #[arg(short, long, default_value_t = 1)]
        steps: usize,
    },

    /// Show applied and pending migrations.
    Status,

    /// Print the tables, columns and indexes of the live schema.
    Schema,
}

impl Cli {
    fn database_config(&self) -> anyhow::Result<DatabaseConfig> {
        match (&self.config, &self.sqlite) {
            (Some(path), _) => Ok(DatabaseConfig::load(path)?),
            (None, Some(path)) => Ok(DatabaseConfig::sqlite(path)),
            (None, None) => anyhow::bail!(
                "no database configured; pass --config <file> or --sqlite <path> \
                 (or set CTXDB_CONFIG / CTXDB_SQLITE_PATH)"
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = cli.database_config()?;
    let adapter = AdapterFactory::create(&config).await?;
    let result = run(&cli.command, adapter.clone()).await;
    adapter.close().await?;
    result
}

async fn run(command: &Commands, adapter: Arc<dyn ConnectionAdapter>) -> anyhow::Result<()> {
    let runner = MigrationRunner::new(adapter.clone(), builtin_migrations())?;

    match command {
        Commands::Migrate => {
            let report = runner.migrate_to_latest().await?;
            info!(
                applied = report.versions_in(UnitState::Applied).len(),
                "Migration run complete."
            );
        }

        Commands::Rollback { steps } => {
            let report = runner.rollback_last(*steps).await?;
            for unit in &report.units {
                println!(" [{}] {} {}", unit.state, unit.version, unit.name);
            }
        }

        Commands::Status => {
            let status = runner.status().await?;
            println!("\nMigrations:");
            println!("{:-<72}", "");
            for entry in &status {
                let mark = if entry.is_applied() { "X" } else { " " };
                let applied_at = entry
                    .applied_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                let note = if entry.registered { "" } else { " (unknown unit)" };
                println!(
                    " [{mark}] {} {}{note} {applied_at}",
                    entry.version, entry.name
                );
            }
            println!();
        }

        Commands::Schema => {
            for table in adapter.snapshot().await? {
                println!("{}", table.name);
                println!("  columns: {}", table.columns.join(", "));
                if !table.indexes.is_empty() {
                    println!("  indexes: {}", table.indexes.join(", "));
                }
            }
        }
    }

    Ok(())
}
