//! Backout Migration CLI Tool
//!
//! Runs `prisma migrate deploy` and, when the deploy fails, the rollback
//! script shipped with the failed migration. Intended for CI/CD pipelines.

use anyhow::Context;
use backout::migration::{recent_candidates, rollback_migration, MigratorSettings, RollbackOutcome};
use backout::{connect, deploy_with_rollback, BackoutConfig, MigrationHistory};
use backout_migrate::exit_code;
use backout_migrate::prompt::{self, PromptError};
use backout_migrate::report;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "backout-migrate")]
#[command(about = "Deploy Prisma migrations with automatic compensating rollback")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Migrations directory (default: discover prisma/migrations upwards)
    #[arg(long, global = true)]
    migrations_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations, rolling back the failed one on error
    Deploy {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the rollback script of a migration by name
    Rollback {
        /// Migration directory name (e.g. "20240105000000_add_col")
        migration: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the latest unfinished migration recorded in _prisma_migrations
    Status,

    /// List the recent migrations the fallback rollback would consider
    Candidates {
        /// Number of migrations to list (default: migrations.candidate_limit)
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    dotenv::dotenv().ok();

    // Initialize logging
    let default_filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            exit_code::USAGE
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Deploy { yes, json } => handle_deploy(&config, yes, json),
        Commands::Rollback { migration, yes } => handle_rollback(&config, &migration, yes),
        Commands::Status => handle_status(&config),
        Commands::Candidates { limit } => handle_candidates(&config, limit),
    }
}

/// Configuration file and `BACKOUT__*` env, overridden by flags and the usual URL variables
fn load_config(cli: &Cli) -> anyhow::Result<BackoutConfig> {
    let mut config = BackoutConfig::load().context("Failed to load configuration")?;

    if let Some(url) = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("BACKOUT_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        config.database.url = url;
    }
    if let Some(dir) = &cli.migrations_dir {
        config.migrations.dir = Some(dir.clone());
    }

    config.validate().context("Invalid configuration")?;
    log::debug!(
        "Migration command: {}, candidate limit: {}",
        config.migrations.command.join(" "),
        config.migrations.candidate_limit
    );
    Ok(config)
}

fn migrations_root(config: &BackoutConfig) -> anyhow::Result<PathBuf> {
    Ok(MigratorSettings::from_config(config)?.resolve_root()?)
}

fn confirm(question: &str, yes: bool) -> anyhow::Result<bool> {
    match prompt::confirm(question, yes) {
        Ok(()) => Ok(true),
        Err(PromptError::Declined) => {
            log::warn!("Declined: {question}");
            println!("Aborted");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn handle_deploy(config: &BackoutConfig, yes: bool, json: bool) -> anyhow::Result<i32> {
    if !confirm("Apply pending migrations?", yes)? {
        return Ok(exit_code::USAGE);
    }

    let result = deploy_with_rollback(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", report::deploy(&result));
    }

    Ok(if result.success() {
        exit_code::SUCCESS
    } else {
        exit_code::MIGRATION_FAILED
    })
}

fn handle_rollback(config: &BackoutConfig, migration: &str, yes: bool) -> anyhow::Result<i32> {
    let root = migrations_root(config)?;
    log::debug!("Migrations root: {}", root.display());

    if !confirm(&format!("Run the rollback script of `{migration}`?"), yes)? {
        return Ok(exit_code::USAGE);
    }

    let connection = connect(&config.database.url).context("Error connecting to database")?;
    let outcome = rollback_migration(&connection, &root, migration);
    print!("{}", report::rollback(&outcome));

    Ok(match outcome {
        RollbackOutcome::Completed { .. } => exit_code::SUCCESS,
        _ => exit_code::MIGRATION_FAILED,
    })
}

fn handle_status(config: &BackoutConfig) -> anyhow::Result<i32> {
    let root = migrations_root(config)?;
    let connection = connect(&config.database.url).context("Error connecting to database")?;

    let record = connection
        .latest_unfinished()
        .context("Failed to query _prisma_migrations")?;
    print!("{}", report::status(&root, record.as_ref()));

    Ok(if record.is_some() {
        exit_code::MIGRATION_FAILED
    } else {
        exit_code::SUCCESS
    })
}

fn handle_candidates(config: &BackoutConfig, limit: Option<usize>) -> anyhow::Result<i32> {
    let root = migrations_root(config)?;
    let limit = limit.unwrap_or(config.migrations.candidate_limit);

    let names = recent_candidates(&root, limit);
    print!("{}", report::candidates(&root, &names));
    Ok(exit_code::SUCCESS)
}
