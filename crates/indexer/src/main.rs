//! Scorer Indexer - scorer/community Soroban event ingestion
//!
//! This binary provides:
//! - In-order application of delivered contract events and ledger records
//! - Entity storage in SQLite
//! - Status reporting of sync progress

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scorer_indexer::config::{Config, LoggingConfig};
use scorer_indexer::listener::{DispatchOptions, JsonlSource, SyncEngine};
use scorer_indexer::storage::Storage;
use tracing::{info, warn};

const DEFAULT_DATABASE_URL: &str = "sqlite://scorer.db";

#[derive(Parser)]
#[command(name = "scorer-indexer")]
#[command(version, about = "Indexer for scorer/community Soroban contract events", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "indexer.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the indexer service
    Run,

    /// Show indexer status and sync progress
    Status,

    /// Initialize the database
    InitDb {
        /// Database URL
        #[arg(long, default_value = DEFAULT_DATABASE_URL)]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it loads; errors
    // surface again once the command itself reads it.
    let logging = Config::from_file(&cli.config)
        .map(|config| config.logging)
        .unwrap_or_default();
    init_logging(cli.debug, &logging)?;

    info!("Scorer Indexer starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_indexer(&cli.config).await?,
        Commands::Status => show_status(&cli.config).await?,
        Commands::InitDb { database_url } => init_database(&database_url).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("scorer_indexer=debug,scorer_core=debug,sqlx=warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "scorer_indexer={level},scorer_core={level}",
                level = logging.level
            ))
        })
    };

    let fmt_layer = if logging.format == "json" {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).with_line_number(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Main indexer service - runs the sync engine until done or interrupted
async fn run_indexer(config_path: &str) -> Result<()> {
    info!("Starting indexer service with config: {}", config_path);

    let config = Config::from_file(config_path).context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!(
        "  Factory: {}",
        config.contracts.scorer_factory.as_deref().unwrap_or("any")
    );
    info!("  Token contracts: {}", config.contracts.token_contracts.len());
    info!("  Database: {}", config.database.url);
    info!("  Source: {}", config.sync.source.display());
    info!("  Start ledger: {}", config.sync.start_ledger);
    info!("  Member removal: {:?}", config.indexer.member_removal);

    // Initialize database with configured pool settings
    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    info!("Database initialized");

    storage
        .initialize_sync_state(config.sync.start_ledger)
        .await
        .context("Failed to initialize sync state")?;

    let source = JsonlSource::open(&config.sync.source, config.sync.follow)
        .await
        .context("Failed to open event source")?;

    let mut sync_engine = SyncEngine::new(
        source,
        storage.clone(),
        DispatchOptions::from_config(&config),
        config.sync.clone(),
    );

    // Spawn event sync task
    let sync_handle = tokio::spawn(async move { sync_engine.run().await });

    info!("Indexer is running. Press Ctrl+C to stop.");

    // Wait for either Ctrl+C or the sync task to finish
    tokio::select! {
        result = sync_handle => {
            storage.close().await;
            match result {
                Ok(Ok(stats)) => {
                    info!(
                        "Sync engine finished: {} applied, {} skipped, {} failed",
                        stats.applied, stats.skipped, stats.failed
                    );
                    Ok(())
                }
                Ok(Err(e)) => {
                    Err(e).context("Sync engine failed")
                }
                Err(e) => {
                    Err(anyhow::anyhow!("Sync task panicked: {}", e))
                }
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, gracefully shutting down...");
            storage.close().await;
            Ok(())
        }
    }
}

/// Show indexer status and sync progress
async fn show_status(config_path: &str) -> Result<()> {
    info!("Checking indexer status");

    // Fall back to the default database ONLY if the config file doesn't exist
    let (database_url, max_conn, min_conn) = match Config::from_file(config_path) {
        Ok(config) => {
            info!("Using database from config: {}", config.database.url);
            (
                config.database.url,
                Some(config.database.max_connections),
                Some(config.database.min_connections),
            )
        }
        Err(e) => {
            // Config::from_file wraps errors with context, so walk the chain
            let is_not_found = e.chain().any(|cause| {
                cause
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
            });

            if is_not_found {
                warn!(
                    "Config file not found, using default database: {}",
                    DEFAULT_DATABASE_URL
                );
                (DEFAULT_DATABASE_URL.to_string(), None, None)
            } else {
                return Err(e).context("Failed to load config file");
            }
        }
    };

    let storage = Storage::new(&database_url, max_conn, min_conn)
        .await
        .context("Failed to connect to database")?;

    // Run migrations to ensure schema exists (handles fresh database)
    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let sync_state = storage.get_sync_state().await?;
    let stats = storage.stats().await?;

    println!("\n=== Scorer Indexer Status ===\n");
    println!("Sync Progress:");
    println!("  Last Ledger: {}", sync_state.last_ledger);
    println!(
        "  Last Record: {}",
        sync_state.last_event_id.as_deref().unwrap_or("none")
    );
    println!(
        "  Last Updated: {}",
        chrono::DateTime::from_timestamp(sync_state.updated_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );

    println!("\nDatabase Statistics:");
    println!("  Communities: {}", stats.community_count);
    println!("  Users: {}", stats.user_count);
    println!("  Memberships: {}", stats.member_count);
    println!("  Badges: {}", stats.badge_count);
    println!("  Accounts: {}", stats.account_count);
    println!();

    storage.close().await;

    Ok(())
}

/// Initialize the database
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = Storage::new(database_url, None, None)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    // Verify database is working
    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Communities: {}", stats.community_count);
    info!("  Users: {}", stats.user_count);
    info!("  Last ledger: {}", stats.last_ledger);

    storage.close().await;

    Ok(())
}
