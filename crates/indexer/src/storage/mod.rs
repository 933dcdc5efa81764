//! Storage layer for the scorer indexer.
//!
//! This module provides:
//! - The [`EntityStore`] contract the event handlers are written against
//! - [`Storage`], the SQLite implementation (one table per entity)
//! - [`MemoryStore`], an in-process implementation
//! - Sync state (indexer progress tracking)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod entities;
pub mod memory;
pub mod sync;
pub mod types;

pub use memory::MemoryStore;
pub use types::*;

/// Point lookups and batched writes over entities.
///
/// Implementations must apply a [`ChangeSet`] atomically: either every
/// mutation lands or none does.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch an entity by kind and id.
    async fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>>;

    /// Apply a batch of upserts and removals.
    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}

/// Database storage for the indexer.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// This will create the database file if it doesn't exist.
    ///
    /// # Arguments
    /// * `database_url` - SQLite database URL (e.g., "sqlite://scorer.db")
    /// * `max_connections` - Pool upper bound (default 5)
    /// * `min_connections` - Pool lower bound (default 1)
    ///
    /// # Example
    /// ```no_run
    /// # use scorer_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://scorer.db", None, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance with a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let database_url = format!("sqlite://{}", path.display());
        Self::new(&database_url, None, None).await
    }

    /// Run database migrations.
    ///
    /// This should be called once during initialization to ensure the schema is up to date.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let mut counts = Vec::with_capacity(5);
        for kind in [
            EntityKind::User,
            EntityKind::Community,
            EntityKind::CommunityMember,
            EntityKind::Badge,
            EntityKind::Account,
        ] {
            counts.push(self.count(kind).await?);
        }

        let sync_state = self.get_sync_state().await?;

        Ok(DatabaseStats {
            user_count: counts[0],
            community_count: counts[1],
            member_count: counts[2],
            badge_count: counts[3],
            account_count: counts[4],
            last_ledger: sync_state.last_ledger,
        })
    }

    /// Count rows of one entity kind.
    pub async fn count(&self, kind: EntityKind) -> Result<u64> {
        // Table names come from a closed enum, never from input.
        let sql = format!("SELECT COUNT(*) FROM {}", kind.as_str());
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", kind))?;
        Ok(count as u64)
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

#[async_trait]
impl EntityStore for Storage {
    async fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        self.load_entity(kind, id).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        self.commit_changes(changes).await
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of users
    pub user_count: u64,

    /// Total number of communities
    pub community_count: u64,

    /// Total number of membership rows
    pub member_count: u64,

    /// Total number of badges (including removed)
    pub badge_count: u64,

    /// Total number of ledger accounts
    pub account_count: u64,

    /// Last processed ledger
    pub last_ledger: u32,
}

/// Convert stored unix seconds back to a timestamp.
pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_storage_creation() {
        let _temp_db = NamedTempFile::new().unwrap();
        let db_path = _temp_db.path();

        let storage = Storage::new_with_path(db_path).await.unwrap();
        storage.run_migrations().await.unwrap();

        storage.health_check().await.unwrap();

        storage.close().await;
    }

    #[tokio::test]
    async fn test_database_stats() {
        let _temp_db = NamedTempFile::new().unwrap();
        let db_path = _temp_db.path();

        let storage = Storage::new_with_path(db_path).await.unwrap();
        storage.run_migrations().await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.user_count, 0);
        assert_eq!(stats.community_count, 0);
        assert_eq!(stats.member_count, 0);
        assert_eq!(stats.badge_count, 0);
        assert_eq!(stats.account_count, 0);
        assert_eq!(stats.last_ledger, 0);

        storage.close().await;
    }

    #[test]
    fn test_from_unix() {
        assert_eq!(from_unix(0), DateTime::<Utc>::default());
        assert_eq!(from_unix(1_700_000_000).timestamp(), 1_700_000_000);
    }
}
