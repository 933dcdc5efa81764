//! Sync state storage operations.

use super::{Storage, SyncState};
use anyhow::{Context, Result};
use sqlx::Row;

impl Storage {
    /// Get the current sync state.
    pub async fn get_sync_state(&self) -> Result<SyncState> {
        let row = sqlx::query(
            r#"
            SELECT last_ledger, last_event_id, updated_at
            FROM sync_state
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch sync state")?;

        Ok(SyncState {
            last_ledger: row.get::<i64, _>("last_ledger") as u32,
            last_event_id: row.get("last_event_id"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Update the sync state.
    pub async fn update_sync_state(&self, state: &SyncState) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_state
            SET last_ledger = ?,
                last_event_id = ?,
                updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(i64::from(state.last_ledger))
        .bind(&state.last_event_id)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to update sync state")?;

        Ok(())
    }

    /// Record that every record up to and including `event_id` is applied.
    pub async fn record_progress(&self, ledger: u32, event_id: &str) -> Result<()> {
        self.update_sync_state(&SyncState {
            last_ledger: ledger,
            last_event_id: Some(event_id.to_string()),
            updated_at: chrono::Utc::now().timestamp(),
        })
        .await
    }

    /// Position the cursor just before `start_ledger` on a fresh database.
    ///
    /// Has no effect once any progress has been recorded.
    pub async fn initialize_sync_state(&self, start_ledger: u32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE sync_state
            SET last_ledger = ?,
                updated_at = ?
            WHERE id = 1 AND last_event_id IS NULL AND last_ledger < ?
            "#,
        )
        .bind(i64::from(start_ledger.saturating_sub(1)))
        .bind(now)
        .bind(i64::from(start_ledger.saturating_sub(1)))
        .execute(&self.pool)
        .await
        .context("Failed to initialize sync state")?;

        Ok(())
    }
}
