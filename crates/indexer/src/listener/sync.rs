//! Sync engine: feeds source records through the dispatcher in order.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::dispatch::{DispatchOptions, Dispatcher};
use super::events::IndexedRecord;
use super::source::EventSource;
use crate::config::SyncConfig;
use crate::handlers::{HandlerError, Outcome};
use crate::storage::Storage;

/// Counters for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records handed to the dispatcher
    pub processed: u64,
    /// Records that produced writes
    pub applied: u64,
    /// Records dropped by a handler
    pub skipped: u64,
    /// Malformed records passed over with `skip_malformed`
    pub failed: u64,
    /// Records at or before the stored cursor
    pub replayed: u64,
}

/// Sync engine applies records one at a time and advances the stored
/// cursor after each one.
///
/// A restart replays the source from the top; records up to and including
/// the stored cursor are passed over without touching the store.
pub struct SyncEngine<R: EventSource> {
    source: R,
    storage: Storage,
    dispatcher: Dispatcher<Storage>,
    config: SyncConfig,
    resume_after: Option<(u32, String)>,
}

impl<R: EventSource> SyncEngine<R> {
    /// Create a new sync engine.
    pub fn new(source: R, storage: Storage, options: DispatchOptions, config: SyncConfig) -> Self {
        Self {
            source,
            dispatcher: Dispatcher::new(storage.clone(), options),
            storage,
            config,
            resume_after: None,
        }
    }

    /// Run until the source is drained, or forever in follow mode.
    pub async fn run(&mut self) -> Result<SyncStats> {
        info!("Sync engine starting...");

        let state = self.storage.get_sync_state().await?;
        self.resume_after = state
            .last_event_id
            .clone()
            .map(|id| (state.last_ledger, id));

        info!(
            "Sync status: last_ledger={}, last_event={}, start_ledger={}",
            state.last_ledger,
            state.last_event_id.as_deref().unwrap_or("-"),
            self.config.start_ledger
        );

        let mut stats = SyncStats::default();

        loop {
            let Some(record) = self.source.next().await? else {
                if !self.config.follow {
                    break;
                }
                debug!(
                    "Caught up, waiting {} seconds for new records...",
                    self.config.poll_interval_secs
                );
                tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                continue;
            };

            if self.already_applied(&record) {
                stats.replayed += 1;
                continue;
            }

            self.apply(&record, &mut stats).await?;

            self.storage
                .record_progress(record.ledger(), record.id())
                .await
                .with_context(|| format!("Failed to record progress at {}", record.id()))?;
        }

        info!(
            "Sync complete: {} processed ({} applied, {} skipped, {} failed), {} replayed",
            stats.processed, stats.applied, stats.skipped, stats.failed, stats.replayed
        );

        Ok(stats)
    }

    async fn apply(&self, record: &IndexedRecord, stats: &mut SyncStats) -> Result<()> {
        stats.processed += 1;

        match self.dispatcher.dispatch(record).await {
            Ok(Outcome::Applied) => stats.applied += 1,
            Ok(Outcome::Skipped(reason)) => {
                debug!("Record {} skipped: {}", record.id(), reason);
                stats.skipped += 1;
            }
            Err(e) => {
                let malformed = e
                    .downcast_ref::<HandlerError>()
                    .is_some_and(HandlerError::is_malformed);
                if !(malformed && self.config.skip_malformed) {
                    return Err(e).with_context(|| {
                        format!(
                            "Sync stopped at record {} (ledger {})",
                            record.id(),
                            record.ledger()
                        )
                    });
                }
                warn!("Passing over malformed record {}: {}", record.id(), e);
                stats.failed += 1;
            }
        }

        Ok(())
    }

    /// Whether the record is before the configured start or the stored cursor.
    fn already_applied(&mut self, record: &IndexedRecord) -> bool {
        if record.ledger() < self.config.start_ledger {
            return true;
        }

        let Some((ledger, last_id)) = &self.resume_after else {
            return false;
        };

        if record.ledger() < *ledger {
            return true;
        }
        if record.ledger() == *ledger {
            if record.id() == last_id {
                self.resume_after = None;
            }
            return true;
        }

        self.resume_after = None;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::source::JsonlSource;
    use crate::storage::{Account, EntityKind};
    use scorer_core::strkey::{self, StrkeyKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn payment_line(id: &str, ledger: u32, to_seed: u8) -> String {
        let from = strkey::encode(StrkeyKind::Account, &[1; 32]);
        let to = strkey::encode(StrkeyKind::Account, &[to_seed; 32]);
        format!(
            r#"{{"kind":"payment","id":"{}","ledger":{},"from":"{}","to":"{}","amount":"1.0","transaction_hash":"ab"}}"#,
            id, ledger, from, to
        )
    }

    fn sync_config(source: &std::path::Path) -> SyncConfig {
        SyncConfig {
            start_ledger: 0,
            source: source.to_path_buf(),
            follow: false,
            poll_interval_secs: 1,
            skip_malformed: false,
        }
    }

    async fn setup() -> (Storage, NamedTempFile) {
        let db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(db.path()).await.unwrap();
        storage.run_migrations().await.unwrap();
        (storage, db)
    }

    async fn run(storage: &Storage, events: &NamedTempFile, config: SyncConfig) -> Result<SyncStats> {
        let source = JsonlSource::open(events.path(), false).await?;
        let mut engine = SyncEngine::new(source, storage.clone(), DispatchOptions::default(), config);
        engine.run().await
    }

    #[tokio::test]
    async fn test_run_applies_and_records_progress() {
        let (storage, _db) = setup().await;
        let mut events = NamedTempFile::new().unwrap();
        writeln!(events, "{}", payment_line("op-1", 10, 2)).unwrap();
        writeln!(events, "{}", payment_line("op-2", 11, 3)).unwrap();
        events.flush().unwrap();

        let stats = run(&storage, &events, sync_config(events.path())).await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.applied, 2);

        let state = storage.get_sync_state().await.unwrap();
        assert_eq!(state.last_ledger, 11);
        assert_eq!(state.last_event_id.as_deref(), Some("op-2"));
        assert_eq!(storage.count(EntityKind::Payment).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rerun_resumes_after_cursor() {
        let (storage, _db) = setup().await;
        let mut events = NamedTempFile::new().unwrap();
        writeln!(events, "{}", payment_line("op-1", 10, 2)).unwrap();
        writeln!(events, "{}", payment_line("op-2", 10, 3)).unwrap();
        events.flush().unwrap();

        run(&storage, &events, sync_config(events.path())).await.unwrap();

        writeln!(events, "{}", payment_line("op-3", 10, 4)).unwrap();
        writeln!(events, "{}", payment_line("op-4", 12, 5)).unwrap();
        events.flush().unwrap();

        let stats = run(&storage, &events, sync_config(events.path())).await.unwrap();
        assert_eq!(stats.replayed, 2);
        assert_eq!(stats.applied, 2);

        // Sender was first seen at ledger 10 and never replayed.
        let sender = strkey::encode(StrkeyKind::Account, &[1; 32]).to_lowercase();
        let account = storage
            .load_entity(EntityKind::Account, &sender)
            .await
            .unwrap()
            .and_then(<Account as crate::storage::StoredEntity>::from_entity)
            .unwrap();
        assert_eq!(account.first_seen_ledger, 10);
        assert_eq!(account.last_seen_ledger, Some(12));
        assert_eq!(storage.count(EntityKind::Payment).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_start_ledger_filters_older_records() {
        let (storage, _db) = setup().await;
        let mut events = NamedTempFile::new().unwrap();
        writeln!(events, "{}", payment_line("op-1", 5, 2)).unwrap();
        writeln!(events, "{}", payment_line("op-2", 20, 3)).unwrap();
        events.flush().unwrap();

        let mut config = sync_config(events.path());
        config.start_ledger = 10;
        let stats = run(&storage, &events, config).await.unwrap();
        assert_eq!(stats.replayed, 1);
        assert_eq!(stats.applied, 1);
        assert_eq!(storage.count(EntityKind::Payment).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_stops_or_is_passed_over() {
        let (storage, _db) = setup().await;
        let mut events = NamedTempFile::new().unwrap();
        writeln!(events, "{}", payment_line("op-1", 10, 2)).unwrap();
        // `user`/`add` whose value is a u32 instead of an address.
        writeln!(
            events,
            r#"{{"kind":"contract_event","id":"evt-bad","contractId":"CAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSC4","ledger":11,"ledgerClosedAt":"2024-05-01T12:00:00Z","topic":[{{"_arm":"sym","_value":"user"}},{{"_arm":"sym","_value":"add"}}],"value":"AAAAAwAAACo="}}"#
        )
        .unwrap();
        writeln!(events, "{}", payment_line("op-2", 12, 3)).unwrap();
        events.flush().unwrap();

        let err = run(&storage, &events, sync_config(events.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("evt-bad"));
        let state = storage.get_sync_state().await.unwrap();
        assert_eq!(state.last_event_id.as_deref(), Some("op-1"));

        let mut config = sync_config(events.path());
        config.skip_malformed = true;
        let stats = run(&storage, &events, config).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.applied, 1);
        let state = storage.get_sync_state().await.unwrap();
        assert_eq!(state.last_event_id.as_deref(), Some("op-2"));
    }

    #[tokio::test]
    async fn test_foreign_event_with_undecodable_topic_does_not_stop_sync() {
        let (storage, _db) = setup().await;
        let mut events = NamedTempFile::new().unwrap();
        writeln!(events, "{}", payment_line("op-1", 10, 2)).unwrap();
        writeln!(
            events,
            r#"{{"kind":"contract_event","id":"evt-other","contractId":"CAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSC4","ledger":11,"ledgerClosedAt":"2024-05-01T12:00:00Z","topic":[{{"_arm":"sym","_value":"mint"}},{{"_arm":"futureType","_value":1}}],"value":"AAAAAwAAACo="}}"#
        )
        .unwrap();
        writeln!(events, "{}", payment_line("op-2", 12, 3)).unwrap();
        events.flush().unwrap();

        let stats = run(&storage, &events, sync_config(events.path())).await.unwrap();
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
        let state = storage.get_sync_state().await.unwrap();
        assert_eq!(state.last_event_id.as_deref(), Some("op-2"));
    }
}
