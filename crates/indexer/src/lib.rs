//! Scorer/community event indexing.
//!
//! This crate projects Soroban scorer contract events (and the Horizon
//! payments and effects that accompany them) into a relational entity
//! store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  scorer-indexer                      │
//! │                                      │
//! │  ┌──────────────┐                    │
//! │  │ EventSource  │ ← JSONL records    │
//! │  └──────┬───────┘                    │
//! │         │ one record at a time       │
//! │  ┌──────▼───────┐                    │
//! │  │  Dispatcher  │ topics → handler   │
//! │  └──────┬───────┘                    │
//! │         │                            │
//! │  ┌──────▼───────┐   ┌─────────────┐  │
//! │  │   Handlers   │──▶│   Session   │  │
//! │  │ (decode args)│   │ (per event) │  │
//! │  └──────────────┘   └──────┬──────┘  │
//! │                            │ commit  │
//! │                     ┌──────▼──────┐  │
//! │                     │ EntityStore │  │
//! │                     │  (SQLite)   │  │
//! │                     └─────────────┘  │
//! └──────────────────────────────────────┘
//! ```
//!
//! Records are applied strictly in order. Each record commits as one batch
//! and the sync cursor advances after it, so a restart resumes after the
//! last committed record.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod reconciler;
pub mod storage;

// Re-export common types
pub use error::HandlerError;
pub use handlers::{EventContext, EventKind, Outcome, RemovalPolicy, SkipReason};
pub use listener::{DispatchOptions, Dispatcher, IndexedRecord, SyncEngine};
pub use reconciler::Session;
pub use storage::{EntityStore, MemoryStore, Storage};
