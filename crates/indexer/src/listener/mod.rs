//! Event ingestion for scorer contracts and ledger records.
//!
//! This module provides:
//! - Record type definitions and parsing
//! - A JSONL record source
//! - The dispatcher routing records to handlers
//! - Sync engine for in-order processing with a resumable cursor

pub mod dispatch;
pub mod events;
pub mod source;
pub mod sync;

pub use dispatch::{DispatchOptions, Dispatcher};
pub use events::{ContractEvent, IndexedRecord};
pub use source::{EventSource, JsonlSource};
pub use sync::{SyncEngine, SyncStats};
