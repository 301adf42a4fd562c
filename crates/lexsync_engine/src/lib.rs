//! # LexSync Engine
//!
//! Client-side bidirectional synchronization for the LexDraft template
//! library.
//!
//! This crate provides:
//! - Sync state machine (idle → syncing → idle, with error/offline)
//! - Coalesced change tracking with optimistic local status
//! - Push/pull reconciliation with last-write-wins merge
//! - Durable state persistence (cursor + pending queue)
//! - Scheduling and session-lifecycle hooks
//!
//! ## Architecture
//!
//! The engine implements a **push-then-pull** synchronization model:
//! 1. Push the coalesced local change queue
//! 2. Pull server changes since the last server-issued cursor
//! 3. Merge per record by `updated_at` (last write wins)
//!
//! Pushing first means the follow-up pull does not re-download data
//! the client just uploaded.
//!
//! ## Key Invariants
//!
//! - At most one queued change per record id
//! - `last_sync_at` is server-issued and monotonically non-decreasing
//! - Push and pull never overlap (single-flight, drop on contention)
//! - Every failure leaves the queue intact for the next trigger
//! - No failure escapes the caller-facing operations as an error

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod error;
mod scheduler;
mod state;
mod store;
mod transport;

pub use collection::{MemoryModelStore, ModelStore};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use scheduler::SyncScheduler;
pub use state::{SyncEngine, SyncOutcome, SyncState};
pub use store::{JsonFileStore, MemoryStateStore, StateStore, LAST_SYNC_KEY, QUEUE_KEY};
pub use transport::{MockTransport, SyncTransport};
