//! # LexSync Protocol
//!
//! Sync protocol types for the LexDraft template library.
//!
//! This crate provides:
//! - [`Model`] records with tombstones and local sync bookkeeping
//! - [`PendingChange`] snapshots of unsent local mutations
//! - [`ChangeQueue`], the coalescing queue of pending changes
//! - Wire messages (push, pull) with JSON codecs
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod messages;
mod model;
mod queue;

pub use messages::{ErrorResponse, PullRequest, PullResponse, PushRequest, PushResponse, PushResults};
pub use model::{ChangeOp, Model, ModelId, PendingChange, SyncStatus};
pub use queue::{ChangeQueue, TrackOutcome};
