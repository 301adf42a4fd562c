//! Wire messages exchanged with the remote template store.

use crate::model::{Model, ModelId, PendingChange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Push request: the entire coalesced change queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Queued changes, at most one per record id.
    pub changes: Vec<PendingChange>,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(changes: Vec<PendingChange>) -> Self {
        Self { changes }
    }
}

/// Per-id outcome sets reported by the server for a push.
///
/// Ids absent from all four sets were silently dropped by the server
/// and stay queued on the client for the next cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResults {
    /// Records the server created.
    pub created: Vec<ModelId>,
    /// Records the server updated.
    pub updated: Vec<ModelId>,
    /// Records the server deleted.
    pub deleted: Vec<ModelId>,
    /// Records whose server copy is authoritative; resolved by a
    /// follow-up pull, never an error.
    pub conflicts: Vec<ModelId>,
}

impl PushResults {
    /// Ids the server acknowledged: created, updated and deleted.
    pub fn acknowledged(&self) -> impl Iterator<Item = &ModelId> {
        self.created
            .iter()
            .chain(self.updated.iter())
            .chain(self.deleted.iter())
    }

    /// Number of acknowledged ids.
    pub fn acknowledged_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// Push response from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Per-id outcomes.
    pub results: PushResults,
    /// The server's current clock; becomes the client's new cursor.
    pub server_time: DateTime<Utc>,
}

impl PushResponse {
    /// Creates a push response.
    pub fn new(results: PushResults, server_time: DateTime<Utc>) -> Self {
        Self {
            results,
            server_time,
        }
    }
}

/// Pull request: the client's incremental-sync cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Last server clock value this client accepted; `None` requests
    /// everything.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Creates a pull request.
    pub fn new(last_sync_at: Option<DateTime<Utc>>) -> Self {
        Self { last_sync_at }
    }
}

/// Pull response from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Records changed since the cursor; tombstones carry `deletedAt`.
    pub models: Vec<Model>,
    /// The server's current clock; becomes the client's new cursor.
    pub server_time: DateTime<Utc>,
    /// Number of returned records.
    pub count: usize,
}

impl PullResponse {
    /// Creates a pull response; `count` is derived from `models`.
    pub fn new(models: Vec<Model>, server_time: DateTime<Utc>) -> Self {
        let count = models.len();
        Self {
            models,
            server_time,
            count,
        }
    }
}

/// Body carried by non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure description.
    pub error: String,
}
