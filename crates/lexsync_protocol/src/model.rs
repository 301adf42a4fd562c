//! Template records and pending changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a template record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(Uuid);

impl ModelId {
    /// Creates a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ModelId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Local sync bookkeeping for a record.
///
/// Never sent to the server; `Pending` holds exactly while a queued
/// change for the record is unacknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// The record has never been acknowledged by the server.
    #[default]
    Unsynced,
    /// A queued change for the record is awaiting acknowledgment.
    Pending,
    /// The server has acknowledged the record's latest pushed state.
    Synced,
}

/// A drafting template record.
///
/// `title`, `content`, `keywords` and `category` are opaque payload to
/// the sync engine; only `id`, `updated_at` and `deleted_at` take part
/// in reconciliation. `updated_at` is set by whichever side last wrote
/// the record and is the single source of truth for conflict ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Stable identifier, immutable once created.
    pub id: ModelId,
    /// Display title.
    pub title: String,
    /// Template body.
    #[serde(default)]
    pub content: String,
    /// Search keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Optional grouping category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Timestamp of the last write, on either side.
    pub updated_at: DateTime<Utc>,
    /// Tombstone marker; a present value means the record is
    /// soft-deleted and never returned as live data again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Local-only bookkeeping, not part of the wire format.
    #[serde(skip)]
    pub sync_status: SyncStatus,
    /// Local acknowledgment counter; advisory only, never used for
    /// conflict arbitration.
    #[serde(skip)]
    pub sync_version: u64,
}

impl Model {
    /// Creates a new unsynced record stamped with the current time.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: ModelId::new(),
            title: title.into(),
            content: content.into(),
            keywords: Vec::new(),
            category: None,
            updated_at: Utc::now(),
            deleted_at: None,
            sync_status: SyncStatus::Unsynced,
            sync_version: 0,
        }
    }

    /// Sets the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the keywords.
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Stamps the record as locally written now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Turns the record into a tombstone, stamping both timestamps so
    /// the deletion carries a meaningful ordering point.
    pub fn tombstone(&mut self) {
        let now = Utc::now();
        self.updated_at = now;
        self.deleted_at = Some(now);
    }

    /// Returns true if the record is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// The kind of local mutation queued for the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    /// The record was created locally.
    Create,
    /// The record was edited locally.
    Update,
    /// The record was deleted locally.
    Delete,
}

/// A queued local change awaiting server acknowledgment.
///
/// Carries a full snapshot of the record at the moment the change was
/// queued; later edits to the same record re-coalesce the entry rather
/// than adding a second one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// What the server should do with the snapshot.
    pub operation: ChangeOp,
    /// The record as it stood when queued.
    pub model: Model,
}

impl PendingChange {
    /// Creates a new pending change.
    pub fn new(operation: ChangeOp, model: Model) -> Self {
        Self { operation, model }
    }

    /// The id of the record this change concerns.
    pub fn id(&self) -> ModelId {
        self.model.id
    }
}
