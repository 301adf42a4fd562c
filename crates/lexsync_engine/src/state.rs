//! Sync engine state machine.

use crate::collection::ModelStore;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::{StateStore, LAST_SYNC_KEY, QUEUE_KEY};
use crate::transport::SyncTransport;
use chrono::{DateTime, Utc};
use lexsync_protocol::{
    ChangeOp, ChangeQueue, Model, ModelId, PendingChange, PullRequest, PushRequest, SyncStatus,
    TrackOutcome,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// The externally observable state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing in flight.
    Idle,
    /// A push or pull is in flight.
    Syncing,
    /// The last operation failed; the queue is intact for retry.
    Error,
    /// The connectivity signal reports offline.
    Offline,
}

/// Caller-facing result of a push, pull or sync call.
///
/// Failures never escape as errors; they surface here and through
/// [`SyncEngine::last_error`]. A precondition no-op (offline, not
/// authenticated, nothing queued, another cycle in flight) is a
/// success with zero counts.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Whether the operation completed (or had nothing to do).
    pub success: bool,
    /// Number of changes the server acknowledged.
    pub pushed: usize,
    /// Number of server records merged locally.
    pub pulled: usize,
    /// Failure description, if any.
    pub message: Option<String>,
}

impl SyncOutcome {
    fn noop() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            message: Some(message),
            ..Self::default()
        }
    }
}

/// The sync engine reconciling the local template collection with the
/// remote store.
///
/// One long-lived instance per session; all state lives here, never in
/// ambient globals. Every method takes `&self` — shared access is
/// mediated by locks and atomics internally.
pub struct SyncEngine<T: SyncTransport, M: ModelStore, S: StateStore> {
    config: SyncConfig,
    transport: T,
    models: M,
    store: S,
    queue: RwLock<ChangeQueue>,
    state: RwLock<SyncState>,
    last_sync_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    online: AtomicBool,
    authenticated: AtomicBool,
    in_flight: AtomicBool,
}

impl<T: SyncTransport, M: ModelStore, S: StateStore> SyncEngine<T, M, S> {
    /// Creates an engine, rehydrating the last-sync marker and the
    /// pending queue from the durable store.
    pub fn new(config: SyncConfig, transport: T, models: M, store: S) -> SyncResult<Self> {
        let last_sync_at = match store.get(LAST_SYNC_KEY)? {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| SyncError::storage(format!("bad last-sync marker: {e}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let queue = match store.get(QUEUE_KEY)? {
            Some(raw) => {
                let entries: Vec<PendingChange> = serde_json::from_str(&raw)?;
                ChangeQueue::from_entries(entries)
            }
            None => ChangeQueue::new(),
        };

        if !queue.is_empty() {
            debug!(pending = queue.len(), "rehydrated pending changes");
        }

        let initial = if config.online {
            SyncState::Idle
        } else {
            SyncState::Offline
        };

        Ok(Self {
            online: AtomicBool::new(config.online),
            authenticated: AtomicBool::new(config.authenticated),
            config,
            transport,
            models,
            store,
            queue: RwLock::new(queue),
            state: RwLock::new(initial),
            last_sync_at: RwLock::new(last_sync_at),
            last_error: RwLock::new(None),
            in_flight: AtomicBool::new(false),
        })
    }

    /// The configuration this engine runs with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The transport (test hook).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The local model collection.
    pub fn models(&self) -> &M {
        &self.models
    }

    /// Current engine state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// The most recent server-issued clock value accepted here.
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_at.read()
    }

    /// Number of queued, unacknowledged changes.
    pub fn pending_count(&self) -> usize {
        self.queue.read().len()
    }

    /// Last failure message, cleared on the next successful operation.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Whether the connectivity signal currently reports online.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether the session is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Updates the authentication flag.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    // ----- change tracking -------------------------------------------------

    /// Records that `model` must eventually be reconciled with the
    /// server: marks the local record pending, coalesces the queue
    /// entry and persists the queue.
    pub fn track_change(&self, operation: ChangeOp, model: Model) -> TrackOutcome {
        let id = model.id;
        self.models
            .patch(&id, &|m| m.sync_status = SyncStatus::Pending);

        let outcome = self.queue.write().track(operation, model);
        if outcome == TrackOutcome::Elided {
            // The server never learned of this record; drop the local
            // copy along with the queue entry.
            self.models.remove(&id);
        }

        if let Err(error) = self.persist_queue() {
            warn!(%error, "failed to persist pending queue");
            *self.last_error.write() = Some(error.to_string());
        }
        outcome
    }

    /// Adds a record locally and queues its create.
    pub fn add_model_with_sync(&self, model: Model) -> ModelId {
        let id = model.id;
        self.models.upsert(model.clone());
        self.track_change(ChangeOp::Create, model);
        id
    }

    /// Replaces a record locally and queues its update.
    pub fn update_model_with_sync(&self, mut model: Model) {
        model.touch();
        self.models.upsert(model.clone());
        self.track_change(ChangeOp::Update, model);
    }

    /// Tombstones a record locally and queues its delete. The local
    /// copy is removed once the server acknowledges, or immediately if
    /// the record never reached the server. Returns false for an
    /// absent id.
    pub fn delete_model_with_sync(&self, id: &ModelId) -> bool {
        if !self.models.patch(id, &|m| m.tombstone()) {
            return false;
        }
        let Some(snapshot) = self.models.all().into_iter().find(|m| m.id == *id) else {
            return false;
        };
        self.track_change(ChangeOp::Delete, snapshot);
        true
    }

    // ----- push / pull / sync ----------------------------------------------

    /// Sends the entire pending queue once; acknowledged entries are
    /// marked synced and dropped, and a conflict report triggers a
    /// corrective pull before this call returns.
    pub fn push(&self) -> SyncOutcome {
        if !self.can_attempt() || self.queue.read().is_empty() {
            return SyncOutcome::noop();
        }
        if !self.try_begin() {
            return SyncOutcome::noop();
        }
        let outcome = self.push_locked();
        self.end();
        outcome
    }

    /// Fetches everything the server changed since the last marker and
    /// merges it into the local collection, last write wins.
    pub fn pull(&self) -> SyncOutcome {
        if !self.can_attempt() {
            return SyncOutcome::noop();
        }
        if !self.try_begin() {
            return SyncOutcome::noop();
        }
        let outcome = self.pull_locked();
        self.end();
        outcome
    }

    /// Runs push then pull, in that order, so the server has absorbed
    /// local writes before the client asks what changed. A hard push
    /// failure short-circuits the pull.
    pub fn sync(&self) -> SyncOutcome {
        if !self.can_attempt() {
            return SyncOutcome::noop();
        }
        if !self.try_begin() {
            return SyncOutcome::noop();
        }

        let pushed = self.push_locked();
        if !pushed.success {
            self.end();
            return pushed;
        }
        let pulled = self.pull_locked();
        self.end();

        SyncOutcome {
            success: pulled.success,
            pushed: pushed.pushed,
            pulled: pushed.pulled + pulled.pulled,
            message: pulled.message,
        }
    }

    fn push_locked(&self) -> SyncOutcome {
        let changes = self.queue.read().snapshot();
        if changes.is_empty() {
            return SyncOutcome::noop();
        }

        self.set_state(SyncState::Syncing);
        self.clear_error();
        debug!(changes = changes.len(), "pushing queued changes");

        let response = match self.transport.push(&PushRequest::new(changes.clone())) {
            Ok(response) => response,
            Err(error) => return self.fail(&error),
        };

        let results = response.results;
        let acknowledged: Vec<ModelId> = results.acknowledged().copied().collect();

        // The acknowledgment covers the pushed snapshots only. An entry
        // re-tracked while the push was on the wire is not settled: it
        // stays queued and Pending for the next push.
        let settled = self.queue.write().settle(&changes, &acknowledged);

        for id in &settled {
            self.models.patch(id, &|m| {
                m.sync_status = SyncStatus::Synced;
                m.sync_version += 1;
            });
        }
        // A settled delete also retires the local tombstone.
        for id in &results.deleted {
            if settled.contains(id) {
                self.models.remove(id);
            }
        }

        if let Err(error) = self.persist_queue() {
            return self.fail(&error);
        }
        if let Err(error) = self.persist_last_sync(response.server_time) {
            return self.fail(&error);
        }

        let mut outcome = SyncOutcome {
            success: true,
            pushed: acknowledged.len(),
            ..SyncOutcome::default()
        };

        if !results.conflicts.is_empty() {
            // Conflicts are not errors: the server's copy is
            // authoritative and a pull re-absorbs it.
            warn!(
                conflicts = results.conflicts.len(),
                "server reported conflicts, pulling authoritative state"
            );
            let corrective = self.pull_locked();
            outcome.pulled = corrective.pulled;
            outcome.success = corrective.success;
            outcome.message = corrective.message;
            return outcome;
        }

        self.set_state(SyncState::Idle);
        outcome
    }

    fn pull_locked(&self) -> SyncOutcome {
        self.set_state(SyncState::Syncing);
        self.clear_error();

        let request = PullRequest::new(self.last_sync_at());
        let response = match self.transport.pull(&request) {
            Ok(response) => response,
            Err(error) => return self.fail(&error),
        };

        let pulled = response.models.len();
        let mut merged: HashMap<ModelId, Model> = self
            .models
            .all()
            .into_iter()
            .map(|model| (model.id, model))
            .collect();

        for mut server in response.models {
            if server.deleted_at.is_some() {
                // Tombstones win regardless of local timestamps;
                // removing an absent id is a no-op.
                merged.remove(&server.id);
                continue;
            }
            match merged.get(&server.id) {
                None => {
                    server.sync_status = SyncStatus::Synced;
                    merged.insert(server.id, server);
                }
                Some(local) if server.updated_at > local.updated_at => {
                    server.sync_status = SyncStatus::Synced;
                    server.sync_version = local.sync_version;
                    merged.insert(server.id, server);
                }
                // Local is newer or equal; it will push later.
                Some(_) => {}
            }
        }

        self.models.replace_all(merged.into_values().collect());
        if let Err(error) = self.persist_last_sync(response.server_time) {
            return self.fail(&error);
        }

        self.set_state(SyncState::Idle);
        debug!(pulled, "merged server changes");
        SyncOutcome {
            success: true,
            pulled,
            ..SyncOutcome::default()
        }
    }

    // ----- lifecycle triggers ----------------------------------------------

    /// Initial-mount trigger: one pull, only if authenticated and
    /// online.
    pub fn on_mount(&self) -> SyncOutcome {
        self.pull()
    }

    /// Connectivity-restored trigger: syncs immediately when changes
    /// are queued.
    pub fn handle_online(&self) -> SyncOutcome {
        self.online.store(true, Ordering::SeqCst);
        if self.state() == SyncState::Offline {
            self.set_state(SyncState::Idle);
        }
        if self.pending_count() > 0 {
            self.sync()
        } else {
            SyncOutcome::noop()
        }
    }

    /// Connectivity-lost trigger.
    pub fn handle_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
        if !self.in_flight.load(Ordering::SeqCst) {
            self.set_state(SyncState::Offline);
        }
    }

    /// Session-teardown trigger: best-effort, unverified send of the
    /// current queue. No acknowledgment is processed — this is a
    /// last-chance flush, not a commit. Returns true when the caller
    /// should warn about unsynced changes.
    pub fn flush_on_unload(&self) -> bool {
        let changes = self.queue.read().snapshot();
        if changes.is_empty() {
            return false;
        }
        debug!(changes = changes.len(), "best-effort flush on unload");
        self.transport.send_beacon(&PushRequest::new(changes));
        true
    }

    // ----- internals -------------------------------------------------------

    fn can_attempt(&self) -> bool {
        self.is_authenticated() && self.is_online()
    }

    /// Non-blocking try-lock; contention drops the trigger so the next
    /// scheduled one retries, it never queues.
    fn try_begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn end(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn fail(&self, error: &SyncError) -> SyncOutcome {
        let message = error.to_string();
        warn!(%message, "sync step failed");
        let state = if self.is_online() {
            SyncState::Error
        } else {
            SyncState::Offline
        };
        self.set_state(state);
        *self.last_error.write() = Some(message.clone());
        SyncOutcome::failure(message)
    }

    fn persist_queue(&self) -> SyncResult<()> {
        let queue = self.queue.read();
        if queue.is_empty() {
            self.store.remove(QUEUE_KEY)
        } else {
            let serialized = serde_json::to_string(&queue.snapshot())?;
            self.store.set(QUEUE_KEY, &serialized)
        }
    }

    /// Advances the marker to the server's clock. Never regresses and
    /// never uses the client's own clock, so skew cannot invalidate
    /// the cursor.
    fn persist_last_sync(&self, server_time: DateTime<Utc>) -> SyncResult<()> {
        let mut last = self.last_sync_at.write();
        if last.is_none_or(|previous| server_time >= previous) {
            *last = Some(server_time);
            self.store.set(LAST_SYNC_KEY, &server_time.to_rfc3339())?;
        }
        Ok(())
    }
}
