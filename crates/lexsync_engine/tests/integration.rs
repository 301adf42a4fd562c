//! Integration tests: the engine against an in-memory remote store.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use lexsync_engine::{
    JsonFileStore, MemoryModelStore, MemoryStateStore, ModelStore, SyncConfig, SyncEngine,
    SyncError, SyncResult, SyncState, SyncTransport,
};
use lexsync_protocol::{
    Model, ModelId, PullRequest, PullResponse, PushRequest, PushResponse, PushResults, SyncStatus,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Barrier};

/// A record as the server stores it: the payload plus the server clock
/// value at which it last changed, used as the pull cursor.
#[derive(Clone)]
struct ServerRecord {
    model: Model,
    changed_at: DateTime<Utc>,
}

/// An in-memory remote store with a monotonic server clock.
#[derive(Default)]
struct InMemoryServer {
    records: RwLock<HashMap<ModelId, ServerRecord>>,
    ticks: AtomicI64,
}

impl InMemoryServer {
    fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> DateTime<Utc> {
        let seconds = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap() + ChronoDuration::seconds(seconds)
    }

    /// Applies an edit as if another device wrote it.
    fn write_external(&self, model: Model) {
        let changed_at = self.tick();
        self.records
            .write()
            .insert(model.id, ServerRecord { model, changed_at });
    }

    fn get(&self, id: &ModelId) -> Option<Model> {
        self.records.read().get(id).map(|r| r.model.clone())
    }

    fn handle_push(&self, request: &PushRequest) -> PushResponse {
        let mut results = PushResults::default();
        let changed_at = self.tick();
        let mut records = self.records.write();

        for change in &request.changes {
            let id = change.id();
            match change.operation {
                lexsync_protocol::ChangeOp::Create => {
                    records.insert(
                        id,
                        ServerRecord {
                            model: change.model.clone(),
                            changed_at,
                        },
                    );
                    results.created.push(id);
                }
                lexsync_protocol::ChangeOp::Update => {
                    let conflicted = records
                        .get(&id)
                        .is_some_and(|existing| existing.model.updated_at > change.model.updated_at);
                    if conflicted {
                        // Re-expose the authoritative copy in the feed
                        // after this push's cursor so the client's
                        // corrective pull re-absorbs it.
                        let bumped = self.tick();
                        if let Some(existing) = records.get_mut(&id) {
                            existing.changed_at = bumped;
                        }
                        results.conflicts.push(id);
                        continue;
                    }
                    records.insert(
                        id,
                        ServerRecord {
                            model: change.model.clone(),
                            changed_at,
                        },
                    );
                    results.updated.push(id);
                }
                lexsync_protocol::ChangeOp::Delete => {
                    records.insert(
                        id,
                        ServerRecord {
                            model: change.model.clone(),
                            changed_at,
                        },
                    );
                    results.deleted.push(id);
                }
            }
        }

        PushResponse::new(results, changed_at)
    }

    fn handle_pull(&self, request: &PullRequest) -> PullResponse {
        let server_time = self.tick();
        let models = self
            .records
            .read()
            .values()
            .filter(|record| {
                request
                    .last_sync_at
                    .is_none_or(|cursor| record.changed_at > cursor)
            })
            .map(|record| record.model.clone())
            .collect();
        PullResponse::new(models, server_time)
    }
}

/// Transport that talks to the in-memory server, with a switchable
/// outage for connectivity tests.
struct ServerTransport {
    server: Arc<InMemoryServer>,
    down: AtomicBool,
}

impl ServerTransport {
    fn new(server: Arc<InMemoryServer>) -> Self {
        Self {
            server,
            down: AtomicBool::new(false),
        }
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check_up(&self) -> SyncResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(SyncError::transport("network unreachable"))
        } else {
            Ok(())
        }
    }
}

impl SyncTransport for ServerTransport {
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.check_up()?;
        Ok(self.server.handle_push(request))
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.check_up()?;
        Ok(self.server.handle_pull(request))
    }

    fn send_beacon(&self, request: &PushRequest) {
        if self.check_up().is_ok() {
            self.server.handle_push(request);
        }
    }
}

/// Transport that parks each push at two rendezvous points so a test
/// can interleave work while the request is "on the wire".
struct GatedTransport {
    server: Arc<InMemoryServer>,
    enter: Arc<Barrier>,
    resume: Arc<Barrier>,
}

impl SyncTransport for GatedTransport {
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.enter.wait();
        self.resume.wait();
        Ok(self.server.handle_push(request))
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        Ok(self.server.handle_pull(request))
    }

    fn send_beacon(&self, request: &PushRequest) {
        self.server.handle_push(request);
    }
}

fn client(
    server: &Arc<InMemoryServer>,
) -> SyncEngine<ServerTransport, MemoryModelStore, MemoryStateStore> {
    SyncEngine::new(
        SyncConfig::new().authenticated(true),
        ServerTransport::new(Arc::clone(server)),
        MemoryModelStore::new(),
        MemoryStateStore::new(),
    )
    .unwrap()
}

fn model_at(title: &str, updated_at: DateTime<Utc>) -> Model {
    let mut model = Model::new(title, "body");
    model.updated_at = updated_at;
    model
}

fn t(second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, second).unwrap()
}

#[test]
fn created_records_reach_the_server() {
    let server = Arc::new(InMemoryServer::new());
    let engine = client(&server);

    let a = engine.add_model_with_sync(model_at("NDA", t(1)));
    let b = engine.add_model_with_sync(model_at("Lease", t(2)));

    let outcome = engine.sync();

    assert!(outcome.success);
    assert_eq!(outcome.pushed, 2);
    assert!(server.get(&a).is_some());
    assert!(server.get(&b).is_some());
    assert_eq!(engine.pending_count(), 0);
    assert!(engine.last_sync_at().is_some());
    assert_eq!(engine.state(), SyncState::Idle);
}

#[test]
fn external_edits_flow_back_on_sync() {
    let server = Arc::new(InMemoryServer::new());
    let engine = client(&server);
    let id = engine.add_model_with_sync(model_at("Retainer", t(1)));
    engine.sync();

    // Another device rewrites the record with a newer timestamp.
    let mut theirs = model_at("Retainer (revised)", t(30));
    theirs.id = id;
    server.write_external(theirs);

    let outcome = engine.sync();

    assert!(outcome.success);
    assert_eq!(
        engine.models().get(&id).unwrap().title,
        "Retainer (revised)"
    );
}

#[test]
fn deletes_propagate_and_retire_the_local_copy() {
    let server = Arc::new(InMemoryServer::new());
    let engine = client(&server);
    let id = engine.add_model_with_sync(model_at("Old form", t(1)));
    engine.sync();

    assert!(engine.delete_model_with_sync(&id));
    let outcome = engine.sync();

    assert!(outcome.success);
    assert!(engine.models().get(&id).is_none());
    assert!(server.get(&id).unwrap().is_deleted());
}

#[test]
fn tombstones_reach_other_clients() {
    let server = Arc::new(InMemoryServer::new());
    let writer = client(&server);
    let reader = client(&server);

    let id = writer.add_model_with_sync(model_at("Shared", t(1)));
    writer.sync();
    reader.sync();
    assert!(reader.models().get(&id).is_some());

    writer.delete_model_with_sync(&id);
    writer.sync();
    reader.sync();

    assert!(reader.models().get(&id).is_none());
}

#[test]
fn conflicting_update_is_resolved_by_pull() {
    let server = Arc::new(InMemoryServer::new());
    let engine = client(&server);
    let id = engine.add_model_with_sync(model_at("Clause", t(1)));
    engine.sync();

    // The server gets a newer revision than the client's local edit.
    let mut theirs = model_at("Clause (theirs)", t(50));
    theirs.id = id;
    server.write_external(theirs);

    let mut ours = engine.models().get(&id).unwrap();
    ours.title = "Clause (ours)".into();
    ours.updated_at = t(10);
    engine.models().upsert(ours.clone());
    engine.track_change(lexsync_protocol::ChangeOp::Update, ours);

    let outcome = engine.push();

    assert!(outcome.success);
    // The corrective pull absorbed the server's authoritative copy.
    assert_eq!(engine.models().get(&id).unwrap().title, "Clause (theirs)");
    // The rejected change stays queued; the design is fail-open.
    assert_eq!(engine.pending_count(), 1);
}

#[test]
fn edit_during_push_stays_queued_for_the_next_push() {
    let server = Arc::new(InMemoryServer::new());
    let enter = Arc::new(Barrier::new(2));
    let resume = Arc::new(Barrier::new(2));
    let engine = Arc::new(
        SyncEngine::new(
            SyncConfig::new().authenticated(true),
            GatedTransport {
                server: Arc::clone(&server),
                enter: Arc::clone(&enter),
                resume: Arc::clone(&resume),
            },
            MemoryModelStore::new(),
            MemoryStateStore::new(),
        )
        .unwrap(),
    );
    let id = engine.add_model_with_sync(model_at("Engagement letter", t(1)));

    let pusher = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || engine.push())
    };

    // The first snapshot is on the wire; a newer edit lands behind it.
    enter.wait();
    let mut edited = engine.models().get(&id).unwrap();
    edited.content = "second draft".into();
    engine.update_model_with_sync(edited);
    resume.wait();

    let outcome = pusher.join().unwrap();
    assert!(outcome.success);

    // The acknowledgment covered the first snapshot only; the edit is
    // still queued and pending, not silently dropped.
    assert_eq!(engine.pending_count(), 1);
    assert_eq!(
        engine.models().get(&id).unwrap().sync_status,
        SyncStatus::Pending
    );
    assert_eq!(server.get(&id).unwrap().content, "body");

    // The next push sends the retained snapshot.
    let second = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || engine.push())
    };
    enter.wait();
    resume.wait();
    assert!(second.join().unwrap().success);
    assert_eq!(engine.pending_count(), 0);
    assert_eq!(server.get(&id).unwrap().content, "second draft");
}

#[test]
fn outage_keeps_queue_for_the_next_trigger() {
    let server = Arc::new(InMemoryServer::new());
    let engine = client(&server);
    let id = engine.add_model_with_sync(model_at("Motion", t(1)));

    engine.transport().set_down(true);
    let failed = engine.sync();
    assert!(!failed.success);
    assert_eq!(engine.state(), SyncState::Error);
    assert_eq!(engine.pending_count(), 1);

    engine.handle_offline();
    assert_eq!(engine.state(), SyncState::Offline);

    engine.transport().set_down(false);
    let recovered = engine.handle_online();

    assert!(recovered.success);
    assert_eq!(engine.pending_count(), 0);
    assert!(server.get(&id).is_some());
    assert!(engine.last_error().is_none());
}

#[test]
fn unload_beacon_is_best_effort() {
    let server = Arc::new(InMemoryServer::new());
    let engine = client(&server);
    let id = engine.add_model_with_sync(model_at("Draft", t(1)));

    assert!(engine.flush_on_unload());

    // The server received the flush, but nothing was acknowledged
    // locally: the queue still holds the change.
    assert!(server.get(&id).is_some());
    assert_eq!(engine.pending_count(), 1);
}

#[test]
fn state_survives_reload() {
    let server = Arc::new(InMemoryServer::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync-state.json");

    let id = {
        let engine = SyncEngine::new(
            SyncConfig::new().authenticated(true),
            ServerTransport::new(Arc::clone(&server)),
            MemoryModelStore::new(),
            JsonFileStore::open(&path).unwrap(),
        )
        .unwrap();
        engine.add_model_with_sync(model_at("Unsent", t(1)))
        // Dropped without syncing, as an abrupt tab close would.
    };

    let engine = SyncEngine::new(
        SyncConfig::new().authenticated(true),
        ServerTransport::new(Arc::clone(&server)),
        MemoryModelStore::new(),
        JsonFileStore::open(&path).unwrap(),
    )
    .unwrap();

    assert_eq!(engine.pending_count(), 1);
    let outcome = engine.sync();
    assert!(outcome.success);
    assert!(server.get(&id).is_some());

    // A third session sees the cursor and an empty queue.
    let engine = SyncEngine::new(
        SyncConfig::new().authenticated(true),
        ServerTransport::new(Arc::clone(&server)),
        MemoryModelStore::new(),
        JsonFileStore::open(&path).unwrap(),
    )
    .unwrap();
    assert_eq!(engine.pending_count(), 0);
    assert!(engine.last_sync_at().is_some());
}

#[test]
fn repeated_pulls_converge() {
    let server = Arc::new(InMemoryServer::new());
    let writer = client(&server);
    writer.add_model_with_sync(model_at("Stable", t(1)));
    writer.sync();

    let reader = client(&server);
    reader.sync();
    let snapshot = reader.models().all();

    reader.pull();

    assert_eq!(reader.models().all(), snapshot);
}
