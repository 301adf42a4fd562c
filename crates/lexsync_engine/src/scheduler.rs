//! Periodic background sync.

use crate::collection::ModelStore;
use crate::state::{SyncEngine, SyncState};
use crate::store::StateStore;
use crate::transport::SyncTransport;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

/// Drives [`SyncEngine::sync`] on a fixed interval from a background
/// thread.
///
/// A tick fires a sync only when the engine is online, has queued
/// changes and is not already syncing; overlap beyond that check is
/// handled by the engine's own single-flight guard, which drops the
/// tick rather than queuing it. Dropping the scheduler stops the
/// thread.
pub struct SyncScheduler {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Starts ticking `engine` every `interval`.
    pub fn start<T, M, S>(engine: Arc<SyncEngine<T, M, S>>, interval: Duration) -> Self
    where
        T: SyncTransport + 'static,
        M: ModelStore + 'static,
        S: StateStore + 'static,
    {
        let (stop, ticks) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || loop {
            match ticks.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if engine.is_online()
                        && engine.pending_count() > 0
                        && engine.state() != SyncState::Syncing
                    {
                        debug!("interval sync tick");
                        engine.sync();
                    }
                }
                // Stop signal or the scheduler handle was dropped.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the timer thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
