//! Transport layer abstraction for the remote template store.

use crate::error::{SyncError, SyncResult};
use lexsync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use parking_lot::Mutex;

/// Request/response access to the remote store.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, loopback for tests, etc.). The engine sees
/// exactly these three calls and nothing of the wire mechanics.
pub trait SyncTransport: Send + Sync {
    /// Sends the queued changes to the server.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Fetches server changes since the given cursor.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Best-effort, unverified send used during session teardown.
    ///
    /// Implementations must not block on the result; the engine never
    /// awaits an acknowledgment and never treats a beacon failure as
    /// an error.
    fn send_beacon(&self, request: &PushRequest);
}

/// A mock transport for testing.
#[derive(Debug, Default)]
pub struct MockTransport {
    push_response: Mutex<Option<PushResponse>>,
    pull_response: Mutex<Option<PullResponse>>,
    push_failure: Mutex<Option<String>>,
    pull_failure: Mutex<Option<String>>,
    pushes: Mutex<Vec<PushRequest>>,
    pulls: Mutex<Vec<PullRequest>>,
    beacons: Mutex<Vec<PushRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response returned by every subsequent push.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Sets the response returned by every subsequent pull.
    pub fn set_pull_response(&self, response: PullResponse) {
        *self.pull_response.lock() = Some(response);
    }

    /// Makes every subsequent push fail with a transport error.
    pub fn fail_pushes(&self, message: impl Into<String>) {
        *self.push_failure.lock() = Some(message.into());
    }

    /// Makes every subsequent pull fail with a transport error.
    pub fn fail_pulls(&self, message: impl Into<String>) {
        *self.pull_failure.lock() = Some(message.into());
    }

    /// Push requests seen so far.
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    /// Pull requests seen so far.
    pub fn pulls(&self) -> Vec<PullRequest> {
        self.pulls.lock().clone()
    }

    /// Beacon payloads seen so far.
    pub fn beacons(&self) -> Vec<PushRequest> {
        self.beacons.lock().clone()
    }
}

impl SyncTransport for MockTransport {
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.pushes.lock().push(request.clone());
        if let Some(message) = self.push_failure.lock().clone() {
            return Err(SyncError::transport(message));
        }
        self.push_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::server("no mock push response set"))
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.pulls.lock().push(request.clone());
        if let Some(message) = self.pull_failure.lock().clone() {
            return Err(SyncError::transport(message));
        }
        self.pull_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::server("no mock pull response set"))
    }

    fn send_beacon(&self, request: &PushRequest) {
        self.beacons.lock().push(request.clone());
    }
}
