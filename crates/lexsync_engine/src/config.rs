//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync scheduling and session flags.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between automatic sync attempts.
    pub sync_interval: Duration,
    /// Whether the session starts authenticated.
    pub authenticated: bool,
    /// Whether the session starts online.
    pub online: bool,
}

impl SyncConfig {
    /// Creates a configuration with the default 30-second interval,
    /// online and unauthenticated.
    pub fn new() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            authenticated: false,
            online: true,
        }
    }

    /// Sets the automatic sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the initial authentication flag.
    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    /// Sets the initial connectivity flag.
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
