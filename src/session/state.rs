/// Shared in-memory session record
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use time::OffsetDateTime;
use tokio::sync::{watch, Notify};

use crate::models::{
    ConnectionState, DeviceIdentity, NormalizedTelemetry, PollStatus, SessionSnapshot,
    SettingsSnapshot, SignalSnapshot,
};

#[derive(Debug, Default)]
struct Inner {
    telemetry: Option<NormalizedTelemetry>,
    settings: SettingsSnapshot,
    identity: Option<DeviceIdentity>,
    signal: SignalSnapshot,
    poll_needed: bool,
    poll: PollStatus,
}

/// Aggregate state for one device
///
/// Every field has exactly one writing component; the `pub(crate)` mutators
/// below are named after the component allowed to call them. Readers only ever
/// get copies out. No lock is held across an `.await`.
#[derive(Debug)]
pub struct SessionState {
    inner: RwLock<Inner>,
    poll_wakeup: Notify,
    seen: watch::Sender<bool>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (seen, _) = watch::channel(false);
        Self {
            inner: RwLock::new(Inner::default()),
            poll_wakeup: Notify::new(),
            seen,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn telemetry(&self) -> Option<NormalizedTelemetry> {
        self.read().telemetry.clone()
    }

    pub fn has_telemetry(&self) -> bool {
        self.read().telemetry.is_some()
    }

    pub fn settings(&self) -> SettingsSnapshot {
        self.read().settings.clone()
    }

    pub fn setting(&self, key: &str) -> Option<i32> {
        self.read().settings.get(key).copied()
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.read().identity.clone()
    }

    pub fn signal(&self) -> SignalSnapshot {
        self.read().signal
    }

    pub fn poll_needed(&self) -> bool {
        self.read().poll_needed
    }

    pub fn poll_status(&self) -> PollStatus {
        self.read().poll.clone()
    }

    /// Resolves once an advertisement from the tracked device was accepted.
    /// Copy every field out under a single read lock.
    pub fn snapshot(&self, connection: ConnectionState) -> SessionSnapshot {
        let inner = self.read();
        SessionSnapshot {
            connection,
            telemetry: inner.telemetry.clone(),
            settings: inner.settings.clone(),
            identity: inner.identity.clone(),
            signal: inner.signal,
            poll_needed: inner.poll_needed,
            poll: inner.poll.clone(),
        }
    }

    pub fn subscribe_seen(&self) -> watch::Receiver<bool> {
        self.seen.subscribe()
    }

    /// Resolves when the debouncer asks for an early poll.
    pub(crate) async fn poll_requested(&self) {
        self.poll_wakeup.notified().await
    }

    // Beacon debouncer

    /// Record an accepted advertisement. Returns whether a poll was requested.
    pub(crate) fn accept_advertisement(
        &self,
        rssi: Option<i16>,
        now: tokio::time::Instant,
    ) -> bool {
        let request_poll = {
            let mut inner = self.write();
            if rssi.is_some() {
                inner.signal.rssi = rssi;
            }
            inner.signal.last_accepted = Some(now);
            if inner.telemetry.is_none() {
                inner.poll_needed = true;
            }
            inner.poll_needed
        };
        self.seen.send_replace(true);
        if request_poll {
            self.poll_wakeup.notify_one();
        }
        request_poll
    }

    // Connection manager

    pub(crate) fn replace_identity(&self, identity: Option<DeviceIdentity>) {
        self.write().identity = identity;
    }

    pub(crate) fn seed_settings(&self, settings: SettingsSnapshot) {
        self.write().settings = settings;
    }

    // Poll coordinator

    pub(crate) fn publish_telemetry(&self, telemetry: NormalizedTelemetry) -> PollStatus {
        let mut inner = self.write();
        inner.telemetry = Some(telemetry);
        inner.poll_needed = false;
        inner.poll.last_update = Some(OffsetDateTime::now_utc());
        inner.poll.last_success = Some(true);
        inner.poll.consecutive_failures = 0;
        inner.poll.clone()
    }

    /// Stale-but-present: the cached telemetry is left alone.
    pub(crate) fn record_poll_failure(&self) -> PollStatus {
        let mut inner = self.write();
        inner.poll_needed = false;
        inner.poll.last_success = Some(false);
        inner.poll.consecutive_failures = inner.poll.consecutive_failures.saturating_add(1);
        inner.poll.clone()
    }

    // Settings writer

    pub(crate) fn record_setting(&self, key: &str, value: i32) {
        self.write().settings.insert(key.to_string(), value);
    }
}
