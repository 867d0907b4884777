/// Periodic and advertisement-triggered telemetry refresh
use std::collections::HashSet;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, trace, warn};
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{DecodeDefect, PollError, ReadError};
use crate::models::{ConnectionState, NormalizedTelemetry};
use crate::normalize::normalize;
use crate::session::connection::ConnectionManager;
use crate::session::state::SessionState;

/// Fixed polling cadence
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Another poll was in flight; this trigger was dropped.
    Busy,
    /// No device handle was ever bound.
    NoDevice,
    Updated(NormalizedTelemetry),
    Failed(PollError),
}

/// What the last failed poll looked like, to avoid repeating the same warning
#[derive(Debug, Default)]
struct FailureLog {
    last: Option<mem::Discriminant<PollError>>,
    defects: HashSet<DecodeDefect>,
}

/// Drives Idle -> Polling -> Idle, at most one poll in flight
pub struct PollCoordinator {
    connection: Arc<ConnectionManager>,
    state: Arc<SessionState>,
    timeout: Duration,
    polling: AtomicBool,
    failures: Mutex<FailureLog>,
}

/// Returns the coordinator to Idle even if the poll future is dropped.
struct PollingGuard<'a>(&'a AtomicBool);

impl Drop for PollingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PollCoordinator {
    pub fn new(
        connection: Arc<ConnectionManager>,
        state: Arc<SessionState>,
        timeout: Duration,
    ) -> Self {
        Self {
            connection,
            state,
            timeout,
            polling: AtomicBool::new(false),
            failures: Mutex::new(FailureLog::default()),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    /// Run one poll cycle.
    pub async fn tick(&self) -> PollOutcome {
        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Poll already in flight, dropping tick");
            return PollOutcome::Busy;
        }
        let _guard = PollingGuard(&self.polling);

        if !self.connection.is_bound() && self.connection.state() == ConnectionState::Disconnected
        {
            return PollOutcome::NoDevice;
        }

        match self.poll_once().await {
            Ok(telemetry) => {
                self.report_defects(&telemetry);
                self.state.publish_telemetry(telemetry.clone());
                self.report_recovery();
                PollOutcome::Updated(telemetry)
            }
            Err(e) => {
                let status = self.state.record_poll_failure();
                self.report_failure(&e, status.consecutive_failures);
                PollOutcome::Failed(e)
            }
        }
    }

    async fn poll_once(&self) -> Result<NormalizedTelemetry, PollError> {
        let client = self.connection.ensure_connected(self.timeout).await?;
        let raw = match timeout(self.timeout, client.get_live_data()).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(ReadError::Device(e).into()),
            Err(_) => return Err(ReadError::Timeout(self.timeout).into()),
        };
        Ok(normalize(&raw))
    }

    fn failure_log(&self) -> std::sync::MutexGuard<'_, FailureLog> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report_failure(&self, error: &PollError, consecutive: u32) {
        let kind = mem::discriminant(error);
        let mut log = self.failure_log();
        if log.last == Some(kind) {
            debug!("Poll failed again ({} in a row): {}", consecutive, error);
        } else {
            warn!("Poll failed, keeping last readings: {}", error);
            log.last = Some(kind);
        }
    }

    fn report_recovery(&self) {
        if self.failure_log().last.take().is_some() {
            info!("Polling recovered");
        }
    }

    fn report_defects(&self, telemetry: &NormalizedTelemetry) {
        let current: HashSet<DecodeDefect> = telemetry.defects().into_iter().collect();
        let mut log = self.failure_log();
        for defect in current.difference(&log.defects) {
            warn!("Device reported an {}; firmware or protocol drift?", defect);
        }
        log.defects = current;
    }

    /// Poll every [`UPDATE_INTERVAL`] and whenever a poll is requested, until
    /// `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(UPDATE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.state.poll_requested() => debug!("Poll requested by advertisement"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.tick() => {}
            }
        }

        debug!("Poll loop stopped");
    }
}
