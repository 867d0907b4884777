//! One logical session with one iron.
//!
//! ```text
//! advertisements ─► BeaconDebouncer ─► SessionState (poll needed) ─┐
//!                                                                  ▼
//!        1 s timer ─────────────────────────────────────► PollCoordinator
//!                                                                  │
//!  set_setting ─► SettingsWriter ─► ConnectionManager ◄────────────┘
//!                                         │
//!                                   DeviceClient
//! ```

pub mod beacon;
pub mod connection;
pub mod poller;
pub mod settings;
pub mod state;

use std::sync::Arc;

use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::device::DeviceClient;
use crate::error::WriteError;
use crate::models::{Advertisement, ConnectionState, SessionSnapshot};

pub use beacon::{AdvertisementOutcome, BeaconDebouncer, IgnoreReason, SERVICE_UUID};
pub use connection::ConnectionManager;
pub use poller::{PollCoordinator, PollOutcome, UPDATE_INTERVAL};
pub use settings::SettingsWriter;
pub use state::SessionState;

/// Everything the host needs to drive and observe one iron
pub struct PinecilSession {
    config: SessionConfig,
    state: Arc<SessionState>,
    connection: Arc<ConnectionManager>,
    debouncer: BeaconDebouncer,
    poller: Arc<PollCoordinator>,
    settings: SettingsWriter,
    shutdown: CancellationToken,
}

impl PinecilSession {
    pub fn new(config: SessionConfig) -> Self {
        let shutdown = CancellationToken::new();
        let state = Arc::new(SessionState::new());
        let connection = Arc::new(ConnectionManager::new(
            config.model.clone(),
            state.clone(),
            shutdown.clone(),
        ));
        let debouncer = BeaconDebouncer::new(config.address.clone(), state.clone());
        let poller = Arc::new(PollCoordinator::new(
            connection.clone(),
            state.clone(),
            config.timeout,
        ));
        let settings = SettingsWriter::new(connection.clone(), state.clone(), config.timeout);

        Self {
            config,
            state,
            connection,
            debouncer,
            poller,
            settings,
            shutdown,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    pub fn bind_device(&self, client: Arc<dyn DeviceClient>) {
        self.connection.bind(client);
    }

    pub fn on_advertisement(&self, advertisement: &Advertisement) -> AdvertisementOutcome {
        self.debouncer.on_advertisement(advertisement)
    }

    pub fn debouncer(&self) -> &BeaconDebouncer {
        &self.debouncer
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot(self.connection.state())
    }

    pub async fn set_setting(&self, key: &str, value: i32) -> Result<(), WriteError> {
        self.settings.set_setting(key, value).await
    }

    pub fn allowed_range(&self, key: &str) -> Result<(i32, i32), WriteError> {
        self.settings.allowed_range(key)
    }

    /// Run a single poll cycle now.
    pub async fn tick(&self) -> PollOutcome {
        self.poller.tick().await
    }

    /// Start the poll loop on the current runtime.
    pub fn spawn(&self) -> JoinHandle<()> {
        tokio::spawn(self.poller.clone().run(self.shutdown.clone()))
    }

    /// Wait until the tracked device has advertised or telemetry is cached.
    pub async fn wait_ready(&self, limit: Duration) -> bool {
        if self.state.has_telemetry() {
            return true;
        }
        let mut seen = self.state.subscribe_seen();
        tokio::select! {
            result = tokio::time::timeout(limit, seen.wait_for(|seen| *seen)) => {
                matches!(result, Ok(Ok(_)))
            }
            _ = self.shutdown.cancelled() => false,
        }
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Stop polling and release the device. Never waits on the device.
    pub fn shutdown(&self) {
        info!("Shutting down session for {}", self.config.address);
        self.connection.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for PinecilSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
