/// Connect-or-reuse management of the device handle
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use crate::device::DeviceClient;
use crate::error::{ConnectError, DeviceError};
use crate::models::{ConnectionState, DeviceIdentity, DeviceInfo};
use crate::session::state::SessionState;

/// Owner of the device handle and of [`ConnectionState`]
///
/// `ensure_connected` is single-flight: concurrent callers that arrive while an
/// attempt runs wait for it and share its outcome.
pub struct ConnectionManager {
    model: String,
    client: RwLock<Option<Arc<dyn DeviceClient>>>,
    connect_lock: tokio::sync::Mutex<()>,
    attempts: AtomicU64,
    last_outcome: Mutex<Option<Result<(), ConnectError>>>,
    state: watch::Sender<ConnectionState>,
    session: Arc<SessionState>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        model: impl Into<String>,
        session: Arc<SessionState>,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            model: model.into(),
            client: RwLock::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            attempts: AtomicU64::new(0),
            last_outcome: Mutex::new(None),
            state,
            session,
            shutdown,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Whether a device handle has ever been bound (and not torn down).
    pub fn is_bound(&self) -> bool {
        self.bound().is_some()
    }

    fn bound(&self) -> Option<Arc<dyn DeviceClient>> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Connection state {:?} -> {:?}", previous, state);
        }
    }

    /// Bind the handle used for all further device calls.
    ///
    /// A handle for a different address invalidates the cached identity.
    pub fn bind(&self, client: Arc<dyn DeviceClient>) {
        if self.shutdown.is_cancelled() {
            warn!("Not binding {}: session closed", client.address());
            return;
        }

        let address_changed = self
            .session
            .identity()
            .is_some_and(|identity| !identity.address.eq_ignore_ascii_case(client.address()));
        if address_changed {
            info!("Bound a new device at {}, dropping cached identity", client.address());
            self.session.replace_identity(None);
        }

        *self.client.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
        self.set_state(ConnectionState::Disconnected);
    }

    async fn reusable(&self) -> Result<Option<Arc<dyn DeviceClient>>, ConnectError> {
        if self.shutdown.is_cancelled() {
            return Err(ConnectError::Closed);
        }
        let client = self.bound().ok_or(ConnectError::NoDevice)?;
        if self.state() == ConnectionState::Connected && client.is_connected().await {
            return Ok(Some(client));
        }
        Ok(None)
    }

    /// Return a connected client, connecting first if needed.
    ///
    /// # Arguments
    /// * `limit` - Upper bound for the connect plus the settings and info fetch
    ///
    /// # Returns
    /// The bound client once it is connected, or the [`ConnectError`] of the
    /// attempt this call started or joined
    pub async fn ensure_connected(
        &self,
        limit: Duration,
    ) -> Result<Arc<dyn DeviceClient>, ConnectError> {
        if let Some(client) = self.reusable().await? {
            return Ok(client);
        }

        let seen_attempts = self.attempts.load(Ordering::Acquire);
        let _guard = tokio::select! {
            guard = self.connect_lock.lock() => guard,
            _ = self.shutdown.cancelled() => return Err(ConnectError::Closed),
        };

        // Another caller may have finished an attempt while we waited
        if self.attempts.load(Ordering::Acquire) != seen_attempts {
            let joined = self
                .last_outcome
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(Err(e)) = joined {
                debug!("Joined a failed connect attempt: {}", e);
                return Err(e);
            }
        }
        if let Some(client) = self.reusable().await? {
            return Ok(client);
        }

        let client = self.bound().ok_or(ConnectError::NoDevice)?;
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to {}", client.address());

        let outcome = tokio::select! {
            result = timeout(limit, self.establish(client.as_ref())) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(ConnectError::Timeout(limit)),
            },
            _ = self.shutdown.cancelled() => Err(ConnectError::Closed),
        };

        *self
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                info!("Connected to {}", client.address());
                Ok(client)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                debug!("Connect to {} failed: {}", client.address(), e);
                Err(e)
            }
        }
    }

    async fn establish(&self, client: &dyn DeviceClient) -> Result<(), ConnectError> {
        client.connect().await.map_err(ConnectError::Transport)?;

        let (settings, info) = match fetch_session_data(client).await {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    "Connected to {} but fetching settings failed ({}), retrying once",
                    client.address(),
                    e
                );
                if !client.is_connected().await {
                    client.connect().await.map_err(ConnectError::Transport)?;
                }
                fetch_session_data(client)
                    .await
                    .map_err(ConnectError::Incomplete)?
            }
        };

        debug!(
            "Fetched {} settings from {} (build {})",
            settings.len(),
            client.address(),
            info.build
        );
        self.session.seed_settings(settings);
        if self.session.identity().is_none() {
            self.session.replace_identity(Some(DeviceIdentity {
                address: client.address().to_string(),
                model: self.model.clone(),
                info,
            }));
        }
        Ok(())
    }

    /// Drop the link. Safe to call in any state; identity is kept.
    ///
    /// Waits for an in-flight connect to settle first, so the attempt cannot
    /// publish `Connected` over a link that was just dropped.
    pub async fn disconnect(&self) {
        let _guard = tokio::select! {
            guard = self.connect_lock.lock() => guard,
            _ = self.shutdown.cancelled() => return,
        };
        let previous = self.state.send_replace(ConnectionState::Disconnected);
        if previous == ConnectionState::Disconnected {
            return;
        }
        if let Some(client) = self.bound() {
            info!("Disconnecting from {}", client.address());
            if let Err(e) = client.disconnect().await {
                debug!("Disconnect from {} failed: {}", client.address(), e);
            }
        }
    }

    /// Tear down: abandon any in-flight attempt and release the handle.
    pub fn close(&self) {
        self.shutdown.cancel();
        let released = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.set_state(ConnectionState::Disconnected);
        if let Some(client) = released {
            debug!("Released device handle for {}", client.address());
        }
    }
}

async fn fetch_session_data(
    client: &dyn DeviceClient,
) -> Result<(HashMap<String, i32>, DeviceInfo), DeviceError> {
    let settings = client.get_all_settings().await?;
    let info = client.get_info().await?;
    Ok((settings, info))
}
