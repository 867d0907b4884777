/// Write-through path for device settings
use std::sync::Arc;

use log::{info, warn};
use tokio::time::{timeout, Duration};

use crate::entities::number_description;
use crate::error::WriteError;
use crate::session::connection::ConnectionManager;
use crate::session::state::SessionState;

/// IronOS stores every setting as a u16
const DEVICE_SETTING_MAX: i32 = u16::MAX as i32;

pub struct SettingsWriter {
    connection: Arc<ConnectionManager>,
    state: Arc<SessionState>,
    timeout: Duration,
}

impl SettingsWriter {
    pub fn new(
        connection: Arc<ConnectionManager>,
        state: Arc<SessionState>,
        timeout: Duration,
    ) -> Self {
        Self {
            connection,
            state,
            timeout,
        }
    }

    /// Allowed values for `key` given what the session currently knows.
    ///
    /// Declared numbers use their description (with live limits taken from the
    /// latest telemetry); any other setting the device reported accepts the
    /// full u16 range.
    pub fn allowed_range(&self, key: &str) -> Result<(i32, i32), WriteError> {
        if let Some(description) = number_description(key) {
            let telemetry = self.state.telemetry();
            return Ok((description.min, description.max.resolve(telemetry.as_ref())));
        }
        if self.state.setting(key).is_some() {
            return Ok((0, DEVICE_SETTING_MAX));
        }
        Err(WriteError::UnknownSetting(key.to_string()))
    }

    /// Validate, write to the device, then update the cached value.
    ///
    /// # Arguments
    /// * `key` - IronOS setting name, e.g. `SetTemperature`
    /// * `value` - New raw setting value
    ///
    /// # Returns
    /// Ok(()) once the device accepted the write; the cache is untouched on
    /// any error
    pub async fn set_setting(&self, key: &str, value: i32) -> Result<(), WriteError> {
        let (min, max) = self.allowed_range(key)?;
        if !(min..=max).contains(&value) {
            return Err(WriteError::OutOfRange {
                key: key.to_string(),
                value,
                min,
                max,
            });
        }

        let client = self.connection.ensure_connected(self.timeout).await?;
        match timeout(self.timeout, client.set_one_setting(key, value)).await {
            Ok(Ok(())) => {
                self.state.record_setting(key, value);
                info!("Set {} to {}", key, value);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Writing {}={} failed: {}", key, value, e);
                Err(WriteError::Device(e))
            }
            Err(_) => {
                warn!("Writing {}={} timed out", key, value);
                Err(WriteError::Timeout(self.timeout))
            }
        }
    }
}
