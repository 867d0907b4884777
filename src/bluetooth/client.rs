/// BlueZ implementation of the iron's protocol client
use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, Address, Device};
use log::{debug, info};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bluetooth::protocol::{
    decode_device_id, decode_live_data, decode_setting, encode_setting, setting_index,
    setting_uuid, BULK_BUILD_ID, BULK_DEVICE_ID, BULK_LIVE_DATA, BULK_SERVICE, SETTINGS,
    SETTINGS_SERVICE,
};
use crate::device::DeviceClient;
use crate::error::DeviceError;
use crate::models::{DeviceInfo, RawTelemetry};

/// GATT client for one Pinecil, talking through BlueZ
pub struct BluerClient {
    address: String,
    device: Device,
    characteristics: Mutex<HashMap<Uuid, Characteristic>>,
}

impl BluerClient {
    pub fn new(adapter: &Adapter, address: &str) -> Result<Self, DeviceError> {
        let addr = Address::from_str(address)
            .map_err(|e| DeviceError::Transport(format!("invalid address {}: {}", address, e)))?;
        let device = adapter.device(addr)?;
        Ok(Self {
            address: address.to_string(),
            device,
            characteristics: Mutex::new(HashMap::new()),
        })
    }

    /// Collect the characteristics of the bulk and settings services
    async fn discover(&self) -> Result<HashMap<Uuid, Characteristic>, DeviceError> {
        let mut found = HashMap::new();
        for service in self.device.services().await? {
            let service_uuid = service.uuid().await?;
            if service_uuid != BULK_SERVICE && service_uuid != SETTINGS_SERVICE {
                continue;
            }
            for characteristic in service.characteristics().await? {
                found.insert(characteristic.uuid().await?, characteristic);
            }
        }
        debug!("Discovered {} characteristics on {}", found.len(), self.address);
        Ok(found)
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, DeviceError> {
        let characteristics = self.characteristics.lock().await;
        if characteristics.is_empty() {
            return Err(DeviceError::NotConnected);
        }
        characteristics
            .get(&uuid)
            .cloned()
            .ok_or_else(|| DeviceError::Transport(format!("characteristic {} not found", uuid)))
    }

    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>, DeviceError> {
        Ok(self.characteristic(uuid).await?.read().await?)
    }
}

#[async_trait]
impl DeviceClient for BluerClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        if !self.device.is_connected().await? {
            self.device.connect().await?;
            info!("Bluetooth link to {} established", self.address);
        }
        let discovered = self.discover().await?;
        if !discovered.contains_key(&BULK_LIVE_DATA) {
            return Err(DeviceError::Transport(format!(
                "{} does not expose the IronOS bulk service",
                self.address
            )));
        }
        *self.characteristics.lock().await = discovered;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let linked = self.device.is_connected().await.unwrap_or(false);
        linked && !self.characteristics.lock().await.is_empty()
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.characteristics.lock().await.clear();
        self.device.disconnect().await?;
        Ok(())
    }

    async fn get_live_data(&self) -> Result<RawTelemetry, DeviceError> {
        decode_live_data(&self.read(BULK_LIVE_DATA).await?)
    }

    async fn get_all_settings(&self) -> Result<HashMap<String, i32>, DeviceError> {
        let mut settings = HashMap::new();
        for (index, name) in SETTINGS.iter().enumerate() {
            let Ok(index) = u16::try_from(index) else {
                break;
            };
            match self.read(setting_uuid(index)).await {
                Ok(data) => {
                    settings.insert(name.to_string(), decode_setting(&data)?);
                }
                // Older firmware exposes fewer settings
                Err(DeviceError::Transport(e)) => debug!("Skipping setting {}: {}", name, e),
                Err(e) => return Err(e),
            }
        }
        Ok(settings)
    }

    async fn get_info(&self) -> Result<DeviceInfo, DeviceError> {
        let build = String::from_utf8_lossy(&self.read(BULK_BUILD_ID).await?)
            .trim_end_matches('\0')
            .to_string();
        let id = decode_device_id(&self.read(BULK_DEVICE_ID).await?);
        let name = self
            .device
            .name()
            .await?
            .unwrap_or_else(|| format!("Pinecil-{}", &id[id.len().saturating_sub(8)..]));
        Ok(DeviceInfo { name, id, build })
    }

    async fn set_one_setting(&self, key: &str, value: i32) -> Result<(), DeviceError> {
        let index =
            setting_index(key).ok_or_else(|| DeviceError::UnsupportedSetting(key.to_string()))?;
        let payload = encode_setting(key, value)?;
        self.characteristic(setting_uuid(index))
            .await?
            .write(&payload)
            .await?;
        Ok(())
    }
}
