//! Boundary to the iron's protocol client.
//!
//! The session never touches GATT directly. Everything it needs from the iron
//! goes through [`DeviceClient`], which the BlueZ adapter in
//! [`crate::bluetooth::client`] implements and tests replace with a scripted
//! fake.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::DeviceError;
use crate::models::{DeviceInfo, RawTelemetry};

#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Stable transport address of the peripheral.
    fn address(&self) -> &str;

    /// Establish the link. Calling it on a connected client is allowed.
    async fn connect(&self) -> Result<(), DeviceError>;

    async fn is_connected(&self) -> bool;

    async fn disconnect(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn get_live_data(&self) -> Result<RawTelemetry, DeviceError>;

    async fn get_all_settings(&self) -> Result<HashMap<String, i32>, DeviceError>;

    async fn get_info(&self) -> Result<DeviceInfo, DeviceError>;

    async fn set_one_setting(&self, key: &str, value: i32) -> Result<(), DeviceError>;
}
