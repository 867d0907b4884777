//! Session manager for a Pinecil soldering iron running IronOS over BLE.
//!
//! [`PinecilSession`] tracks one iron: it turns advertisements into poll
//! requests, keeps one connection alive, polls live data once a second and
//! writes settings back. The BlueZ transport lives behind the `bluetooth`
//! feature; everything else works against the [`DeviceClient`] trait.

pub mod bluetooth;
pub mod config;
pub mod device;
pub mod entities;
pub mod error;
pub mod models;
pub mod normalize;
pub mod session;
pub mod utils;

pub use config::SessionConfig;
pub use device::DeviceClient;
pub use error::{
    ConfigError, ConnectError, DecodeDefect, DeviceError, PollError, ReadError, WriteError,
};
pub use models::{
    Advertisement, ConnectionState, DeviceIdentity, DeviceInfo, NormalizedTelemetry,
    OperatingMode, PowerSource, RawTelemetry, SessionSnapshot,
};
pub use session::{AdvertisementOutcome, PinecilSession, PollOutcome};
