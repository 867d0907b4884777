#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use pinecil_ble::session::SERVICE_UUID;
use pinecil_ble::{
    Advertisement, DeviceClient, DeviceError, DeviceInfo, PinecilSession, RawTelemetry,
    SessionConfig,
};

pub const ADDRESS: &str = "C0:FF:EE:00:11:22";

/// Scripted stand-in for the iron
#[derive(Default)]
pub struct MockClient {
    pub connected: AtomicBool,
    pub connects: AtomicUsize,
    pub live_reads: AtomicUsize,
    pub settings_reads: AtomicUsize,
    pub info_reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub disconnects: AtomicUsize,

    pub fail_connect: AtomicBool,
    pub fail_live: AtomicBool,
    pub fail_write: AtomicBool,
    /// Number of settings reads that fail before they start succeeding
    pub settings_failures: AtomicUsize,
    /// Artificial latency for connect and live-data reads
    pub delay: Mutex<Duration>,

    pub raw: Mutex<RawTelemetry>,
    pub settings: Mutex<HashMap<String, i32>>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        let client = Self::default();
        *client.raw.lock().unwrap() = sample_raw();
        client
            .settings
            .lock()
            .unwrap()
            .extend([("SetTemperature".to_string(), 320), ("SleepTemperature".to_string(), 150)]);
        Arc::new(client)
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DeviceClient for MockClient {
    fn address(&self) -> &str {
        ADDRESS
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(DeviceError::Transport("connection refused".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn get_live_data(&self) -> Result<RawTelemetry, DeviceError> {
        self.live_reads.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_live.load(Ordering::SeqCst) {
            return Err(DeviceError::Transport("read failed".to_string()));
        }
        Ok(*self.raw.lock().unwrap())
    }

    async fn get_all_settings(&self) -> Result<HashMap<String, i32>, DeviceError> {
        self.settings_reads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.settings_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.settings_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DeviceError::Transport("settings unavailable".to_string()));
        }
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn get_info(&self) -> Result<DeviceInfo, DeviceError> {
        self.info_reads.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceInfo {
            name: "Pinecil-DEADBEEF".to_string(),
            id: "00000000DEADBEEF".to_string(),
            build: "v2.22".to_string(),
        })
    }

    async fn set_one_setting(&self, key: &str, value: i32) -> Result<(), DeviceError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(DeviceError::Transport("write rejected".to_string()));
        }
        self.settings.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

pub fn sample_raw() -> RawTelemetry {
    RawTelemetry {
        live_temp: 318,
        set_temp: 320,
        voltage: 205,
        handle_temp: 312,
        pwm_level: 128,
        power_source: 3,
        tip_resistance: 62,
        uptime: 12345,
        movement_time: 400,
        max_tip_temp_ability: 450,
        u_volts_tip: 8250,
        hall_sensor: 17,
        operating_mode: 1,
        watts: 254,
    }
}

pub fn config() -> SessionConfig {
    let mut config = SessionConfig::for_address(ADDRESS);
    config.timeout = Duration::from_secs(5);
    config
}

pub fn session_with(client: Arc<MockClient>) -> PinecilSession {
    let session = PinecilSession::new(config());
    session.bind_device(client);
    session
}

pub fn advertisement(address: &str) -> Advertisement {
    Advertisement {
        address: address.to_string(),
        rssi: Some(-61),
        service_uuids: vec![SERVICE_UUID],
        local_name: Some("Pinecil-DEADBEEF".to_string()),
    }
}
