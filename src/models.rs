use std::collections::HashMap;
use std::fmt;

use time::OffsetDateTime;

use crate::error::DecodeDefect;

/// Live telemetry exactly as the iron reports it, one u32 per register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawTelemetry {
    pub live_temp: u32,
    pub set_temp: u32,
    pub voltage: u32,
    pub handle_temp: u32,
    pub pwm_level: u32,
    pub power_source: u32,
    pub tip_resistance: u32,
    pub uptime: u32,
    pub movement_time: u32,
    pub max_tip_temp_ability: u32,
    pub u_volts_tip: u32,
    pub hall_sensor: u32,
    pub operating_mode: u32,
    pub watts: u32,
}

/// Physical-unit view of [`RawTelemetry`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTelemetry {
    /// Tip temperature, °C
    pub live_temp: u32,
    /// Set-point temperature, °C
    pub set_temp: u32,
    /// Input voltage, V
    pub voltage: f64,
    /// Handle temperature, °C
    pub handle_temp: f64,
    /// Heater duty cycle, %
    pub pwm_level: f64,
    pub power_source: Result<PowerSource, DecodeDefect>,
    /// Tip resistance, Ω
    pub tip_resistance: f64,
    /// Seconds since power-on
    pub uptime: f64,
    /// Time since the iron last moved, s
    pub movement_time: f64,
    /// Highest temperature the fitted tip supports, °C
    pub max_tip_temp: u32,
    /// Raw tip thermocouple voltage, mV
    pub volts_tip: f64,
    pub hall_sensor: u32,
    pub operating_mode: Result<OperatingMode, DecodeDefect>,
    /// Estimated heater power, W
    pub watts: f64,
}

impl NormalizedTelemetry {
    /// Enum fields whose ordinal fell outside the known table.
    pub fn defects(&self) -> Vec<DecodeDefect> {
        let mut defects = Vec::new();
        if let Err(defect) = &self.power_source {
            defects.push(defect.clone());
        }
        if let Err(defect) = &self.operating_mode {
            defects.push(defect.clone());
        }
        defects
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerSource {
    Dc,
    Qc,
    PdVbus,
    Pd,
}

impl PowerSource {
    pub const ALL: [PowerSource; 4] = [Self::Dc, Self::Qc, Self::PdVbus, Self::Pd];

    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dc => "DC",
            Self::Qc => "QC",
            Self::PdVbus => "PD VBUS",
            Self::Pd => "PD",
        }
    }
}

impl fmt::Display for PowerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    Idle,
    Soldering,
    Boost,
    Sleeping,
    Settings,
    Debug,
}

impl OperatingMode {
    pub const ALL: [OperatingMode; 6] = [
        Self::Idle,
        Self::Soldering,
        Self::Boost,
        Self::Sleeping,
        Self::Settings,
        Self::Debug,
    ];

    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Soldering => "Soldering",
            Self::Boost => "Boost",
            Self::Sleeping => "Sleeping",
            Self::Settings => "Settings",
            Self::Debug => "Debug",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device information record returned by the iron.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub id: String,
    pub build: String,
}

/// Who the session is talking to. Learned on the first complete connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub address: String,
    pub model: String,
    pub info: DeviceInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalSnapshot {
    pub rssi: Option<i16>,
    pub last_accepted: Option<tokio::time::Instant>,
}

/// Setting key to last-known value.
pub type SettingsSnapshot = HashMap<String, i32>;

/// One advertisement broadcast as delivered by the scanner.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    pub address: String,
    pub rssi: Option<i16>,
    pub service_uuids: Vec<uuid::Uuid>,
    pub local_name: Option<String>,
}

/// Bookkeeping about the most recent polls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStatus {
    pub last_update: Option<OffsetDateTime>,
    pub last_success: Option<bool>,
    pub consecutive_failures: u32,
}

/// Copy-out view of the whole session, handed to consumers.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub telemetry: Option<NormalizedTelemetry>,
    pub settings: SettingsSnapshot,
    pub identity: Option<DeviceIdentity>,
    pub signal: SignalSnapshot,
    pub poll_needed: bool,
    pub poll: PollStatus,
}

impl SessionSnapshot {
    pub fn setting(&self, key: &str) -> Option<i32> {
        self.settings.get(key).copied()
    }
}
