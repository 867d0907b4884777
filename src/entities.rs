//! Data-driven sensor and number descriptions.
//!
//! Each reading the iron exposes is one row in [`SENSORS`]; each writable
//! setting one row in [`NUMBERS`]. Hosts bind every row through the same two
//! adapters, [`SensorEntity`] and [`NumberEntity`], instead of one type per
//! field.

use std::fmt;

use crate::error::WriteError;
use crate::models::{DeviceIdentity, NormalizedTelemetry, SessionSnapshot};
use crate::session::PinecilSession;

pub const MANUFACTURER: &str = "Pine64";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Temperature,
    Voltage,
    PowerFactor,
    Power,
    Duration,
    Enum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    Measurement,
}

/// Value of one sensor as presented to the host
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Number(f64),
    Text(&'static str),
    /// Enum ordinal outside the known table
    Unknown(u32),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Number(value) => write!(f, "{}", value),
            SensorValue::Text(text) => f.write_str(text),
            SensorValue::Unknown(ordinal) => write!(f, "unknown ({})", ordinal),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub unique_id: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub icon: Option<&'static str>,
    pub display_precision: Option<u8>,
    pub read: fn(&NormalizedTelemetry) -> SensorValue,
}

/// Upper bound of a number, fixed or taken from live telemetry
#[derive(Debug, Clone, Copy)]
pub enum Limit {
    Fixed(i32),
    Telemetry {
        read: fn(&NormalizedTelemetry) -> i32,
        fallback: i32,
    },
}

impl Limit {
    pub fn resolve(&self, telemetry: Option<&NormalizedTelemetry>) -> i32 {
        match (self, telemetry) {
            (Limit::Fixed(value), _) => *value,
            (Limit::Telemetry { read, .. }, Some(telemetry)) => read(telemetry),
            (Limit::Telemetry { fallback, .. }, None) => *fallback,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NumberDescription {
    /// Setting key written to the device
    pub key: &'static str,
    /// Telemetry mirror of the setting, used before settings are cached
    pub read: fn(&NormalizedTelemetry) -> i32,
    pub name: &'static str,
    pub unique_id: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub min: i32,
    pub max: Limit,
    pub step: i32,
}

const CELSIUS: Option<&str> = Some("°C");
const VOLT: Option<&str> = Some("V");
const MILLIVOLT: Option<&str> = Some("mV");
const SECONDS: Option<&str> = Some("s");
const PERCENT: Option<&str> = Some("%");
const WATT: Option<&str> = Some("W");
const OHM: Option<&str> = Some("Ω");

const fn measurement(
    key: &'static str,
    name: &'static str,
    unique_id: &'static str,
    unit: Option<&'static str>,
    device_class: Option<DeviceClass>,
    read: fn(&NormalizedTelemetry) -> SensorValue,
) -> SensorDescription {
    SensorDescription {
        key,
        name,
        unique_id,
        unit,
        device_class,
        state_class: Some(StateClass::Measurement),
        icon: None,
        display_precision: None,
        read,
    }
}

pub const SENSORS: &[SensorDescription] = &[
    measurement(
        "LiveTemp",
        "Tip Temperature",
        "pinecil_live_temp",
        CELSIUS,
        Some(DeviceClass::Temperature),
        |t| SensorValue::Number(t.live_temp as f64),
    ),
    measurement(
        "SetTemp",
        "Set Temperature",
        "pinecil_set_temp",
        CELSIUS,
        Some(DeviceClass::Temperature),
        |t| SensorValue::Number(t.set_temp as f64),
    ),
    measurement(
        "Voltage",
        "DC Voltage",
        "pinecil_voltage",
        VOLT,
        Some(DeviceClass::Voltage),
        |t| SensorValue::Number(t.voltage),
    ),
    measurement(
        "HandleTemp",
        "Handle Temperature",
        "pinecil_handle_temp",
        CELSIUS,
        Some(DeviceClass::Temperature),
        |t| SensorValue::Number(t.handle_temp),
    ),
    SensorDescription {
        display_precision: Some(2),
        ..measurement(
            "PWMLevel",
            "Power PWM",
            "pinecil_pwm_level",
            PERCENT,
            Some(DeviceClass::PowerFactor),
            |t| SensorValue::Number(t.pwm_level),
        )
    },
    SensorDescription {
        key: "PowerSource",
        name: "Power Source",
        unique_id: "pinecil_power_source",
        unit: None,
        device_class: Some(DeviceClass::Enum),
        state_class: None,
        icon: Some("mdi:power-plug"),
        display_precision: None,
        read: |t| match &t.power_source {
            Ok(source) => SensorValue::Text(source.as_str()),
            Err(defect) => SensorValue::Unknown(defect.ordinal),
        },
    },
    SensorDescription {
        icon: Some("mdi:omega"),
        ..measurement(
            "TipResistance",
            "Tip Resistance",
            "pinecil_tip_resistance",
            OHM,
            None,
            |t| SensorValue::Number(t.tip_resistance),
        )
    },
    measurement(
        "Uptime",
        "Uptime",
        "pinecil_uptime",
        SECONDS,
        Some(DeviceClass::Duration),
        |t| SensorValue::Number(t.uptime),
    ),
    measurement(
        "MovementTime",
        "Last Movement Time",
        "pinecil_movemenet_time",
        SECONDS,
        Some(DeviceClass::Duration),
        |t| SensorValue::Number(t.movement_time),
    ),
    SensorDescription {
        icon: Some("mdi:thermometer-alert"),
        ..measurement(
            "MaxTipTempAbility",
            "Max Temperature",
            "pinecil_max_tip_temp_ability",
            CELSIUS,
            Some(DeviceClass::Temperature),
            |t| SensorValue::Number(t.max_tip_temp as f64),
        )
    },
    measurement(
        "VoltsTip",
        "Raw Tip Voltage",
        "pinecil_u_volts_tip",
        MILLIVOLT,
        Some(DeviceClass::Voltage),
        |t| SensorValue::Number(t.volts_tip),
    ),
    measurement(
        "HallSensor",
        "Hall Effect Strength",
        "pinecil_hall_sensor",
        None,
        None,
        |t| SensorValue::Number(t.hall_sensor as f64),
    ),
    SensorDescription {
        key: "OperatingMode",
        name: "Operating Mode",
        unique_id: "pinecil_operating_mode",
        unit: None,
        device_class: Some(DeviceClass::Enum),
        state_class: None,
        icon: None,
        display_precision: None,
        read: |t| match &t.operating_mode {
            Ok(mode) => SensorValue::Text(mode.as_str()),
            Err(defect) => SensorValue::Unknown(defect.ordinal),
        },
    },
    measurement(
        "Watts",
        "Power",
        "pinecil_power_estimate",
        WATT,
        Some(DeviceClass::Power),
        |t| SensorValue::Number(t.watts),
    ),
];

pub const NUMBERS: &[NumberDescription] = &[NumberDescription {
    key: "SetTemperature",
    read: |t| i32::try_from(t.set_temp).unwrap_or(i32::MAX),
    name: "Set Temperature",
    unique_id: "pinecil_set_temp",
    unit: CELSIUS,
    device_class: Some(DeviceClass::Temperature),
    min: 0,
    max: Limit::Telemetry {
        read: |t| i32::try_from(t.max_tip_temp).unwrap_or(i32::MAX),
        fallback: 500,
    },
    step: 1,
}];

pub fn sensor_description(key: &str) -> Option<&'static SensorDescription> {
    SENSORS.iter().find(|d| d.key == key)
}

pub fn number_description(key: &str) -> Option<&'static NumberDescription> {
    NUMBERS.iter().find(|d| d.key == key)
}

/// Registry record for the physical device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRegistryInfo {
    pub identifier: String,
    pub manufacturer: &'static str,
    pub model: String,
    pub name: String,
    pub sw_version: Option<String>,
}

impl DeviceRegistryInfo {
    pub fn new(address: &str, name: &str, model: &str, identity: Option<&DeviceIdentity>) -> Self {
        Self {
            identifier: address.to_string(),
            manufacturer: MANUFACTURER,
            model: identity
                .map(|i| i.model.clone())
                .unwrap_or_else(|| model.to_string()),
            name: name.to_string(),
            sw_version: identity.map(|i| i.info.build.clone()),
        }
    }
}

fn unique_id(address: &str, suffix: &str) -> String {
    format!("{}_{}", address, suffix)
}

/// Read-only binding of one [`SensorDescription`]
#[derive(Debug, Clone)]
pub struct SensorEntity {
    pub description: &'static SensorDescription,
    pub unique_id: String,
}

impl SensorEntity {
    pub fn new(address: &str, description: &'static SensorDescription) -> Self {
        Self {
            description,
            unique_id: unique_id(address, description.unique_id),
        }
    }

    /// `None` until the first successful poll.
    pub fn native_value(&self, snapshot: &SessionSnapshot) -> Option<SensorValue> {
        snapshot.telemetry.as_ref().map(self.description.read)
    }
}

/// Read-write binding of one [`NumberDescription`]
#[derive(Debug, Clone)]
pub struct NumberEntity {
    pub description: &'static NumberDescription,
    pub unique_id: String,
}

impl NumberEntity {
    pub fn new(address: &str, description: &'static NumberDescription) -> Self {
        Self {
            description,
            unique_id: unique_id(address, description.unique_id),
        }
    }

    /// Cached setting first, telemetry mirror otherwise.
    pub fn native_value(&self, snapshot: &SessionSnapshot) -> Option<i32> {
        snapshot
            .setting(self.description.key)
            .or_else(|| snapshot.telemetry.as_ref().map(self.description.read))
    }

    pub fn min_value(&self) -> i32 {
        self.description.min
    }

    pub fn max_value(&self, snapshot: &SessionSnapshot) -> i32 {
        self.description.max.resolve(snapshot.telemetry.as_ref())
    }

    pub async fn set_native_value(
        &self,
        session: &PinecilSession,
        value: f64,
    ) -> Result<(), WriteError> {
        if !value.is_finite() {
            return Err(WriteError::InvalidValue {
                key: self.description.key.to_string(),
                value: value.to_string(),
            });
        }
        // Saturates; the range check rejects anything past i32
        session
            .set_setting(self.description.key, value.round() as i32)
            .await
    }
}

/// All sensor bindings for the device at `address`
pub fn sensor_entities(address: &str) -> Vec<SensorEntity> {
    SENSORS
        .iter()
        .map(|description| SensorEntity::new(address, description))
        .collect()
}

/// All number bindings for the device at `address`
pub fn number_entities(address: &str) -> Vec<NumberEntity> {
    NUMBERS
        .iter()
        .map(|description| NumberEntity::new(address, description))
        .collect()
}
