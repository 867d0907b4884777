//! IronOS GATT layout and payload decoding.
//!
//! Bulk service characteristics:
//! - `9eae1001`: live data, 14 × u32 little-endian in [`RawTelemetry`] order
//! - `9eae1003`: firmware build string
//! - `9eae1005`: device id, u64 little-endian
//!
//! Settings live in their own service, one u16 little-endian characteristic
//! per setting at `f6d7nnnn-5a10-4eba-aa55-33e27f9bc533`.

use uuid::Uuid;

use crate::error::DeviceError;
use crate::models::RawTelemetry;

pub use crate::session::SERVICE_UUID as BULK_SERVICE;

pub const BULK_LIVE_DATA: Uuid = Uuid::from_u128(0x9eae1001_9d0d_48c5_aa55_33e27f9bc533);
pub const BULK_BUILD_ID: Uuid = Uuid::from_u128(0x9eae1003_9d0d_48c5_aa55_33e27f9bc533);
pub const BULK_DEVICE_ID: Uuid = Uuid::from_u128(0x9eae1005_9d0d_48c5_aa55_33e27f9bc533);

pub const SETTINGS_SERVICE: Uuid = Uuid::from_u128(0xf6d80000_5a10_4eba_aa55_33e27f9bc533);
const SETTING_BASE: u128 = 0xf6d70000_5a10_4eba_aa55_33e27f9bc533;

const LIVE_DATA_FIELDS: usize = 14;

/// Setting names in IronOS index order
pub const SETTINGS: &[&str] = &[
    "SetTemperature",
    "SleepTemperature",
    "SleepTimeout",
    "DCInCutoff",
    "MinVolCell",
    "QCMaxVoltage",
    "DisplayRotation",
    "MotionSensitivity",
    "AnimLoop",
    "AnimSpeed",
    "AutoStart",
    "ShutdownTimeout",
    "CooldownBlink",
    "AdvancedIdle",
    "AdvancedSoldering",
    "TemperatureUnit",
    "ScrollingSpeed",
    "LockingMode",
    "PowerPulsePower",
    "PowerPulseWait",
    "PowerPulseDuration",
    "VoltageCalibration",
    "BoostTemperature",
    "CalibrationOffset",
    "PowerLimit",
    "ReverseButtonTempChange",
    "TempChangeLongStep",
    "TempChangeShortStep",
    "HallEffectSensitivity",
];

pub fn setting_index(key: &str) -> Option<u16> {
    SETTINGS
        .iter()
        .position(|name| *name == key)
        .and_then(|index| u16::try_from(index).ok())
}

pub fn setting_uuid(index: u16) -> Uuid {
    Uuid::from_u128(SETTING_BASE | ((index as u128) << 96))
}

/// Decode the bulk live-data characteristic
pub fn decode_live_data(data: &[u8]) -> Result<RawTelemetry, DeviceError> {
    if data.len() < LIVE_DATA_FIELDS * 4 {
        return Err(DeviceError::Malformed {
            characteristic: "live data",
            reason: format!("expected {} bytes, got {}", LIVE_DATA_FIELDS * 4, data.len()),
        });
    }

    let mut fields = data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
    let mut next = || fields.next().unwrap_or_default();

    Ok(RawTelemetry {
        live_temp: next(),
        set_temp: next(),
        voltage: next(),
        handle_temp: next(),
        pwm_level: next(),
        power_source: next(),
        tip_resistance: next(),
        uptime: next(),
        movement_time: next(),
        max_tip_temp_ability: next(),
        u_volts_tip: next(),
        hall_sensor: next(),
        operating_mode: next(),
        watts: next(),
    })
}

pub fn decode_setting(data: &[u8]) -> Result<i32, DeviceError> {
    match data {
        [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi]) as i32),
        _ => Err(DeviceError::Malformed {
            characteristic: "setting",
            reason: format!("expected 2 bytes, got {}", data.len()),
        }),
    }
}

pub fn encode_setting(key: &str, value: i32) -> Result<[u8; 2], DeviceError> {
    let value = u16::try_from(value).map_err(|_| DeviceError::Malformed {
        characteristic: "setting",
        reason: format!("{}={} does not fit in u16", key, value),
    })?;
    Ok(value.to_le_bytes())
}

pub fn decode_device_id(data: &[u8]) -> String {
    let mut bytes = [0u8; 8];
    for (dst, src) in bytes.iter_mut().zip(data) {
        *dst = *src;
    }
    format!("{:016X}", u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_live_data() {
        let values: [u32; 14] = [320, 320, 205, 312, 128, 3, 62, 12345, 400, 450, 8250, 17, 1, 254];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let raw = decode_live_data(&bytes).unwrap();
        assert_eq!(raw.live_temp, 320);
        assert_eq!(raw.voltage, 205);
        assert_eq!(raw.power_source, 3);
        assert_eq!(raw.max_tip_temp_ability, 450);
        assert_eq!(raw.operating_mode, 1);
        assert_eq!(raw.watts, 254);
    }

    #[test]
    fn test_short_live_data_is_rejected() {
        assert!(matches!(
            decode_live_data(&[0u8; 20]),
            Err(DeviceError::Malformed { .. })
        ));
    }

    #[test]
    fn test_setting_uuids() {
        assert_eq!(setting_index("SetTemperature"), Some(0));
        assert_eq!(setting_index("BoostTemperature"), Some(22));
        assert_eq!(setting_index("NoSuchSetting"), None);
        assert_eq!(
            setting_uuid(0).to_string(),
            "f6d70000-5a10-4eba-aa55-33e27f9bc533"
        );
        assert_eq!(
            setting_uuid(22).to_string(),
            "f6d70016-5a10-4eba-aa55-33e27f9bc533"
        );
    }

    #[test]
    fn test_setting_encoding() {
        assert_eq!(decode_setting(&[0x2c, 0x01]).unwrap(), 300);
        assert!(decode_setting(&[0x2c]).is_err());
        assert_eq!(encode_setting("SetTemperature", 300).unwrap(), [0x2c, 0x01]);
        assert!(encode_setting("SetTemperature", -1).is_err());
    }

    #[test]
    fn test_device_id_is_hex() {
        assert_eq!(
            decode_device_id(&[0xef, 0xbe, 0xad, 0xde, 0, 0, 0, 0]),
            "00000000DEADBEEF"
        );
    }
}
