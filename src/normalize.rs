/// Conversion of raw iron registers into physical units
use crate::error::DecodeDefect;
use crate::models::{NormalizedTelemetry, OperatingMode, PowerSource, RawTelemetry};

/// Normalize one raw telemetry record
///
/// IronOS reports most values as scaled integers:
/// - Tip, set-point and max tip temperature: whole °C (passed through)
/// - Handle temperature: 0.1 °C
/// - Input voltage: 0.1 V
/// - PWM duty: 0-255, reported as percent
/// - Tip resistance: 0.1 Ω
/// - Uptime and last movement: 0.1 s
/// - Tip thermocouple: µV, reported as mV
/// - Power estimate: 0.1 W
/// - Power source and operating mode: ordinals into fixed tables
///
/// The function is total. An ordinal outside its table is kept as a
/// [`DecodeDefect`] in the corresponding field instead of failing the record.
pub fn normalize(raw: &RawTelemetry) -> NormalizedTelemetry {
    NormalizedTelemetry {
        live_temp: raw.live_temp,
        set_temp: raw.set_temp,
        voltage: tenths(raw.voltage),
        handle_temp: tenths(raw.handle_temp),
        pwm_level: raw.pwm_level as f64 * 100.0 / 255.0,
        power_source: power_source(raw.power_source),
        tip_resistance: tenths(raw.tip_resistance),
        uptime: tenths(raw.uptime),
        movement_time: tenths(raw.movement_time),
        max_tip_temp: raw.max_tip_temp_ability,
        volts_tip: raw.u_volts_tip as f64 / 1000.0,
        hall_sensor: raw.hall_sensor,
        operating_mode: operating_mode(raw.operating_mode),
        watts: tenths(raw.watts),
    }
}

pub fn power_source(ordinal: u32) -> Result<PowerSource, DecodeDefect> {
    PowerSource::from_ordinal(ordinal).ok_or(DecodeDefect {
        field: "power source",
        ordinal,
    })
}

pub fn operating_mode(ordinal: u32) -> Result<OperatingMode, DecodeDefect> {
    OperatingMode::from_ordinal(ordinal).ok_or(DecodeDefect {
        field: "operating mode",
        ordinal,
    })
}

fn tenths(value: u32) -> f64 {
    value as f64 / 10.0
}
