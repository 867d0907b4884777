/// Utility functions for formatting session state in logs
use log::{info, warn};
use time::{format_description, OffsetDateTime};

use crate::entities::{sensor_entities, SensorValue};
use crate::models::SessionSnapshot;

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format.
/// Falls back to the default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Render one sensor value with its unit, e.g. `20.5 V` or `unknown (7)`
///
/// # Arguments
/// * `value` - Reading from a sensor entity
/// * `unit` - Unit suffix, if the sensor has one
/// * `precision` - Decimal places for numbers, 1 when unset
pub fn format_reading(value: &SensorValue, unit: Option<&str>, precision: Option<u8>) -> String {
    match (value, unit) {
        (SensorValue::Number(n), Some(unit)) => {
            format!("{:.*} {}", precision.unwrap_or(1) as usize, n, unit)
        }
        (SensorValue::Number(n), None) => format!("{:.*}", precision.unwrap_or(1) as usize, n),
        (other, _) => other.to_string(),
    }
}

/// Log a summary of the current snapshot
pub fn log_summary(name: &str, address: &str, snapshot: &SessionSnapshot) {
    info!("Summary for {} ({:?}):", name, snapshot.connection);

    if let Some(identity) = &snapshot.identity {
        info!(
            "  Device: {} id={} build={}",
            identity.info.name, identity.info.id, identity.info.build
        );
    }
    if let Some(rssi) = snapshot.signal.rssi {
        info!("  Signal: {} dBm", rssi);
    }

    if snapshot.telemetry.is_none() {
        warn!("  No telemetry received yet");
        return;
    }

    for entity in sensor_entities(address) {
        if let Some(value) = entity.native_value(snapshot) {
            info!(
                "  {}: {}",
                entity.description.name,
                format_reading(
                    &value,
                    entity.description.unit,
                    entity.description.display_precision
                )
            );
        }
    }

    if let Some(updated) = &snapshot.poll.last_update {
        info!("  Last update: {}", format_datetime(updated));
    }
    if snapshot.poll.consecutive_failures > 0 {
        warn!(
            "  Readings are stale: {} failed polls in a row",
            snapshot.poll.consecutive_failures
        );
    }
}
