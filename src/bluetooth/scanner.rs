/// Bluetooth Low Energy adapter setup and advertisement watching
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::DeviceError;
use crate::models::Advertisement;

/// Open the default BlueZ adapter and make sure it is powered
pub async fn open_adapter() -> Result<bluer::Adapter, DeviceError> {
    // Initialize Bluetooth session
    let session = match bluer::Session::new().await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create Bluetooth session: {}", e);
            return Err(e.into());
        }
    };

    // Get the default Bluetooth adapter
    let adapter = match session.default_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to get default Bluetooth adapter: {}", e);
            return Err(e.into());
        }
    };

    // Ensure Bluetooth adapter is powered on
    if let Err(e) = adapter.set_powered(true).await {
        error!("Failed to power on adapter: {}", e);
        return Err(e.into());
    }

    info!("Using Bluetooth adapter {}", adapter.name());
    Ok(adapter)
}

/// Read the advertised properties BlueZ keeps for `device`
async fn advertisement_for(device: &bluer::Device) -> Advertisement {
    let rssi = device.rssi().await.ok().flatten();
    let service_uuids = device
        .uuids()
        .await
        .ok()
        .flatten()
        .map(|uuids| uuids.into_iter().collect())
        .unwrap_or_default();
    let local_name = device.name().await.ok().flatten();

    Advertisement {
        address: device.address().to_string(),
        rssi,
        service_uuids,
        local_name,
    }
}

/// Forward every advertisement BlueZ reports until `shutdown` fires
///
/// Discovery runs with duplicate reporting enabled so that each broadcast of
/// an already-known device shows up again as a property change; the callback
/// does its own filtering and rate limiting.
///
/// # Arguments
/// * `adapter` - Powered adapter from [`open_adapter`]
/// * `shutdown` - Token that ends the watch
/// * `on_advertisement` - Called once per reported broadcast
///
/// # Returns
/// Ok(()) when cancelled or when BlueZ ends the stream, error if discovery
/// could not be started
pub async fn watch_advertisements<F>(
    adapter: &bluer::Adapter,
    shutdown: CancellationToken,
    mut on_advertisement: F,
) -> Result<(), DeviceError>
where
    F: FnMut(Advertisement),
{
    // Configure discovery filter for Low Energy devices only
    let filter = bluer::DiscoveryFilter {
        transport: bluer::DiscoveryTransport::Le, // Bluetooth Low Energy only
        duplicate_data: true,                     // Report every broadcast
        ..Default::default()
    };

    // Apply the discovery filter (warn if it fails, but continue)
    if let Err(e) = adapter.set_discovery_filter(filter).await {
        warn!("Failed to set discovery filter: {}", e);
    }

    let events = match adapter.discover_devices_with_changes().await {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to start device discovery: {}", e);
            return Err(e.into());
        }
    };
    tokio::pin!(events);

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.next() => event,
        };

        match event {
            Some(bluer::AdapterEvent::DeviceAdded(addr)) => {
                let device = match adapter.device(addr) {
                    Ok(device) => device,
                    Err(e) => {
                        debug!("Failed to open device {}: {}", addr, e);
                        continue;
                    }
                };
                on_advertisement(advertisement_for(&device).await);
            }
            Some(event) => debug!("Discovery event: {:?}", event),
            None => {
                warn!("Device discovery stream ended");
                break;
            }
        }
    }

    Ok(())
}
