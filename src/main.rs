use std::sync::Arc;

use log::{error, info, warn};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use pinecil_ble::bluetooth::client::BluerClient;
use pinecil_ble::bluetooth::scanner::{open_adapter, watch_advertisements};
use pinecil_ble::entities::DeviceRegistryInfo;
use pinecil_ble::utils::log_summary;
use pinecil_ble::{PinecilSession, SessionConfig};

async fn main_loop(
    session: Arc<PinecilSession>,
    adapter: bluer::Adapter,
    scanning: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = session.config().clone();
    info!("Starting Pinecil session for {}", config.address);

    let client = match BluerClient::new(&adapter, &config.address) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to open device {}: {}", config.address, e);
            return Err(e.into());
        }
    };
    session.bind_device(Arc::new(client));

    // Feed advertisements into the session
    let scanner = {
        let session = session.clone();
        tokio::spawn(async move {
            let result = watch_advertisements(&adapter, scanning, move |advertisement| {
                session.on_advertisement(&advertisement);
            })
            .await;
            if let Err(e) = result {
                error!("Advertisement scan stopped: {}", e);
            }
        })
    };

    let poller = session.spawn();

    if session.wait_ready(config.timeout).await {
        let snapshot = session.snapshot();
        let device = DeviceRegistryInfo::new(
            &config.address,
            &config.name,
            &config.model,
            snapshot.identity.as_ref(),
        );
        info!(
            "{} is in range: {} {} (firmware {})",
            device.name,
            device.manufacturer,
            device.model,
            device.sw_version.as_deref().unwrap_or("unknown")
        );
    } else {
        warn!(
            "{} not seen within {:?}, still listening",
            config.name, config.timeout
        );
    }

    let mut summary = interval(config.summary_interval);
    summary.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        summary.tick().await;
        if scanner.is_finished() || poller.is_finished() {
            return Err("background task exited".into());
        }
        log_summary(&config.name, &config.address, &session.snapshot());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match SessionConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let adapter = open_adapter().await?;
    let session = Arc::new(PinecilSession::new(config));
    let scanning = CancellationToken::new();

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        let _ = tx.send(());
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(session.clone(), adapter, scanning.clone()) => {
            match result {
                Ok(_) => info!("Program completed successfully"),
                Err(e) => error!("Fatal error: {}", e),
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    scanning.cancel();
    session.shutdown();
    log_summary(
        &session.config().name,
        session.address(),
        &session.snapshot(),
    );

    Ok(())
}
