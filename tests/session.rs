mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use common::{advertisement, session_with, MockClient, ADDRESS};
use pinecil_ble::entities::{number_entities, sensor_entities, SensorValue};
use pinecil_ble::session::IgnoreReason;
use pinecil_ble::{
    AdvertisementOutcome, ConnectError, ConnectionState, PinecilSession, PollError, PollOutcome,
    PowerSource, ReadError, WriteError,
};

const LIMIT: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_attempt() {
    let client = MockClient::new().with_delay(Duration::from_millis(100));
    let session = Arc::new(session_with(client.clone()));

    let mut callers = JoinSet::new();
    for _ in 0..5 {
        let session = session.clone();
        callers.spawn(async move {
            session
                .connection()
                .ensure_connected(LIMIT)
                .await
                .map(|_| ())
        });
    }
    while let Some(result) = callers.join_next().await {
        assert_eq!(result.unwrap(), Ok(()));
    }

    assert_eq!(MockClient::count(&client.connects), 1);
    assert_eq!(MockClient::count(&client.settings_reads), 1);
    assert_eq!(session.connection_state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_join_a_failed_attempt() {
    let client = MockClient::new().with_delay(Duration::from_millis(100));
    client.fail_connect.store(true, Ordering::SeqCst);
    let session = Arc::new(session_with(client.clone()));

    let mut callers = JoinSet::new();
    for _ in 0..3 {
        let session = session.clone();
        callers.spawn(async move {
            session
                .connection()
                .ensure_connected(LIMIT)
                .await
                .map(|_| ())
        });
    }
    while let Some(result) = callers.join_next().await {
        assert!(matches!(result.unwrap(), Err(ConnectError::Transport(_))));
    }

    assert_eq!(MockClient::count(&client.connects), 1);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_connected_client_is_reused() {
    let client = MockClient::new();
    let session = session_with(client.clone());

    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));
    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));

    assert_eq!(MockClient::count(&client.connects), 1);
    assert_eq!(MockClient::count(&client.live_reads), 2);
}

#[tokio::test(start_paused = true)]
async fn test_tick_while_polling_is_dropped() {
    let client = MockClient::new().with_delay(Duration::from_millis(500));
    let session = Arc::new(session_with(client.clone()));

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.tick().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(session.tick().await, PollOutcome::Busy);
    assert!(matches!(first.await.unwrap(), PollOutcome::Updated(_)));
    assert_eq!(MockClient::count(&client.live_reads), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_publishes_normalized_telemetry() {
    let client = MockClient::new();
    let session = session_with(client);

    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));

    let snapshot = session.snapshot();
    let telemetry = snapshot.telemetry.as_ref().unwrap();
    assert_eq!(telemetry.live_temp, 318);
    assert_eq!(telemetry.voltage, 20.5);
    assert_eq!(telemetry.power_source, Ok(PowerSource::Pd));
    assert_eq!(telemetry.max_tip_temp, 450);
    assert_eq!(snapshot.poll.last_success, Some(true));
    assert!(snapshot.poll.last_update.is_some());

    let identity = snapshot.identity.unwrap();
    assert_eq!(identity.address, ADDRESS);
    assert_eq!(identity.model, "Pinecil v2");
    assert_eq!(identity.info.build, "v2.22");
    assert_eq!(snapshot.settings.get("SetTemperature"), Some(&320));
}

#[tokio::test(start_paused = true)]
async fn test_failed_poll_keeps_stale_telemetry() {
    let client = MockClient::new();
    let session = session_with(client.clone());
    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));
    let before = session.snapshot().telemetry;

    client.fail_live.store(true, Ordering::SeqCst);
    assert!(matches!(
        session.tick().await,
        PollOutcome::Failed(PollError::Read(ReadError::Device(_)))
    ));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.telemetry, before);
    assert_eq!(snapshot.poll.last_success, Some(false));
    assert_eq!(snapshot.poll.consecutive_failures, 1);
    assert!(!snapshot.poll_needed);

    client.fail_live.store(false, Ordering::SeqCst);
    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));
    assert_eq!(session.snapshot().poll.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_advertisement_before_telemetry_requests_poll() {
    let client = MockClient::new();
    client.fail_connect.store(true, Ordering::SeqCst);
    let session = session_with(client.clone());

    assert_eq!(
        session.on_advertisement(&advertisement(&ADDRESS.to_lowercase())),
        AdvertisementOutcome::Accepted {
            poll_requested: true
        }
    );
    let snapshot = session.snapshot();
    assert!(snapshot.poll_needed);
    assert_eq!(snapshot.signal.rssi, Some(-61));

    assert!(matches!(
        session.tick().await,
        PollOutcome::Failed(PollError::Connect(ConnectError::Transport(_)))
    ));
    assert!(!session.snapshot().poll_needed);

    assert_eq!(
        session.on_advertisement(&advertisement(ADDRESS)),
        AdvertisementOutcome::Debounced
    );
    assert_eq!(
        session.on_advertisement(&advertisement("AA:BB:CC:DD:EE:FF")),
        AdvertisementOutcome::Ignored(IgnoreReason::ForeignAddress)
    );
}

#[tokio::test(start_paused = true)]
async fn test_advertisement_with_telemetry_does_not_request_poll() {
    let client = MockClient::new();
    let session = session_with(client);
    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));

    assert_eq!(
        session.on_advertisement(&advertisement(ADDRESS)),
        AdvertisementOutcome::Accepted {
            poll_requested: false
        }
    );
    assert!(!session.snapshot().poll_needed);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_is_soft() {
    let client = MockClient::new().with_delay(Duration::from_secs(10));
    let session = session_with(client.clone());

    assert!(matches!(
        session.tick().await,
        PollOutcome::Failed(PollError::Connect(ConnectError::Timeout(_)))
    ));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    *client.delay.lock().unwrap() = Duration::ZERO;
    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));
    assert_eq!(session.connection_state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_connect_is_retried_once() {
    let client = MockClient::new();
    client.settings_failures.store(1, Ordering::SeqCst);
    let session = session_with(client.clone());

    assert!(session.connection().ensure_connected(LIMIT).await.is_ok());
    assert_eq!(MockClient::count(&client.settings_reads), 2);
    assert_eq!(session.snapshot().setting("SleepTemperature"), Some(150));
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_connect_fails_after_retry() {
    let client = MockClient::new();
    client.settings_failures.store(2, Ordering::SeqCst);
    let session = session_with(client.clone());

    assert!(matches!(
        session.connection().ensure_connected(LIMIT).await,
        Err(ConnectError::Incomplete(_))
    ));
    assert_eq!(MockClient::count(&client.settings_reads), 2);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.snapshot().identity.is_none());

    // The next trigger starts a fresh attempt
    assert!(session.connection().ensure_connected(LIMIT).await.is_ok());
    assert_eq!(MockClient::count(&client.connects), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unbound_session_reports_no_device() {
    let session = PinecilSession::new(common::config());

    assert_eq!(session.tick().await, PollOutcome::NoDevice);
    assert_eq!(
        session.set_setting("SetTemperature", 300).await,
        Err(WriteError::Connect(ConnectError::NoDevice))
    );
}

#[tokio::test(start_paused = true)]
async fn test_set_setting_updates_cache() {
    let client = MockClient::new();
    let session = session_with(client.clone());

    session.set_setting("SetTemperature", 300).await.unwrap();

    assert_eq!(session.snapshot().setting("SetTemperature"), Some(300));
    assert_eq!(
        client.settings.lock().unwrap().get("SetTemperature"),
        Some(&300)
    );
}

#[tokio::test(start_paused = true)]
async fn test_set_setting_range_follows_telemetry() {
    let client = MockClient::new();
    let session = session_with(client.clone());

    // Without telemetry the fallback maximum applies
    assert_eq!(session.allowed_range("SetTemperature"), Ok((0, 500)));

    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));
    assert_eq!(session.allowed_range("SetTemperature"), Ok((0, 450)));

    assert_eq!(
        session.set_setting("SetTemperature", 460).await,
        Err(WriteError::OutOfRange {
            key: "SetTemperature".to_string(),
            value: 460,
            min: 0,
            max: 450
        })
    );
    assert_eq!(MockClient::count(&client.writes), 0);
    assert_eq!(session.snapshot().setting("SetTemperature"), Some(320));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_setting_is_rejected() {
    let client = MockClient::new();
    let session = session_with(client.clone());
    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));

    assert_eq!(
        session.set_setting("NoSuchSetting", 1).await,
        Err(WriteError::UnknownSetting("NoSuchSetting".to_string()))
    );
    assert_eq!(MockClient::count(&client.writes), 0);

    // Settings the device reported are writable within the u16 range
    session.set_setting("SleepTemperature", 200).await.unwrap();
    assert_eq!(session.snapshot().setting("SleepTemperature"), Some(200));
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_leaves_cache_untouched() {
    let client = MockClient::new();
    client.fail_write.store(true, Ordering::SeqCst);
    let session = session_with(client.clone());

    assert!(matches!(
        session.set_setting("SetTemperature", 300).await,
        Err(WriteError::Device(_))
    ));
    assert_eq!(MockClient::count(&client.writes), 1);
    assert_eq!(session.snapshot().setting("SetTemperature"), Some(320));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_keeps_identity() {
    let client = MockClient::new();
    let session = session_with(client.clone());
    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));

    session.disconnect().await;
    session.disconnect().await;

    assert_eq!(MockClient::count(&client.disconnects), 1);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    let snapshot = session.snapshot();
    assert!(snapshot.identity.is_some());
    assert!(snapshot.telemetry.is_some());

    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));
    assert_eq!(MockClient::count(&client.connects), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_fails_fast() {
    let client = MockClient::new();
    let session = session_with(client.clone());

    session.shutdown();

    assert!(session.is_shut_down());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(
        session.set_setting("SetTemperature", 300).await,
        Err(WriteError::Connect(ConnectError::Closed))
    );
    assert_eq!(session.tick().await, PollOutcome::NoDevice);
    assert_eq!(MockClient::count(&client.connects), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_inflight_connect() {
    let client = MockClient::new().with_delay(Duration::from_secs(30));
    let session = Arc::new(session_with(client));

    let pending = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .connection()
                .ensure_connected(Duration::from_secs(60))
                .await
                .map(|_| ())
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let started = tokio::time::Instant::now();

    session.shutdown();

    assert_eq!(pending.await.unwrap(), Err(ConnectError::Closed));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_wait_ready() {
    let client = MockClient::new();
    let session = session_with(client);

    assert!(!session.wait_ready(Duration::from_secs(2)).await);

    session.on_advertisement(&advertisement(ADDRESS));
    assert!(session.wait_ready(Duration::from_secs(2)).await);
}

#[tokio::test(start_paused = true)]
async fn test_poll_loop_runs_until_shutdown() {
    let client = MockClient::new();
    let session = session_with(client.clone());

    let handle = session.spawn();
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(MockClient::count(&client.live_reads) >= 3);

    session.shutdown();
    handle.await.unwrap();
    let reads = MockClient::count(&client.live_reads);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(MockClient::count(&client.live_reads), reads);
}

#[tokio::test(start_paused = true)]
async fn test_entities_read_from_snapshot() {
    let client = MockClient::new();
    let session = session_with(client);
    assert!(matches!(session.tick().await, PollOutcome::Updated(_)));
    let snapshot = session.snapshot();

    let sensors = sensor_entities(ADDRESS);
    let power = sensors
        .iter()
        .find(|entity| entity.description.key == "PowerSource")
        .unwrap();
    assert_eq!(power.native_value(&snapshot), Some(SensorValue::Text("PD")));

    let numbers = number_entities(ADDRESS);
    let set_temp = &numbers[0];
    assert_eq!(set_temp.native_value(&snapshot), Some(320));
    assert_eq!(set_temp.max_value(&snapshot), 450);

    set_temp.set_native_value(&session, 299.6).await.unwrap();
    assert_eq!(set_temp.native_value(&session.snapshot()), Some(300));
}

#[tokio::test(start_paused = true)]
async fn test_non_finite_number_is_rejected() {
    let client = MockClient::new();
    let session = session_with(client.clone());
    let set_temp = &number_entities(ADDRESS)[0];

    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        assert!(matches!(
            set_temp.set_native_value(&session, value).await,
            Err(WriteError::InvalidValue { .. })
        ));
    }

    assert_eq!(MockClient::count(&client.writes), 0);
    assert_eq!(
        client.settings.lock().unwrap().get("SetTemperature"),
        Some(&320)
    );
}

#[tokio::test(start_paused = true)]
async fn test_advertisement_wakes_poll_loop_early() {
    let client = MockClient::new();
    client.fail_connect.store(true, Ordering::SeqCst);
    let session = session_with(client.clone());

    let handle = session.spawn();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(MockClient::count(&client.connects), 1);
    assert_eq!(MockClient::count(&client.live_reads), 0);

    client.fail_connect.store(false, Ordering::SeqCst);
    let woke_at = tokio::time::Instant::now();
    assert_eq!(
        session.on_advertisement(&advertisement(ADDRESS)),
        AdvertisementOutcome::Accepted {
            poll_requested: true
        }
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(MockClient::count(&client.connects), 2);
    assert_eq!(MockClient::count(&client.live_reads), 1);
    assert!(woke_at.elapsed() < Duration::from_millis(500));
    assert!(session.snapshot().telemetry.is_some());

    session.shutdown();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_trigger_storm_never_overlaps_polls() {
    let client = MockClient::new().with_delay(Duration::from_millis(200));
    let session = Arc::new(session_with(client.clone()));

    let mut triggers = JoinSet::new();
    for _ in 0..16 {
        let session = session.clone();
        triggers.spawn(async move {
            let mut updated = 0;
            let mut busy = 0;
            for _ in 0..10 {
                session.on_advertisement(&advertisement(ADDRESS));
                match session.tick().await {
                    PollOutcome::Updated(_) => updated += 1,
                    PollOutcome::Busy => busy += 1,
                    other => panic!("unexpected outcome {:?}", other),
                }
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            (updated, busy)
        });
    }

    let mut updated = 0;
    let mut busy = 0;
    while let Some(result) = triggers.join_next().await {
        let (u, b) = result.unwrap();
        updated += u;
        busy += b;
    }

    assert!(updated >= 1);
    assert!(busy > 0);
    assert_eq!(MockClient::count(&client.live_reads), updated);
    assert_eq!(MockClient::count(&client.connects), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_waits_for_inflight_connect() {
    let client = MockClient::new().with_delay(Duration::from_millis(200));
    let session = Arc::new(session_with(client.clone()));

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .connection()
                .ensure_connected(LIMIT)
                .await
                .map(|_| ())
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.connection_state(), ConnectionState::Connecting);

    session.disconnect().await;

    assert_eq!(connecting.await.unwrap(), Ok(()));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(MockClient::count(&client.disconnects), 1);
    assert!(!client.connected.load(Ordering::SeqCst));
}
