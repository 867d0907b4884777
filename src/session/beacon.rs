/// Advertisement debouncing
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::models::Advertisement;
use crate::session::state::SessionState;

/// IronOS bulk data service, present in every Pinecil advertisement
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x9eae1000_9d0d_48c5_aa55_33e27f9bc533);

/// Minimum spacing between two accepted advertisements
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    ForeignAddress,
    MissingServiceMarker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisementOutcome {
    Ignored(IgnoreReason),
    Debounced,
    Accepted { poll_requested: bool },
}

/// Turns the advertisement stream into rate-limited wake-ups
#[derive(Debug)]
pub struct BeaconDebouncer {
    address: String,
    interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
    state: Arc<SessionState>,
}

impl BeaconDebouncer {
    pub fn new(address: impl Into<String>, state: Arc<SessionState>) -> Self {
        Self {
            address: address.into(),
            interval: DEBOUNCE_INTERVAL,
            last_accepted: Mutex::new(None),
            state,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn on_advertisement(&self, advertisement: &Advertisement) -> AdvertisementOutcome {
        self.on_advertisement_at(advertisement, Instant::now())
    }

    pub fn on_advertisement_at(
        &self,
        advertisement: &Advertisement,
        now: Instant,
    ) -> AdvertisementOutcome {
        if !advertisement.address.eq_ignore_ascii_case(&self.address) {
            debug!(
                "Ignoring advertisement from {} (tracking {})",
                advertisement.address, self.address
            );
            return AdvertisementOutcome::Ignored(IgnoreReason::ForeignAddress);
        }

        if !advertisement.service_uuids.contains(&SERVICE_UUID) {
            debug!(
                "Ignoring advertisement from {} without the bulk service",
                advertisement.address
            );
            return AdvertisementOutcome::Ignored(IgnoreReason::MissingServiceMarker);
        }

        {
            let mut last = self
                .last_accepted
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = *last {
                if now.saturating_duration_since(previous) < self.interval {
                    trace!("Debounced advertisement from {}", advertisement.address);
                    return AdvertisementOutcome::Debounced;
                }
            }
            *last = Some(now);
        }

        let poll_requested = self.state.accept_advertisement(advertisement.rssi, now);
        trace!(
            "Accepted advertisement from {}: rssi={:?}, poll requested: {}",
            advertisement.address,
            advertisement.rssi,
            poll_requested
        );
        AdvertisementOutcome::Accepted { poll_requested }
    }
}
