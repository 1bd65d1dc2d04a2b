/**
 * TELEMETRY RELAY - Single poller fanning readings out to every dashboard
 *
 * ROLE :
 * Decides gateway vs fallback for each cycle and publishes the result on a
 * broadcast channel that every WebSocket connection subscribes to.
 *
 * HOW IT WORKS :
 * - sample()       : one gateway attempt, synthetic reading on any error
 * - refresh()      : coalesced sample + publish (callers arriving while a
 *                    fetch is in flight get that fetch's result)
 * - spawn_poller() : the one poll-forever loop, idle without subscribers
 */

use crate::fallback;
use crate::gateway::DeviceGateway;
use crate::health::HealthTracker;
use crate::models::Reading;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

struct Published {
    at: Instant,
    reading: Reading,
}

pub struct TelemetryRelay {
    gateway: DeviceGateway,
    tx: broadcast::Sender<Reading>,
    /// Held for the whole duration of a gateway fetch
    in_flight: tokio::sync::Mutex<()>,
    latest: parking_lot::Mutex<Option<Published>>,
    poller_started: AtomicBool,
    health: HealthTracker,
}

pub type SharedRelay = Arc<TelemetryRelay>;

impl TelemetryRelay {
    pub fn new(gateway: DeviceGateway, capacity: usize, health: HealthTracker) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            gateway,
            tx,
            in_flight: tokio::sync::Mutex::new(()),
            latest: parking_lot::Mutex::new(None),
            poller_started: AtomicBool::new(false),
            health,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Reading> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Last published reading, if any
    pub fn latest(&self) -> Option<Reading> {
        self.latest.lock().as_ref().map(|p| p.reading.clone())
    }

    /// One gateway attempt; never fails
    pub async fn sample(&self) -> Reading {
        match self.gateway.fetch_reading().await {
            Ok(reading) => {
                self.health.mark_gateway_online();
                reading
            }
            Err(e) => {
                warn!("[relay] gateway unavailable, using synthetic reading: {}", e);
                self.health.record_gateway_failure(&e);
                fallback::synthetic_reading()
            }
        }
    }

    /// Fetches (or joins the fetch in flight) and publishes to all subscribers
    pub async fn refresh(&self) -> Reading {
        let requested_at = Instant::now();
        let _fetching = self.in_flight.lock().await;

        if let Some(published) = self.latest.lock().as_ref() {
            if published.at >= requested_at {
                debug!("[relay] joined in-flight fetch");
                return published.reading.clone();
            }
        }

        let reading = self.sample().await;
        self.publish(reading.clone());
        reading
    }

    fn publish(&self, reading: Reading) {
        self.health.record_published(reading.source);
        *self.latest.lock() = Some(Published { at: Instant::now(), reading: reading.clone() });

        match self.tx.send(reading) {
            Ok(receivers) => debug!("[relay] sensor_data sent to {} subscribers", receivers),
            Err(_) => debug!("[relay] sensor_data published with no subscriber"),
        }
    }

    /// Starts the poll loop. Only the first call spawns anything.
    /// Cycles with no subscriber are skipped; aborting the handle cancels
    /// the fetch in flight.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if self.poller_started.swap(true, Ordering::SeqCst) {
            warn!("[relay] poller already running, ignoring second start");
            return None;
        }

        info!("[relay] polling {} every {:?}", self.gateway.base_url(), interval);
        let relay = self.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if relay.subscriber_count() == 0 {
                    continue;
                }

                let reading = relay.refresh().await;
                debug!(
                    "[relay] cycle done: {:.1}°C {:.1}% light {:.1} smoke {:.1} ({:?})",
                    reading.temperature, reading.humidity, reading.light, reading.smoke, reading.source
                );
            }
        }))
    }
}
