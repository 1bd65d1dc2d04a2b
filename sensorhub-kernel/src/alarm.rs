//! Server-side alarm: rings the buzzer when a published reading reaches a
//! stored threshold. Subscribes to the relay like any dashboard.

use crate::gateway::{ActuatorCommand, DeviceGateway};
use crate::models::{Metric, Reading, ReadingSource};
use crate::relay::SharedRelay;
use crate::store::{DeviceStore, ThresholdProfile};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Breached metrics per device, only for devices with at least one breach
pub fn evaluate(profiles: &[ThresholdProfile], reading: &Reading) -> Vec<(String, Vec<Metric>)> {
    profiles
        .iter()
        .map(|p| (p.device_id.clone(), p.breaches(reading)))
        .filter(|(_, metrics)| !metrics.is_empty())
        .collect()
}

#[derive(Debug)]
pub struct AlarmState {
    last_fired: Option<Instant>,
    cooldown: Duration,
}

impl AlarmState {
    pub fn new(cooldown: Duration) -> Self {
        Self { last_fired: None, cooldown }
    }

    /// Records a firing at `now` unless the previous one is too recent
    pub fn should_fire(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now.duration_since(last) < self.cooldown => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }
}

pub fn spawn_alarm_watcher(
    relay: SharedRelay,
    devices: Arc<DeviceStore>,
    gateway: DeviceGateway,
    cooldown: Duration,
) -> JoinHandle<()> {
    let mut readings = relay.subscribe();
    info!("[alarm] watching readings (cooldown {:?})", cooldown);

    tokio::spawn(async move {
        let mut state = AlarmState::new(cooldown);

        loop {
            let reading = match readings.recv().await {
                Ok(reading) => reading,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[alarm] lagging, {} readings skipped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            // synthetic values are noise, not measurements
            if reading.source != ReadingSource::Real {
                continue;
            }

            let breaches = evaluate(&devices.all_profiles(), &reading);
            if breaches.is_empty() || !state.should_fire(Instant::now()) {
                continue;
            }

            for (device_id, metrics) in &breaches {
                warn!("[alarm] device {} over threshold: {:?}", device_id, metrics);
            }

            match gateway.send_actuator_command(ActuatorCommand::Activate).await {
                Ok(_) => info!("[alarm] buzzer activated"),
                Err(e) => error!("[alarm] failed to activate buzzer: {}", e),
            }
        }

        debug!("[alarm] relay closed, watcher stopping");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::test_gateway;
    use crate::health::HealthTracker;
    use crate::relay::TelemetryRelay;
    use crate::store::LimitsUpdate;
    use sensorhub_devkit::{esp32_payload, GatewayStub, StubBehavior};
    use time::OffsetDateTime;

    fn profile(id: &str, temperature: Option<i64>, smoke: Option<i64>) -> ThresholdProfile {
        ThresholdProfile {
            device_id: id.into(),
            light: None,
            humidity: None,
            temperature,
            smoke,
        }
    }

    fn reading(temperature: f64, smoke: f64) -> Reading {
        Reading {
            temperature,
            humidity: 50.0,
            light: 80.0,
            smoke,
            timestamp: OffsetDateTime::now_utc(),
            source: ReadingSource::Real,
        }
    }

    #[test]
    fn test_evaluate_keeps_only_breaching_devices() {
        let profiles = vec![
            profile("kitchen", Some(30), None),
            profile("garage", None, Some(10)),
            profile("attic", None, None),
        ];

        let hits = evaluate(&profiles, &reading(25.0, 10.0));
        assert_eq!(hits, vec![("garage".to_string(), vec![Metric::Smoke])]);

        assert!(evaluate(&profiles, &reading(25.0, 9.9)).is_empty());
    }

    #[test]
    fn test_cooldown() {
        let mut state = AlarmState::new(Duration::from_secs(30));
        let t0 = Instant::now();

        assert!(state.should_fire(t0));
        assert!(!state.should_fire(t0 + Duration::from_secs(10)));
        assert!(state.should_fire(t0 + Duration::from_secs(30)));
        assert!(!state.should_fire(t0 + Duration::from_secs(31)));
    }

    #[tokio::test]
    async fn test_watcher_rings_buzzer_once_per_cooldown() {
        let stub = GatewayStub::start().await.unwrap();
        stub.set_data(StubBehavior::Json(esp32_payload(35.0, 50.0, 80.0, 10.0)));
        let gateway = test_gateway(&stub.base_url(), 2000);
        let relay = Arc::new(TelemetryRelay::new(gateway.clone(), 16, HealthTracker::new()));

        let dir = tempfile::tempdir().unwrap();
        let devices = Arc::new(DeviceStore::open(dir.path().join("devices.json")).unwrap());
        let d = devices.add("maya@example.com", "Kitchen", "ESP32").unwrap();
        devices
            .modify_limits("maya@example.com", &d.id, &LimitsUpdate { temperature_limit: Some(30), ..Default::default() })
            .unwrap();

        let watcher = spawn_alarm_watcher(relay.clone(), devices, gateway, Duration::from_secs(60));
        relay.refresh().await;
        relay.refresh().await;

        let mut waited = 0;
        while stub.count("/buzzer") == 0 && waited < 2000 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 10;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        watcher.abort();

        assert_eq!(stub.count("/buzzer"), 1);
    }
}
