use crate::connections::ConnectionRegistry;
use crate::gateway::GatewayError;
use crate::models::ReadingSource;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub active_connections: usize,
    pub readings_published: u64,
    pub real_readings: u64,
    pub synthetic_readings: u64,
    pub gateway_failures: u64,
    pub gateway_status: String,
    pub last_gateway_error: Option<String>,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    real_readings: Arc<AtomicU64>,
    synthetic_readings: Arc<AtomicU64>,
    gateway_failures: Arc<AtomicU64>,
    gateway_status: Arc<parking_lot::Mutex<String>>,
    last_gateway_error: Arc<parking_lot::Mutex<Option<String>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            real_readings: Arc::new(AtomicU64::new(0)),
            synthetic_readings: Arc::new(AtomicU64::new(0)),
            gateway_failures: Arc::new(AtomicU64::new(0)),
            gateway_status: Arc::new(parking_lot::Mutex::new("unknown".to_string())),
            last_gateway_error: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn mark_gateway_online(&self) {
        *self.gateway_status.lock() = "online".to_string();
    }

    pub fn record_gateway_failure(&self, err: &GatewayError) {
        self.gateway_failures.fetch_add(1, Ordering::Relaxed);
        *self.gateway_status.lock() = "degraded".to_string();
        *self.last_gateway_error.lock() = Some(err.to_string());
    }

    pub fn record_published(&self, source: ReadingSource) {
        let counter = match source {
            ReadingSource::Real => &self.real_readings,
            ReadingSource::Synthetic => &self.synthetic_readings,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, connections: &ConnectionRegistry) -> KernelHealth {
        let real = self.real_readings.load(Ordering::Relaxed);
        let synthetic = self.synthetic_readings.load(Ordering::Relaxed);

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            active_connections: connections.count(),
            readings_published: real + synthetic,
            real_readings: real,
            synthetic_readings: synthetic,
            gateway_failures: self.gateway_failures.load(Ordering::Relaxed),
            gateway_status: self.gateway_status.lock().clone(),
            last_gateway_error: self.last_gateway_error.lock().clone(),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<u64>() {
                            return (kb as f32) / 1024.0; // KB -> MB
                        }
                    }
                }
            }
        }
    }

    0.0
}
