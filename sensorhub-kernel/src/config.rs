use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub server: ServerConf,
    pub device: DeviceConf,
    pub relay: RelayConf,
    pub store: StoreConf,
    pub alarm: AlarmConf,
    pub logging: LoggingConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConf {
    pub bind: String,
    /// Origin allowed by CORS; `None` allows any origin
    pub cors_origin: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceConf {
    /// ESP32 base URL, without trailing slash (ex: "http://192.168.15.124")
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConf {
    pub poll_interval_ms: u64,
    pub broadcast_capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConf {
    pub data_dir: String,
    pub bcrypt_cost: u32,
    pub seed_admin: bool,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AlarmConf {
    pub enabled: bool,
    pub cooldown_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConf {
    pub level: String,
}

impl Default for ServerConf {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".into(),
            cors_origin: Some("http://127.0.0.1:5000".into()),
        }
    }
}

impl Default for DeviceConf {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.15.124".into(),
            request_timeout_ms: 3000,
            connect_timeout_ms: 1500,
        }
    }
}

impl DeviceConf {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for RelayConf {
    fn default() -> Self {
        Self { poll_interval_ms: 3000, broadcast_capacity: 16 }
    }
}

impl RelayConf {
    pub fn poll_interval(&self) -> Duration {
        // tokio::time::interval panics on a zero period
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for StoreConf {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            seed_admin: true,
            admin_username: "admin".into(),
            admin_email: "admin@example.com".into(),
            admin_password: "12345".into(),
        }
    }
}

impl Default for AlarmConf {
    fn default() -> Self {
        Self { enabled: false, cooldown_secs: 30 }
    }
}

impl Default for LoggingConf {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    serde_yaml::from_str(txt)
}

/// Environment variables win over the file
pub fn apply_env_overrides(cfg: &mut KernelConfig) {
    if let Ok(url) = std::env::var("SENSORHUB_DEVICE_URL") {
        cfg.device.base_url = url;
    }
    if let Ok(bind) = std::env::var("SENSORHUB_BIND") {
        cfg.server.bind = bind;
    }
}

/// Loaded before the tracing subscriber exists, so problems are returned
/// as notes and logged by the caller once logging is up.
pub async fn load_config() -> (KernelConfig, Vec<String>) {
    let path = std::env::var("SENSORHUB_CONFIG").unwrap_or_else(|_| "sensorhub.yaml".into());
    let (mut cfg, notes) = load_config_from(&path).await;
    apply_env_overrides(&mut cfg);
    (cfg, notes)
}

pub async fn load_config_from(path: &str) -> (KernelConfig, Vec<String>) {
    let mut notes = Vec::new();

    let cfg = if Path::new(path).exists() {
        match fs::read_to_string(path).await {
            Ok(txt) => parse_config(&txt).unwrap_or_else(|e| {
                notes.push(format!("invalid config {path}: {e}"));
                KernelConfig::default()
            }),
            Err(e) => {
                notes.push(format!("cannot read config {path}: {e}, using default config"));
                KernelConfig::default()
            }
        }
    } else {
        notes.push(format!("no {path}, using default config"));
        KernelConfig::default()
    };

    (cfg, notes)
}

impl KernelConfig {
    pub fn log_summary(&self) {
        info!("[config] bind {}", self.server.bind);
        info!(
            "[config] device {} (timeout {}ms)",
            self.device.base_url, self.device.request_timeout_ms
        );
        info!("[config] poll every {}ms", self.relay.poll_interval_ms);
        info!("[config] data dir {}", self.store.data_dir);
        if self.alarm.enabled {
            info!("[config] alarm enabled (cooldown {}s)", self.alarm.cooldown_secs);
        }
        if self.server.cors_origin.is_none() {
            warn!("[config] CORS open to any origin");
        }
    }
}
