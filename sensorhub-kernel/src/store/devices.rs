use super::{JsonCollection, StoreError};
use crate::models::{Metric, Reading};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

/// A sensor board registered by a user, with its alert limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub user_email: String,
    pub device_name: String,
    pub device_type: String,
    pub light_level: Option<i64>,
    pub humidity_level: Option<i64>,
    pub temperature: Option<i64>,
    pub smoke_level: Option<i64>,
}

/// Entry of `GET /get_devices`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceView {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
}

/// Limits to change; `None` leaves the current value
#[derive(Debug, Clone, Default)]
pub struct LimitsUpdate {
    pub light_limit: Option<i64>,
    pub humidity_limit: Option<i64>,
    pub temperature_limit: Option<i64>,
    pub smoke_limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdProfile {
    #[serde(skip)]
    pub device_id: String,
    pub light: Option<i64>,
    pub humidity: Option<i64>,
    pub temperature: Option<i64>,
    pub smoke: Option<i64>,
}

impl ThresholdProfile {
    pub fn limit(&self, metric: Metric) -> Option<i64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Light => self.light,
            Metric::Smoke => self.smoke,
        }
    }

    /// Metrics at or above their limit; unset limits never trigger
    pub fn breaches(&self, reading: &Reading) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|m| matches!(self.limit(*m), Some(limit) if reading.value(*m) >= limit as f64))
            .collect()
    }
}

impl From<&Device> for ThresholdProfile {
    fn from(d: &Device) -> Self {
        Self {
            device_id: d.id.clone(),
            light: d.light_level,
            humidity: d.humidity_level,
            temperature: d.temperature,
            smoke: d.smoke_level,
        }
    }
}

impl From<&Device> for DeviceView {
    fn from(d: &Device) -> Self {
        Self {
            id: d.id.clone(),
            name: d.device_name.clone(),
            device_type: d.device_type.clone(),
        }
    }
}

fn device_not_found() -> StoreError {
    StoreError::NotFound("Device not found.".into())
}

pub struct DeviceStore {
    devices: JsonCollection<Device>,
}

impl DeviceStore {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        Ok(Self { devices: JsonCollection::open(path)? })
    }

    pub fn add(&self, user_email: &str, device_name: &str, device_type: &str) -> Result<Device, StoreError> {
        if device_name.trim().is_empty() || device_type.trim().is_empty() {
            return Err(StoreError::Invalid("device_name and device_type are required".into()));
        }

        let device = Device {
            id: Uuid::new_v4().to_string(),
            user_email: user_email.to_string(),
            device_name: device_name.to_string(),
            device_type: device_type.to_string(),
            light_level: None,
            humidity_level: None,
            temperature: None,
            smoke_level: None,
        };

        self.devices.update(|devices| {
            devices.push(device.clone());
            Ok(())
        })?;
        info!("[store] device {} added for {}", device.id, user_email);
        Ok(device)
    }

    /// Only devices owned by `owner_email` can be modified
    pub fn modify_limits(&self, owner_email: &str, device_id: &str, limits: &LimitsUpdate) -> Result<Device, StoreError> {
        self.devices.update(|devices| {
            let device = devices
                .iter_mut()
                .find(|d| d.id == device_id && d.user_email == owner_email)
                .ok_or_else(device_not_found)?;

            if let Some(v) = limits.light_limit {
                device.light_level = Some(v);
            }
            if let Some(v) = limits.humidity_limit {
                device.humidity_level = Some(v);
            }
            if let Some(v) = limits.temperature_limit {
                device.temperature = Some(v);
            }
            if let Some(v) = limits.smoke_limit {
                device.smoke_level = Some(v);
            }
            Ok(device.clone())
        })
    }

    pub fn remove(&self, owner_email: &str, device_id: &str) -> Result<(), StoreError> {
        self.devices.update(|devices| {
            let before = devices.len();
            devices.retain(|d| !(d.id == device_id && d.user_email == owner_email));
            if devices.len() == before {
                return Err(device_not_found());
            }
            Ok(())
        })?;
        info!("[store] device {} removed", device_id);
        Ok(())
    }

    pub fn list_for_user(&self, user_email: &str) -> Vec<Device> {
        self.devices.read(|devices| {
            devices.iter().filter(|d| d.user_email == user_email).cloned().collect()
        })
    }

    /// Thresholds of the user's first device
    pub fn thresholds_for_email(&self, user_email: &str) -> Option<ThresholdProfile> {
        self.devices.read(|devices| {
            devices.iter().find(|d| d.user_email == user_email).map(ThresholdProfile::from)
        })
    }

    pub fn all_profiles(&self) -> Vec<ThresholdProfile> {
        self.devices.read(|devices| devices.iter().map(ThresholdProfile::from).collect())
    }

    /// Moves devices to a user's new email; returns how many moved
    pub fn rekey_owner(&self, old_email: &str, new_email: &str) -> Result<usize, StoreError> {
        if old_email == new_email {
            return Ok(0);
        }
        self.devices.update(|devices| {
            let mut moved = 0;
            for device in devices.iter_mut().filter(|d| d.user_email == old_email) {
                device.user_email = new_email.to_string();
                moved += 1;
            }
            Ok(moved)
        })
    }
}
