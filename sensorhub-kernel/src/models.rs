use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Where a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    /// Measured by the board
    Real,
    /// Generated because the board was unreachable
    Synthetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Humidity,
    Light,
    Smoke,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Temperature, Metric::Humidity, Metric::Light, Metric::Smoke];
}

/// One sample of the four sensors. Transient, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub smoke: f64,
    pub timestamp: OffsetDateTime,
    pub source: ReadingSource,
}

impl Reading {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Light => self.light,
            Metric::Smoke => self.smoke,
        }
    }

    pub fn to_wire(&self) -> SensorData {
        SensorData {
            temperature: self.temperature,
            humidity: self.humidity,
            light: self.light,
            smoke: self.smoke,
            timestamp: self.timestamp.format(&Rfc3339).unwrap_or_default(),
            source: self.source,
        }
    }
}

/// Payload of the `sensor_data` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub smoke: f64,
    /// RFC 3339 (ISO-8601) UTC timestamp
    pub timestamp: String,
    pub source: ReadingSource,
}

// server -> dashboard frames
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected { active_connections: usize },
    SensorData(SensorData),
    Pong,
}

// dashboard -> server frames
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    RequestSensorData,
    Ping,
}
