/**
 * DEVICE GATEWAY - HTTP client for the ESP32 sensor board
 *
 * ROLE :
 * Only component that talks to the board. Turns its HTTP answers into
 * normalized `Reading`s and buzzer acknowledgements, or a typed error.
 *
 * HOW IT WORKS :
 * - GET <base>/data -> {temperature, humidity, lightLevel, coLevel}
 * - POST <base>/buzzer and <base>/buzzer/deactivate for the actuator
 * - One shared reqwest client with request + connect timeouts
 * - No retry here: the relay's next cycle is the retry
 */

use crate::config::DeviceConf;
use crate::models::{Reading, ReadingSource};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Connection refused, DNS failure, timeout...
    #[error("device unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("device answered HTTP {0}")]
    BadStatus(u16),
    #[error("malformed device payload: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// True when no HTTP answer was obtained at all
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Unreachable(_))
    }
}

/// Body of `GET /data` as sent by the firmware
#[derive(Debug, Deserialize)]
pub struct GatewayPayload {
    pub temperature: f64,
    pub humidity: f64,
    #[serde(rename = "lightLevel")]
    pub light_level: f64,
    #[serde(rename = "coLevel")]
    pub co_level: f64,
}

impl GatewayPayload {
    pub fn into_reading(self, at: OffsetDateTime) -> Result<Reading, GatewayError> {
        let fields = [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("lightLevel", self.light_level),
            ("coLevel", self.co_level),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(GatewayError::Malformed(format!("{name} is not a finite number")));
        }

        Ok(Reading {
            temperature: self.temperature,
            humidity: self.humidity,
            light: self.light_level,
            smoke: self.co_level,
            timestamp: at,
            source: ReadingSource::Real,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    Activate,
    Deactivate,
}

impl ActuatorCommand {
    fn path(self) -> &'static str {
        match self {
            ActuatorCommand::Activate => "/buzzer",
            ActuatorCommand::Deactivate => "/buzzer/deactivate",
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            ActuatorCommand::Activate => "activate",
            ActuatorCommand::Deactivate => "deactivate",
        }
    }
}

/// Positive acknowledgement from the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub command: ActuatorCommand,
}

#[derive(Debug, Clone)]
pub struct DeviceGateway {
    client: reqwest::Client,
    base_url: String,
}

impl DeviceGateway {
    pub fn new(conf: &DeviceConf) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(conf.request_timeout())
            .connect_timeout(conf.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: conf.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One bounded GET on `/data`
    pub async fn fetch_reading(&self) -> Result<Reading, GatewayError> {
        let called_at = OffsetDateTime::now_utc();
        let url = format!("{}/data", self.base_url);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(GatewayError::BadStatus(status));
        }

        let body = resp.text().await?;
        let payload: GatewayPayload = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let reading = payload.into_reading(called_at)?;
        debug!("[gateway] reading from {}: {:?}", url, reading);
        Ok(reading)
    }

    /// POST on the buzzer route matching `command`; success iff HTTP 200
    pub async fn send_actuator_command(&self, command: ActuatorCommand) -> Result<Ack, GatewayError> {
        let url = format!("{}{}", self.base_url, command.path());

        let resp = self.client.post(&url).send().await?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(GatewayError::BadStatus(status));
        }

        debug!("[gateway] buzzer {} acknowledged", command.verb());
        Ok(Ack { command })
    }
}

#[cfg(test)]
pub(crate) fn test_gateway(base_url: &str, timeout_ms: u64) -> DeviceGateway {
    let conf = DeviceConf {
        base_url: base_url.to_string(),
        request_timeout_ms: timeout_ms,
        connect_timeout_ms: timeout_ms,
    };
    DeviceGateway::new(&conf).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorhub_devkit::fixtures::esp32_payload_without;
    use sensorhub_devkit::{esp32_payload, unreachable_base_url, GatewayStub, StubBehavior};
    use std::time::Duration;

    #[tokio::test]
    async fn test_fetch_maps_fields_exactly() {
        let stub = GatewayStub::start().await.unwrap();
        stub.set_data(StubBehavior::Json(esp32_payload(21.75, 43.5, 12.25, 3.125)));
        let gateway = test_gateway(&stub.base_url(), 2000);

        let before = OffsetDateTime::now_utc();
        let reading = gateway.fetch_reading().await.unwrap();

        assert_eq!(reading.temperature, 21.75);
        assert_eq!(reading.humidity, 43.5);
        assert_eq!(reading.light, 12.25);
        assert_eq!(reading.smoke, 3.125);
        assert_eq!(reading.source, ReadingSource::Real);
        assert!(reading.timestamp >= before);
        assert_eq!(stub.count("/data"), 1);
    }

    #[tokio::test]
    async fn test_fetch_non_200_is_bad_status() {
        let stub = GatewayStub::start().await.unwrap();
        stub.set_data(StubBehavior::Status(500));
        let gateway = test_gateway(&stub.base_url(), 2000);

        let err = gateway.fetch_reading().await.unwrap_err();
        assert!(matches!(err, GatewayError::BadStatus(500)));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_fetch_invalid_json_is_malformed() {
        let stub = GatewayStub::start().await.unwrap();
        stub.set_data(StubBehavior::Raw("<html>oops</html>".into()));
        let gateway = test_gateway(&stub.base_url(), 2000);

        assert!(matches!(gateway.fetch_reading().await, Err(GatewayError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_fetch_missing_field_is_malformed() {
        let stub = GatewayStub::start().await.unwrap();
        stub.set_data(StubBehavior::Json(esp32_payload_without("coLevel")));
        let gateway = test_gateway(&stub.base_url(), 2000);

        let err = gateway.fetch_reading().await.unwrap_err();
        match err {
            GatewayError::Malformed(msg) => assert!(msg.contains("coLevel")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_wrong_type_is_malformed() {
        let stub = GatewayStub::start().await.unwrap();
        stub.set_data(StubBehavior::Json(serde_json::json!({
            "temperature": "hot", "humidity": 50, "lightLevel": 80, "coLevel": 10
        })));
        let gateway = test_gateway(&stub.base_url(), 2000);

        assert!(matches!(gateway.fetch_reading().await, Err(GatewayError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_unreachable() {
        let url = unreachable_base_url().await.unwrap();
        let gateway = test_gateway(&url, 2000);

        let err = gateway.fetch_reading().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_unreachable() {
        let stub = GatewayStub::start().await.unwrap();
        stub.set_latency(Duration::from_millis(500));
        let gateway = test_gateway(&stub.base_url(), 100);

        let started = std::time::Instant::now();
        let err = gateway.fetch_reading().await.unwrap_err();
        assert!(err.is_transport());
        assert!(started.elapsed() < Duration::from_millis(450));
    }

    #[test]
    fn test_non_finite_payload_rejected() {
        let payload = GatewayPayload { temperature: f64::NAN, humidity: 1.0, light_level: 1.0, co_level: 1.0 };
        assert!(matches!(
            payload.into_reading(OffsetDateTime::now_utc()),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_actuator_routes() {
        let stub = GatewayStub::start().await.unwrap();
        let gateway = test_gateway(&format!("{}/", stub.base_url()), 2000);

        let ack = gateway.send_actuator_command(ActuatorCommand::Activate).await.unwrap();
        assert_eq!(ack.command, ActuatorCommand::Activate);
        gateway.send_actuator_command(ActuatorCommand::Deactivate).await.unwrap();

        assert_eq!(stub.count("/buzzer"), 1);
        assert_eq!(stub.count("/buzzer/deactivate"), 1);
    }

    #[tokio::test]
    async fn test_actuator_non_200_fails() {
        let stub = GatewayStub::start().await.unwrap();
        stub.set_deactivate(StubBehavior::Status(404));
        let gateway = test_gateway(&stub.base_url(), 2000);

        let err = gateway.send_actuator_command(ActuatorCommand::Deactivate).await.unwrap_err();
        assert!(matches!(err, GatewayError::BadStatus(404)));
    }
}
