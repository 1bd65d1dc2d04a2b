/*!
Payload fixtures matching the ESP32 firmware

The board answers `GET /data` with camelCase keys (`lightLevel`, `coLevel`).
These helpers build such bodies and a base URL nobody listens on.
*/

use serde_json::Value;
use tokio::net::TcpListener;
use anyhow::Result;

/// Body of a `GET /data` answer from the board
pub fn esp32_payload(temperature: f64, humidity: f64, light_level: f64, co_level: f64) -> Value {
    serde_json::json!({
        "temperature": temperature,
        "humidity": humidity,
        "lightLevel": light_level,
        "coLevel": co_level
    })
}

/// Same body with one key removed, for schema validation tests
pub fn esp32_payload_without(key: &str) -> Value {
    let mut payload = esp32_payload(25.0, 50.0, 80.0, 10.0);
    if let Value::Object(map) = &mut payload {
        map.remove(key);
    }
    payload
}

/// Base URL of a local port that was just released, so connections are refused
pub async fn unreachable_base_url() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}", addr))
}
