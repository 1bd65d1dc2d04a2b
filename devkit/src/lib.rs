/*!
# SensorHub DevKit - Stubs and helpers for development

Library that makes it easy to develop and test the SensorHub kernel without
an ESP32 board on the bench:
- In-process stub of the board's HTTP endpoints (`/data`, `/buzzer`)
- Payload fixtures matching the firmware's JSON
- Test harness with request expectations
*/

pub mod gateway_stub;
pub mod fixtures;
pub mod test_utils;

pub use gateway_stub::{GatewayStub, RecordedRequest, StubBehavior};
pub use fixtures::{esp32_payload, unreachable_base_url};
pub use test_utils::TestHarness;
