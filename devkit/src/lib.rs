/*!
# Synergy DevKit - test doubles for the relay

- `MockBackend`: in-memory `ClientBackend` with scripted connect/publish outcomes
- `PayloadBuilder`: switch payloads in the wire format
- `TestHarness`: publishers/subscribers wired to the mock, alert counting
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{ConnectScript, MockBackend, MockMessage, PayloadBuilder};
pub use test_utils::{TestHarness, TEST_TOPIC};
