// Core data models for telemetry frames and relay wire messages.

mod frame;
mod relay;

pub use frame::TelemetryFrame;
pub use relay::{ActionPayload, RelayMessage, RelayRequest};
