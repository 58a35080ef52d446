// HTTP request and response payload types.

use serde::{Deserialize, Serialize};
use vehicle_core::model::TelemetryFrame;
use vehicle_core::session::SessionState;

use crate::video::TranscoderStatus;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub relay: SessionState,
    pub transcoder: TranscoderStatus,
    pub viewers: usize,
}

#[derive(Serialize)]
pub struct TelemetryResponse {
    pub frame: Option<TelemetryFrame>,
}
