// Application state shared by HTTP handlers.

use std::sync::Arc;

use tokio::sync::watch;
use vehicle_core::model::TelemetryFrame;
use vehicle_core::session::SessionState;

use crate::dispatch::Dispatcher;
use crate::udp::CommandChannel;
use crate::video::TranscoderStatus;
use crate::ws::BroadcastHub;

#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<CommandChannel>,
    pub dispatcher: Dispatcher,
    pub hub: Arc<BroadcastHub>,
    pub telemetry: watch::Receiver<Option<TelemetryFrame>>,
    pub relay_state: watch::Receiver<SessionState>,
    pub transcoder: watch::Receiver<TranscoderStatus>,
}
