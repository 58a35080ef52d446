// Vehicle state telemetry ingest.
// Invariants: at most one parse per throttle window; only the latest datagram is parsed.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, warn};
use vehicle_core::model::TelemetryFrame;
use vehicle_core::parser;
use vehicle_core::throttle::TrailingThrottle;

use crate::constants::UDP_RECV_BUF;
use crate::error::{Error, Result};

use super::bind_udp_socket;

pub type FrameReceiver = watch::Receiver<Option<TelemetryFrame>>;

#[derive(Debug)]
pub struct TelemetryChannel {
    socket: UdpSocket,
    window: Duration,
    frames: watch::Sender<Option<TelemetryFrame>>,
}

impl TelemetryChannel {
    pub async fn bind(local: SocketAddr, window: Duration) -> Result<Self> {
        let socket = bind_udp_socket("telemetry", local).await?;
        let (frames, _) = watch::channel(None);
        Ok(Self {
            socket,
            window,
            frames,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Latest parsed frame; each update replaces the previous one.
    pub fn subscribe(&self) -> FrameReceiver {
        self.frames.subscribe()
    }

    pub async fn run(self) -> Result<()> {
        let mut throttle: TrailingThrottle<Vec<u8>> = TrailingThrottle::new(self.window);
        let mut buf = [0u8; UDP_RECV_BUF];

        loop {
            let deadline = throttle.deadline();
            let wake = deadline.map(Instant::from_std).unwrap_or_else(Instant::now);

            tokio::select! {
                recv = self.socket.recv_from(&mut buf) => {
                    let (len, _) = recv.map_err(Error::Transport)?;
                    throttle.offer(buf[..len].to_vec(), Instant::now().into_std());
                }
                _ = time::sleep_until(wake), if deadline.is_some() => {
                    if let Some(payload) = throttle.poll(Instant::now().into_std()) {
                        self.publish(&payload);
                    }
                }
            }
        }
    }

    fn publish(&self, payload: &[u8]) {
        match parser::parse_state_bytes(payload) {
            Ok(frame) => {
                debug!(fields = frame.len(), ?frame, "telemetry frame");
                self.frames.send_replace(Some(frame));
            }
            Err(err) => warn!(%err, "telemetry datagram dropped"),
        }
    }
}
