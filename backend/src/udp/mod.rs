// Vehicle UDP channels: command/reply and throttled state telemetry.
// Invariants: each channel owns exactly one socket for the process lifetime.

mod command;
mod telemetry;

pub use command::CommandChannel;
pub use telemetry::TelemetryChannel;

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::info;

use crate::error::{Error, Result};

async fn bind_udp_socket(what: &'static str, addr: SocketAddr) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| Error::Bind { what, addr, source })?;
    let local = socket.local_addr().unwrap_or(addr);
    info!(%local, what, "udp socket bound");
    Ok(socket)
}
