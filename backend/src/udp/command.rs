// Fire-and-forget command channel to the vehicle.
// Invariants: replies are logged verbatim and never matched to a sent command.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::constants::{SDK_ENABLE_COMMAND, UDP_RECV_BUF};
use crate::error::{Error, Result};

use super::bind_udp_socket;

#[derive(Debug)]
pub struct CommandChannel {
    socket: UdpSocket,
    vehicle: SocketAddr,
}

impl CommandChannel {
    pub async fn bind(local: SocketAddr, vehicle: SocketAddr) -> Result<Self> {
        let socket = bind_udp_socket("command", local).await?;
        Ok(Self { socket, vehicle })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Transmits `command` as a single datagram. Send failures are logged and dropped.
    pub async fn send(&self, command: &str) {
        match self.socket.send_to(command.as_bytes(), self.vehicle).await {
            Ok(_) => info!(command, vehicle = %self.vehicle, "command sent"),
            Err(err) => warn!(?err, command, vehicle = %self.vehicle, "command send failed"),
        }
    }

    /// Puts the vehicle into SDK mode; must precede any other command.
    pub async fn enter_sdk_mode(&self) {
        self.send(SDK_ENABLE_COMMAND).await;
    }

    /// Logs every reply datagram until the socket fails.
    pub async fn listen_replies(&self) -> Result<()> {
        let mut buf = [0u8; UDP_RECV_BUF];
        loop {
            let (len, source) = self.socket.recv_from(&mut buf).await.map_err(Error::Transport)?;
            let reply = String::from_utf8_lossy(&buf[..len]);
            info!(%source, reply = %reply.trim_end(), "vehicle reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    async fn vehicle_stub() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn recv_text(socket: &UdpSocket) -> String {
        let mut buf = [0u8; 256];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("datagram timed out")
            .unwrap();
        String::from_utf8_lossy(&buf[..len]).to_string()
    }

    #[tokio::test]
    async fn sends_tokens_in_call_order() {
        let (vehicle, vehicle_addr) = vehicle_stub().await;
        let channel = CommandChannel::bind("127.0.0.1:0".parse().unwrap(), vehicle_addr)
            .await
            .unwrap();

        channel.enter_sdk_mode().await;
        channel.send("takeoff").await;
        channel.send("flip f").await;

        assert_eq!(recv_text(&vehicle).await, "command");
        assert_eq!(recv_text(&vehicle).await, "takeoff");
        assert_eq!(recv_text(&vehicle).await, "flip f");
    }

    #[tokio::test]
    async fn replies_arrive_on_the_command_socket() {
        let (vehicle, vehicle_addr) = vehicle_stub().await;
        let channel = Arc::new(
            CommandChannel::bind("127.0.0.1:0".parse().unwrap(), vehicle_addr)
                .await
                .unwrap(),
        );
        let listener = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.listen_replies().await })
        };

        channel.send("battery?").await;
        let mut buf = [0u8; 64];
        let (_, source) = vehicle.recv_from(&mut buf).await.unwrap();
        assert_eq!(source, channel.local_addr().unwrap());
        vehicle.send_to(b"ok", source).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!listener.is_finished());
        listener.abort();
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let (held, addr) = vehicle_stub().await;
        let err = CommandChannel::bind(addr, addr).await.unwrap_err();
        assert!(matches!(err, Error::Bind { what: "command", .. }));
        drop(held);
    }
}
