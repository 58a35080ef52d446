// WebSocket transport layer for video viewers.

mod hub;

pub use hub::{BroadcastHub, Viewer};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use tracing::{info, warn};

/// Pumps hub chunks to one viewer socket until either side goes away.
pub async fn viewer_socket(mut socket: WebSocket, hub: Arc<BroadcastHub>, remote: Option<SocketAddr>) {
    let mut viewer = hub.register().await;
    let id = viewer.id();
    let total = hub.viewer_count().await;
    info!(id, ?remote, total, "websocket connected");

    loop {
        tokio::select! {
            chunk = viewer.recv() => {
                match chunk {
                    Some(chunk) => {
                        if socket.send(Message::Binary(chunk.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.next() => {
                match inbound {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(?err, id, "ws error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    viewer.close();
    hub.deregister(id).await;
    let total = hub.viewer_count().await;
    info!(id, ?remote, total, "websocket disconnected");
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use super::*;

    fn require_send<F>(_handler: fn(WebSocket, Arc<BroadcastHub>, Option<SocketAddr>) -> F)
    where
        F: Future<Output = ()> + Send,
    {
    }

    // `WebSocketUpgrade::on_upgrade` only accepts `Send` futures.
    #[test]
    fn viewer_socket_future_is_send() {
        require_send(viewer_socket);
    }
}
