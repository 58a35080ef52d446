// Outbound connection to the trigger relay service.
// Invariants: a fresh socket and session per attempt; exactly one reconnect delay per disconnect.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use vehicle_core::model::RelayRequest;
use vehicle_core::parser;
use vehicle_core::session::{RelaySession, SessionState};

use crate::error::Result;

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub url: String,
    pub key: String,
    pub secret: String,
    pub buckets: Vec<String>,
    pub reconnect_delay: Duration,
}

#[derive(Debug)]
pub struct RelayClient {
    config: RelayConfig,
    actions: mpsc::Sender<String>,
    state_tx: watch::Sender<SessionState>,
}

impl RelayClient {
    /// Decoded actions are pushed into `actions` in arrival order.
    pub fn new(config: RelayConfig, actions: mpsc::Sender<String>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            actions,
            state_tx,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Connects, serves and reconnects until the action receiver is dropped.
    pub async fn run(self) -> Result<()> {
        let mut session = RelaySession::new(self.config.buckets.clone(), self.config.reconnect_delay);
        loop {
            let transition = session.begin_connect();
            self.state_tx.send_replace(transition.to);
            info!(url = %self.config.url, "connecting to relay");

            match self.serve_connection(&mut session).await {
                Ok(true) => info!("relay socket closed, reconnecting"),
                Ok(false) => {
                    info!("action consumer gone, relay client stopping");
                    self.state_tx.send_replace(SessionState::Disconnected);
                    return Ok(());
                }
                Err(err) => warn!(%err, "relay socket error"),
            }

            if let Some(delay) = session.on_disconnect() {
                self.state_tx.send_replace(session.state());
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Returns `Ok(false)` only when actions can no longer be delivered.
    async fn serve_connection(&self, session: &mut RelaySession) -> Result<bool> {
        let (stream, _) = tokio_tungstenite::connect_async(self.config.url.as_str()).await?;
        let (mut sink, mut stream) = stream.split();

        info!("connected to relay, sending authentication request");
        let auth = session.on_open(&self.config.key, &self.config.secret);
        sink.send(Message::Text(serde_json::to_string(&auth)?)).await?;

        while let Some(message) = stream.next().await {
            let text = match message? {
                Message::Text(text) => text,
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("relay sent non-utf8 binary frame");
                        continue;
                    }
                },
                Message::Ping(payload) => {
                    sink.send(Message::Pong(payload)).await?;
                    continue;
                }
                Message::Close(frame) => {
                    info!(?frame, "relay sent close");
                    break;
                }
                Message::Pong(_) | Message::Frame(_) => continue,
            };

            let events = match session.on_text(&text) {
                Ok(events) => events,
                Err(err) => {
                    warn!(%err, "relay message dropped");
                    continue;
                }
            };

            if let Some(reply) = events.reply {
                if let RelayRequest::Subscribe { buckets } = &reply {
                    info!(?buckets, "relay authenticated, subscribing");
                }
                sink.send(Message::Text(serde_json::to_string(&reply)?)).await?;
                if let Some(transition) = session.mark_subscribed() {
                    self.state_tx.send_replace(transition.to);
                }
            } else if let Some(transition) = events.transition {
                self.state_tx.send_replace(transition.to);
            }

            match parser::decode_action(events.body.as_ref()) {
                Ok(Some(action)) => {
                    info!(%action, "relay action received");
                    if self.actions.send(action).await.is_err() {
                        return Ok(false);
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(%err, "relay action payload dropped"),
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::WebSocketStream;

    use super::*;

    const RECONNECT: Duration = Duration::from_millis(300);

    async fn relay_stub() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (tcp, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("client never connected")
            .unwrap();
        tokio_tungstenite::accept_async(tcp).await.unwrap()
    }

    async fn next_json(socket: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("no message from client")
            .unwrap()
            .unwrap();
        serde_json::from_str(message.to_text().unwrap()).unwrap()
    }

    fn client(url: String) -> (RelayClient, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let config = RelayConfig {
            url,
            key: "key-1".to_string(),
            secret: "secret-1".to_string(),
            buckets: vec!["gactions".to_string()],
            reconnect_delay: RECONNECT,
        };
        (RelayClient::new(config, tx), rx)
    }

    #[tokio::test]
    async fn authenticates_then_subscribes_then_forwards_actions() {
        let (listener, url) = relay_stub().await;
        let (client, mut actions) = client(url);
        let mut state = client.subscribe_state();
        let task = tokio::spawn(client.run());

        let mut socket = accept(&listener).await;
        let auth = next_json(&mut socket).await;
        assert_eq!(
            auth,
            serde_json::json!({"action": "auth", "key": "key-1", "secret": "secret-1"})
        );

        socket
            .send(Message::Text(r#"{"type":"status","status":"authenticated"}"#.to_string()))
            .await
            .unwrap();
        let subscribe = next_json(&mut socket).await;
        assert_eq!(
            subscribe,
            serde_json::json!({"action": "subscribe", "buckets": ["gactions"]})
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while *state.borrow_and_update() != SessionState::Subscribed {
                state.changed().await.unwrap();
            }
        })
        .await
        .expect("never subscribed");

        socket
            .send(Message::Text(
                r#"{"type":"webhook","body":"{\"action\":\"flip f\"}"}"#.to_string(),
            ))
            .await
            .unwrap();
        let action = tokio::time::timeout(Duration::from_secs(2), actions.recv())
            .await
            .unwrap();
        assert_eq!(action.as_deref(), Some("flip f"));

        task.abort();
    }

    #[tokio::test]
    async fn malformed_messages_do_not_drop_the_connection() {
        let (listener, url) = relay_stub().await;
        let (client, mut actions) = client(url);
        let task = tokio::spawn(client.run());

        let mut socket = accept(&listener).await;
        next_json(&mut socket).await;

        socket.send(Message::Text("not json".to_string())).await.unwrap();
        socket
            .send(Message::Text(r#"{"body":"{broken"}"#.to_string()))
            .await
            .unwrap();
        socket
            .send(Message::Text(r#"{"body":"{\"action\":\"land\"}"}"#.to_string()))
            .await
            .unwrap();

        let action = tokio::time::timeout(Duration::from_secs(2), actions.recv())
            .await
            .unwrap();
        assert_eq!(action.as_deref(), Some("land"));

        task.abort();
    }

    #[tokio::test]
    async fn no_subscribe_before_authentication() {
        let (listener, url) = relay_stub().await;
        let (client, _actions) = client(url);
        let task = tokio::spawn(client.run());

        let mut socket = accept(&listener).await;
        next_json(&mut socket).await;
        socket
            .send(Message::Text(r#"{"type":"status","status":"pending"}"#.to_string()))
            .await
            .unwrap();

        let silent = tokio::time::timeout(Duration::from_millis(300), socket.next()).await;
        assert!(silent.is_err(), "client sent {:?}", silent);

        task.abort();
    }

    #[tokio::test]
    async fn reconnects_once_after_close() {
        let (listener, url) = relay_stub().await;
        let (client, _actions) = client(url);
        let task = tokio::spawn(client.run());

        let mut socket = accept(&listener).await;
        next_json(&mut socket).await;
        socket.close(None).await.unwrap();
        drop(socket);
        let closed_at = Instant::now();

        let mut second = accept(&listener).await;
        assert!(closed_at.elapsed() >= RECONNECT - Duration::from_millis(20));
        let auth = next_json(&mut second).await;
        assert_eq!(auth["action"], "auth");

        let extra = tokio::time::timeout(RECONNECT * 2, listener.accept()).await;
        assert!(extra.is_err(), "unexpected second reconnect");

        task.abort();
    }

    #[tokio::test]
    async fn retries_when_relay_is_unreachable() {
        let (listener, url) = relay_stub().await;
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (client, _actions) = client(url);
        let task = tokio::spawn(client.run());

        // First attempt is refused; the retry lands on the listener bound afterwards.
        tokio::time::sleep(RECONNECT / 3).await;
        let listener = TcpListener::bind(addr).await.unwrap();
        let mut socket = accept(&listener).await;
        assert_eq!(next_json(&mut socket).await["action"], "auth");

        task.abort();
    }
}
