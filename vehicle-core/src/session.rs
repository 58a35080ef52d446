// Relay session state tracking.
// Invariants: subscribe is only produced after an authenticated status on the current
// connection; at most one reconnect is pending at any time.

use std::time::Duration;

use serde::Serialize;

use crate::model::{RelayMessage, RelayRequest};
use crate::parser::{self, ParseError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticated,
    Subscribed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTransition {
    pub from: SessionState,
    pub to: SessionState,
}

#[derive(Clone, Debug, Default)]
pub struct SessionEvents {
    pub transition: Option<SessionTransition>,
    /// Request the caller must send on the socket before calling
    /// [`RelaySession::mark_subscribed`].
    pub reply: Option<RelayRequest>,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct RelaySession {
    state: SessionState,
    buckets: Vec<String>,
    reconnect_delay: Duration,
    reconnect_pending: bool,
}

impl RelaySession {
    pub fn new(buckets: Vec<String>, reconnect_delay: Duration) -> Self {
        Self {
            state: SessionState::Disconnected,
            buckets,
            reconnect_delay,
            reconnect_pending: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Starts a fresh connection attempt. Nothing from a previous connection survives.
    pub fn begin_connect(&mut self) -> SessionTransition {
        self.reconnect_pending = false;
        self.transition_to(SessionState::Connecting)
    }

    /// Socket is open; the credentials go out first.
    pub fn on_open(&self, key: &str, secret: &str) -> RelayRequest {
        RelayRequest::Auth {
            key: key.to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn on_text(&mut self, text: &str) -> Result<SessionEvents, ParseError> {
        let message = parser::decode_relay_message(text)?;
        Ok(self.on_message(message))
    }

    pub fn on_message(&mut self, message: RelayMessage) -> SessionEvents {
        let mut events = SessionEvents::default();
        if message.is_authenticated() && self.state == SessionState::Connecting {
            events.transition = Some(self.transition_to(SessionState::Authenticated));
            events.reply = Some(RelayRequest::Subscribe {
                buckets: self.buckets.clone(),
            });
        }
        events.body = message.body;
        events
    }

    /// Called once the subscribe request produced by [`Self::on_message`] was written.
    pub fn mark_subscribed(&mut self) -> Option<SessionTransition> {
        if self.state != SessionState::Authenticated {
            return None;
        }
        Some(self.transition_to(SessionState::Subscribed))
    }

    /// Error or close on the socket. Returns the delay before the next attempt,
    /// or `None` when a reconnect is already pending.
    pub fn on_disconnect(&mut self) -> Option<Duration> {
        self.state = SessionState::Disconnected;
        if self.reconnect_pending {
            return None;
        }
        self.reconnect_pending = true;
        Some(self.reconnect_delay)
    }

    fn transition_to(&mut self, to: SessionState) -> SessionTransition {
        let from = self.state;
        self.state = to;
        SessionTransition { from, to }
    }
}
