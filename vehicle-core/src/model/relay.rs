// Wire messages exchanged with the trigger relay service.

use serde::{Deserialize, Serialize};

/// Envelope pushed by the relay service. Every field is optional on the wire.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RelayMessage {
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Usually a JSON document encoded as a string; see [`crate::parser::decode_action`].
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl RelayMessage {
    pub fn is_authenticated(&self) -> bool {
        self.message_type.as_deref() == Some("status")
            && self.status.as_deref() == Some("authenticated")
    }
}

/// Requests sent from this client to the relay service.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RelayRequest {
    Auth { key: String, secret: String },
    Subscribe { buckets: Vec<String> },
}

/// Trigger payload carried inside a relay message body.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ActionPayload {
    #[serde(default)]
    pub action: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_request_wire_format() {
        let request = RelayRequest::Auth {
            key: "k".to_string(),
            secret: "s".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"action":"auth","key":"k","secret":"s"}"#);
    }

    #[test]
    fn subscribe_request_wire_format() {
        let request = RelayRequest::Subscribe {
            buckets: vec!["gactions".to_string()],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"action":"subscribe","buckets":["gactions"]}"#);
    }

    #[test]
    fn authenticated_requires_both_fields() {
        let status_only = RelayMessage {
            message_type: Some("status".to_string()),
            ..Default::default()
        };
        assert!(!status_only.is_authenticated());

        let unauthorized = RelayMessage {
            message_type: Some("status".to_string()),
            status: Some("unauthorized".to_string()),
            body: None,
        };
        assert!(!unauthorized.is_authenticated());
    }
}
