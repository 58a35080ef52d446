// Vehicle state datagram and relay payload parsers.
// Invariants: a parse failure rejects the whole datagram or message; no partial frames.

use thiserror::Error;

use crate::model::{ActionPayload, RelayMessage, TelemetryFrame};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("telemetry payload is not valid utf-8")]
    NotUtf8,
    #[error("telemetry segment {segment:?} has no key/value delimiter")]
    MissingDelimiter { segment: String },
    #[error("malformed relay json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses a raw state datagram such as `pitch:0;roll:0;yaw:0;`.
pub fn parse_state_bytes(payload: &[u8]) -> Result<TelemetryFrame, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::NotUtf8)?;
    parse_state(text)
}

/// Splits `k1:v1;k2:v2;...` into a frame. The trailing separator is optional,
/// empty segments are skipped and values may themselves contain `:`.
pub fn parse_state(text: &str) -> Result<TelemetryFrame, ParseError> {
    let mut frame = TelemetryFrame::new();
    for segment in text.trim().split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (key, value) = segment
            .split_once(':')
            .ok_or_else(|| ParseError::MissingDelimiter {
                segment: segment.to_string(),
            })?;
        frame.insert(key, value);
    }
    Ok(frame)
}

pub fn decode_relay_message(text: &str) -> Result<RelayMessage, ParseError> {
    Ok(serde_json::from_str(text)?)
}

/// Extracts the trigger action from a relay message body.
///
/// The relay delivers the body as a JSON document encoded in a string; an
/// already-decoded object is accepted as well. Anything else carries no action.
pub fn decode_action(body: Option<&serde_json::Value>) -> Result<Option<String>, ParseError> {
    let payload: ActionPayload = match body {
        Some(serde_json::Value::String(raw)) if raw.trim().is_empty() => return Ok(None),
        Some(serde_json::Value::String(raw)) => serde_json::from_str(raw)?,
        Some(value @ serde_json::Value::Object(_)) => serde_json::from_value(value.clone())?,
        _ => return Ok(None),
    };
    Ok(payload.action.filter(|action| !action.is_empty()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_attitude_datagram() {
        let frame = parse_state("pitch:5;roll:-3;yaw:0;").unwrap();
        let fields: Vec<_> = frame.iter().collect();
        assert_eq!(fields, vec![("pitch", "5"), ("roll", "-3"), ("yaw", "0")]);
    }

    #[test]
    fn trailing_separator_is_optional() {
        let with = parse_state("k1:v1;k2:v2;").unwrap();
        let without = parse_state("k1:v1;k2:v2").unwrap();
        assert_eq!(with, without);
        assert_eq!(with.len(), 2);
    }

    #[test]
    fn tolerates_line_ending_and_float_values() {
        let frame = parse_state_bytes(b"agx:-2.00;agy:1.00;\r\n").unwrap();
        assert_eq!(frame.get("agx"), Some("-2.00"));
        assert_eq!(frame.get("agy"), Some("1.00"));
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn segment_without_delimiter_is_rejected() {
        let err = parse_state("pitch:5;garbage;yaw:0;").unwrap_err();
        match err {
            ParseError::MissingDelimiter { segment } => assert_eq!(segment, "garbage"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_utf8_payload_is_rejected() {
        assert!(matches!(
            parse_state_bytes(&[0xff, 0xfe, b':', b'1']),
            Err(ParseError::NotUtf8)
        ));
    }

    #[test]
    fn empty_datagram_yields_empty_frame() {
        assert!(parse_state(";").unwrap().is_empty());
    }

    #[test]
    fn decodes_string_encoded_action() {
        let body = json!("{\"action\":\"streamon\"}");
        assert_eq!(decode_action(Some(&body)).unwrap().as_deref(), Some("streamon"));
    }

    #[test]
    fn decodes_object_action() {
        let body = json!({ "action": "land" });
        assert_eq!(decode_action(Some(&body)).unwrap().as_deref(), Some("land"));
    }

    #[test]
    fn absent_or_empty_body_has_no_action() {
        assert_eq!(decode_action(None).unwrap(), None);
        assert_eq!(decode_action(Some(&json!(""))).unwrap(), None);
        assert_eq!(decode_action(Some(&json!("{}"))).unwrap(), None);
        assert_eq!(decode_action(Some(&json!("{\"action\":\"\"}"))).unwrap(), None);
        assert_eq!(decode_action(Some(&serde_json::Value::Null)).unwrap(), None);
    }

    #[test]
    fn malformed_body_is_parse_error() {
        let body = json!("{not json");
        assert!(matches!(decode_action(Some(&body)), Err(ParseError::Json(_))));
    }

    #[test]
    fn relay_envelope_fields_are_optional() {
        let message = decode_relay_message(r#"{"type":"webhook"}"#).unwrap();
        assert_eq!(message.message_type.as_deref(), Some("webhook"));
        assert!(message.status.is_none());
        assert!(message.body.is_none());
    }
}
