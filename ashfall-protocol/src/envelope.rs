use serde_json::Value;
use thiserror::Error;

use ashfall_core::time::wall_clock_ms;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame is not a json object")]
    NotAnObject,
    #[error("missing eventType")]
    MissingEventType,
    #[error("malformed body for {event_type}: {reason}")]
    MalformedBody {
        event_type: String,
        reason: String,
    },
}

/// Parsed request header. Absent fields read as their zero values; the
/// session layer decides which of them are actually required per event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestHeader {
    pub event_type: String,
    pub client_id: i32,
    pub hash: String,
    pub client_send_ms: i64,
    pub request_id: String,
}

/// One framed request: typed header plus the raw body for the per-event
/// parsers in [`crate::client`] and [`crate::upstream`].
#[derive(Debug, Clone, Default)]
pub struct RequestEnvelope {
    pub header: RequestHeader,
    pub body: Value,
}

impl RequestEnvelope {
    /// Full parse of a complete frame. Tolerant of absent header fields but
    /// not of non-object frames or broken JSON.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let json: Value = serde_json::from_str(frame)?;
        if !json.is_object() {
            return Err(ProtocolError::NotAnObject);
        }

        let header_value = &json["header"];
        let event_type = header_value["eventType"]
            .as_str()
            .map(str::to_owned)
            .ok_or(ProtocolError::MissingEventType)?;

        let header = RequestHeader {
            event_type,
            client_id: header_value["clientId"].as_i64().unwrap_or(0) as i32,
            hash: header_value["hash"].as_str().unwrap_or_default().to_owned(),
            client_send_ms: extract_client_send_ms(&json),
            request_id: extract_request_id(&json),
        };

        let body = json.get("body").cloned().unwrap_or(Value::Null);
        Ok(Self { header, body })
    }
}

/// Header-only parse for the ping fast path; skips the body entirely.
pub fn parse_ping_header(frame: &str) -> Option<RequestHeader> {
    let json: Value = serde_json::from_str(frame).ok()?;
    let header = json.get("header")?;
    Some(RequestHeader {
        event_type: header["eventType"].as_str()?.to_owned(),
        client_id: header["clientId"].as_i64().unwrap_or(0) as i32,
        hash: header["hash"].as_str().unwrap_or_default().to_owned(),
        client_send_ms: extract_client_send_ms(&json),
        request_id: extract_request_id(&json),
    })
}

/// Lag-compensation capture for one request/response exchange.
/// `server_recv_ms` is stamped at frame boundary; `serverSendMs` is stamped
/// by the response builder immediately before the write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestTimestamps {
    pub server_recv_ms: i64,
    pub client_send_ms_echo: i64,
    pub request_id: String,
}

impl RequestTimestamps {
    pub fn capture(header: &RequestHeader) -> Self {
        Self {
            server_recv_ms: wall_clock_ms(),
            client_send_ms_echo: header.client_send_ms,
            request_id: header.request_id.clone(),
        }
    }
}

// Clients are inconsistent about where they put these two; accept the
// header first, then body, then root.
fn extract_client_send_ms(json: &Value) -> i64 {
    for scope in [&json["header"], &json["body"], json] {
        if let Some(ms) = scope.get("clientSendMs").and_then(Value::as_i64) {
            return ms;
        }
    }
    0
}

fn extract_request_id(json: &Value) -> String {
    for scope in [&json["header"], &json["body"], json] {
        if let Some(id) = scope.get("requestId").and_then(Value::as_str) {
            return id.to_owned();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_envelope() {
        let frame = r#"{"header":{"eventType":"moveCharacter","clientId":5,"hash":"h","clientSendMs":123,"requestId":"r-1"},"body":{"id":42}}"#;
        let envelope = RequestEnvelope::parse(frame).unwrap();
        assert_eq!(envelope.header.event_type, "moveCharacter");
        assert_eq!(envelope.header.client_id, 5);
        assert_eq!(envelope.header.client_send_ms, 123);
        assert_eq!(envelope.header.request_id, "r-1");
        assert_eq!(envelope.body["id"], 42);
    }

    #[test]
    fn missing_event_type_is_an_error() {
        let frame = r#"{"header":{"clientId":5}}"#;
        assert!(matches!(
            RequestEnvelope::parse(frame),
            Err(ProtocolError::MissingEventType)
        ));
    }

    #[test]
    fn client_send_ms_falls_back_to_body() {
        let frame = r#"{"header":{"eventType":"pingClient"},"body":{"clientSendMs":77}}"#;
        let envelope = RequestEnvelope::parse(frame).unwrap();
        assert_eq!(envelope.header.client_send_ms, 77);
    }

    #[test]
    fn ping_header_parse_is_minimal() {
        let frame = r#"{"header":{"eventType":"pingClient","clientId":7,"hash":"H","clientSendMs":100}}"#;
        let header = parse_ping_header(frame).unwrap();
        assert_eq!(header.event_type, "pingClient");
        assert_eq!(header.client_id, 7);
        assert_eq!(header.client_send_ms, 100);
        assert!(parse_ping_header("not json").is_none());
    }

    #[test]
    fn timestamps_echo_request_fields() {
        let header = RequestHeader {
            event_type: "pingClient".into(),
            client_send_ms: 100,
            request_id: "abc".into(),
            ..Default::default()
        };
        let ts = RequestTimestamps::capture(&header);
        assert_eq!(ts.client_send_ms_echo, 100);
        assert_eq!(ts.request_id, "abc");
        assert!(ts.server_recv_ms >= 100);
    }
}
