use serde::Serialize;
use serde_json::{json, Map, Value};

use ashfall_core::time::wall_clock_ms;

use crate::envelope::RequestTimestamps;

pub const PROTOCOL_VERSION: &str = "1.0";

/// Builds one outbound line. Every message shares the same header shape:
/// `status`, `timestamp`, `version`, plus the echoed lag-compensation
/// fields when the message answers a specific request. `serverSendMs` is
/// stamped in `build`, i.e. immediately before the write.
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    header: Map<String, Value>,
    body: Map<String, Value>,
    timestamps: Option<RequestTimestamps>,
}

impl ResponseBuilder {
    pub fn new(event_type: &str) -> Self {
        let mut header = Map::new();
        header.insert("eventType".into(), Value::String(event_type.to_owned()));
        Self {
            header,
            body: Map::new(),
            timestamps: None,
        }
    }

    pub fn header(mut self, key: &str, value: impl Serialize) -> Self {
        self.header
            .insert(key.to_owned(), to_json(value));
        self
    }

    pub fn body(mut self, key: &str, value: impl Serialize) -> Self {
        self.body.insert(key.to_owned(), to_json(value));
        self
    }

    pub fn body_object(mut self, value: Value) -> Self {
        if let Value::Object(map) = value {
            self.body.extend(map);
        }
        self
    }

    pub fn timestamps(mut self, timestamps: &RequestTimestamps) -> Self {
        self.timestamps = Some(timestamps.clone());
        self
    }

    pub fn success(self) -> String {
        self.build("success")
    }

    pub fn error(self) -> String {
        self.build("error")
    }

    fn build(mut self, status: &str) -> String {
        let now = wall_clock_ms();
        self.header.insert("status".into(), json!(status));
        self.header.insert("timestamp".into(), json!(now));
        self.header.insert("version".into(), json!(PROTOCOL_VERSION));

        if let Some(ts) = self.timestamps {
            self.header.insert("serverRecvMs".into(), json!(ts.server_recv_ms));
            self.header.insert("serverSendMs".into(), json!(now));
            self.header
                .insert("clientSendMsEcho".into(), json!(ts.client_send_ms_echo));
            if !ts.request_id.is_empty() {
                self.header.insert("requestIdEcho".into(), json!(ts.request_id));
            }
        }

        let message = json!({
            "header": Value::Object(self.header),
            "body": Value::Object(self.body),
        });
        let mut line = message.to_string();
        line.push('\n');
        line
    }
}

fn to_json(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
