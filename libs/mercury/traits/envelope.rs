use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One inbound wire unit from the event channel
///
/// `data` carries the typed payload including its dot-delimited
/// `eventType` (e.g. `"conversation.activity"`). `headers` maps dotted
/// paths into `data` onto replacement values; overrides are applied in
/// header order before dispatch, so a later duplicate wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Monotonic per-connection sequence number; gaps are diagnostic only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,

    /// Dotted-path field overrides applied onto `data` before dispatch
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,

    pub data: Value,
}

impl Envelope {
    /// Full dot-delimited event name, if present
    pub fn event_type(&self) -> Option<&str> {
        self.data.get("eventType").and_then(Value::as_str)
    }

    /// First segment of the event name
    pub fn namespace(&self) -> Option<&str> {
        self.event_type().map(|t| t.split('.').next().unwrap_or(t))
    }

    /// Last segment of the event name; the handler-table key
    pub fn event_leaf(&self) -> Option<&str> {
        self.event_type().map(|t| t.rsplit('.').next().unwrap_or(t))
    }

    /// Apply header overrides onto the payload
    ///
    /// Header keys are dotted paths into `data` (a leading `data.` segment
    /// is accepted and stripped). Missing intermediate objects are created;
    /// intermediate non-objects are replaced. Headers apply in map order,
    /// so a later duplicate path wins.
    pub fn apply_header_overrides(&mut self) {
        let headers = std::mem::take(&mut self.headers);
        for (path, value) in &headers {
            let path = path.strip_prefix("data.").unwrap_or(path);
            set_dotted(&mut self.data, path, value.clone());
        }
        self.headers = headers;
    }
}

/// Set `value` at the dotted `path` inside `target`, creating objects as
/// needed along the way.
fn set_dotted(target: &mut Value, path: &str, value: Value) {
    let mut current = target;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            match current {
                Value::Object(map) => {
                    map.insert(segment.to_string(), value);
                }
                other => {
                    let mut map = Map::new();
                    map.insert(segment.to_string(), value);
                    *other = Value::Object(map);
                }
            }
            return;
        }

        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().unwrap();
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
