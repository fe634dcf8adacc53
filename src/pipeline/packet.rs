//! Packets: the unit of data flowing between agents.
//!
//! A packet is an ordered field store addressed by paths plus an identity.
//! Paths use either dotted notation (`a.b.c`) or bracket notation
//! (`[a][b][c]`); numeric segments index into arrays.
//!
//! `Clone` is a deep copy, so the duplicates produced for fan-out never share
//! mutable state. [`Packet::derive`] starts a fresh event that carries the
//! timestamp of its parent.

use crate::pipeline::error::ProcessorError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Field holding the event time, RFC 3339 formatted.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Field holding the raw payload of packets built from raw data.
pub const MESSAGE_FIELD: &str = "message";

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    id: Uuid,
    fields: Fields,
}

fn now_rfc3339() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn split_path(path: &str) -> Vec<&str> {
    if path.starts_with('[') {
        path.trim_start_matches('[')
            .trim_end_matches(']')
            .split("][")
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        path.split('.').filter(|s| !s.is_empty()).collect()
    }
}

impl Packet {
    /// Build a packet from existing fields, stamping `@timestamp` if absent.
    pub fn new(mut fields: Fields) -> Self {
        if !fields.contains_key(TIMESTAMP_FIELD) {
            fields.insert(TIMESTAMP_FIELD.to_string(), now_rfc3339());
        }
        Self {
            id: Uuid::new_v4(),
            fields,
        }
    }

    /// An event carrying only a timestamp; used for lifecycle and timer triggers.
    pub fn empty() -> Self {
        Self::new(Fields::new())
    }

    /// Build a packet from raw data plus metadata fields.
    pub fn from_raw(message: impl Into<String>, metadata: Fields) -> Self {
        let mut fields = Fields::new();
        fields.insert(MESSAGE_FIELD.to_string(), Value::String(message.into()));
        for (k, v) in metadata {
            fields.insert(k, v);
        }
        Self::new(fields)
    }

    /// Parse a JSON object into a packet.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProcessorError> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(fields)) => Ok(Self::new(fields)),
            Ok(other) => Err(ProcessorError::Field {
                path: String::new(),
                message: format!("expected a JSON object, got {other}"),
            }),
            Err(e) => Err(ProcessorError::Message(format!("invalid JSON packet: {e}"))),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    pub fn message(&self) -> Option<&str> {
        self.fields.get(MESSAGE_FIELD).and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.fields.get(TIMESTAMP_FIELD)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Start a new packet that keeps this packet's timestamp.
    pub fn derive(&self, mut fields: Fields) -> Self {
        if let Some(ts) = self.fields.get(TIMESTAMP_FIELD) {
            fields.insert(TIMESTAMP_FIELD.to_string(), ts.clone());
        }
        Self::new(fields)
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = split_path(path).into_iter();
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set a field, creating intermediate objects as needed.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), ProcessorError> {
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return Err(ProcessorError::Field {
                path: path.to_string(),
                message: "empty path".into(),
            });
        };

        let mut map = &mut self.fields;
        for segment in parents {
            let entry = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            map = match entry {
                Value::Object(inner) => inner,
                _ => {
                    return Err(ProcessorError::Field {
                        path: path.to_string(),
                        message: format!("'{segment}' is not an object"),
                    })
                }
            };
        }
        map.insert(last.to_string(), value.into());
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments = split_path(path);
        let (last, parents) = segments.split_last()?;
        let mut map = &mut self.fields;
        for segment in parents {
            map = map.get_mut(*segment)?.as_object_mut()?;
        }
        map.shift_remove(*last)
    }

    pub fn to_json(&self) -> Result<String, ProcessorError> {
        serde_json::to_string(&self.fields).map_err(|e| ProcessorError::Message(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, ProcessorError> {
        serde_json::to_string_pretty(&self.fields)
            .map_err(|e| ProcessorError::Message(e.to_string()))
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_stamps_timestamp() {
        let packet = Packet::empty();
        assert!(packet.contains(TIMESTAMP_FIELD));
        assert!(packet.timestamp().is_some());
    }

    #[test]
    fn test_from_raw_sets_message_and_metadata() {
        let mut meta = Fields::new();
        meta.insert("host".into(), json!("edge-1"));
        let packet = Packet::from_raw("hello", meta);
        assert_eq!(packet.message(), Some("hello"));
        assert_eq!(packet.get("host"), Some(&json!("edge-1")));
    }

    #[test]
    fn test_dotted_and_bracket_paths() {
        let mut packet = Packet::empty();
        packet.set("a.b.c", 1).unwrap();
        packet.set("[a][b][d]", "x").unwrap();

        assert_eq!(packet.get("a.b.c"), Some(&json!(1)));
        assert_eq!(packet.get("[a][b][c]"), Some(&json!(1)));
        assert_eq!(packet.get("a.b.d"), Some(&json!("x")));
        assert_eq!(packet.get("a.missing"), None);
    }

    #[test]
    fn test_array_index_segments() {
        let packet = Packet::from_json(br#"{"tags": ["a", "b"], "list": [{"x": 5}]}"#).unwrap();
        assert_eq!(packet.get("tags.1"), Some(&json!("b")));
        assert_eq!(packet.get("list.0.x"), Some(&json!(5)));
        assert_eq!(packet.get("tags.9"), None);
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut packet = Packet::empty();
        packet.set("a", 1).unwrap();
        let err = packet.set("a.b", 2).unwrap_err();
        assert!(matches!(err, ProcessorError::Field { .. }));
    }

    #[test]
    fn test_remove_nested() {
        let mut packet = Packet::empty();
        packet.set("a.b", 1).unwrap();
        packet.set("a.c", 2).unwrap();
        assert_eq!(packet.remove("a.b"), Some(json!(1)));
        assert!(!packet.contains("a.b"));
        assert!(packet.contains("a.c"));
        assert_eq!(packet.remove("nope.b"), None);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = Packet::empty();
        original.set("nested.value", 1).unwrap();

        let mut copy = original.clone();
        copy.set("nested.value", 2).unwrap();
        copy.set("only_copy", true).unwrap();

        assert_eq!(original.get("nested.value"), Some(&json!(1)));
        assert!(!original.contains("only_copy"));
        assert_eq!(copy.id(), original.id());
    }

    #[test]
    fn test_derive_carries_timestamp() {
        let mut parent = Packet::empty();
        parent.set(TIMESTAMP_FIELD, "2024-01-02T03:04:05.000Z").unwrap();
        parent.set("parent_only", 1).unwrap();

        let child = parent.derive(Fields::new());
        assert_ne!(child.id(), parent.id());
        assert_eq!(child.get(TIMESTAMP_FIELD), parent.get(TIMESTAMP_FIELD));
        assert!(!child.contains("parent_only"));
    }

    #[test]
    fn test_json_preserves_field_order() {
        let packet = Packet::from_json(br#"{"z": 1, "a": 2, "@timestamp": "t"}"#).unwrap();
        assert_eq!(packet.to_json().unwrap(), r#"{"z":1,"a":2,"@timestamp":"t"}"#);
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(Packet::from_json(b"[1, 2]").is_err());
        assert!(Packet::from_json(b"not json").is_err());
    }
}
