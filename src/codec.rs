//! Wire codec: the one mapping between an [`Event`] and a flat record of
//! string fields, as stored in a stream entry.
//!
//! | field            | encoding                                   |
//! |------------------|--------------------------------------------|
//! | `id`             | ULID, Crockford base32                     |
//! | `stream`         | stream name                                |
//! | `type`           | type tag                                   |
//! | `version`        | decimal string                             |
//! | `timestamp`      | RFC 3339, millisecond precision, `Z`       |
//! | `correlation_id` | string, `""` when absent                   |
//! | `user_id`        | string, `""` when absent                   |
//! | `data`           | JSON                                       |
//! | `metadata`       | JSON object, `"{}"` when empty             |

use std::collections::{btree_map, BTreeMap, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use ulid::Ulid;

use crate::error::EventError;
use crate::event::{Event, Metadata};
use crate::schema::{EventPayload, EventType, Stream};

/// Field names of a wire record, in write order.
pub const FIELDS: [&str; 9] = [
    "id",
    "stream",
    "type",
    "version",
    "timestamp",
    "correlation_id",
    "user_id",
    "data",
    "metadata",
];

/// A stream entry's field/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireRecord(BTreeMap<String, String>);

impl WireRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    /// Value of `field`, if present.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fields in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for WireRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<HashMap<String, String>> for WireRecord {
    fn from(fields: HashMap<String, String>) -> Self {
        fields.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a WireRecord {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Flatten an event into its wire record.
pub fn encode(event: &Event) -> Result<WireRecord, EventError> {
    let data = event
        .payload()
        .to_data()
        .and_then(|value| serde_json::to_string(&value))
        .map_err(|e| EventError::Encode {
            field: "data",
            cause: e.to_string(),
        })?;
    let metadata = serde_json::to_string(event.metadata()).map_err(|e| EventError::Encode {
        field: "metadata",
        cause: e.to_string(),
    })?;

    let mut record = WireRecord::new();
    record.insert("id", event.id().to_string());
    record.insert("stream", event.stream().as_str());
    record.insert("type", event.event_type().as_str());
    record.insert("version", event.version().to_string());
    record.insert(
        "timestamp",
        event.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    record.insert("correlation_id", event.correlation_id().unwrap_or_default());
    record.insert("user_id", event.user_id().unwrap_or_default());
    record.insert("data", data);
    record.insert("metadata", metadata);
    Ok(record)
}

/// Rebuild an event from its wire record.
pub fn decode(record: &WireRecord) -> Result<Event, EventError> {
    let id = required(record, "id")?;
    let id = Ulid::from_string(id).map_err(|e| malformed("id", e))?;

    let event_type: EventType = required(record, "type")?
        .parse()
        .map_err(|e: EventError| malformed("type", e))?;
    let stream: Stream = required(record, "stream")?
        .parse()
        .map_err(|e: EventError| malformed("stream", e))?;
    if stream != event_type.stream() {
        return Err(EventError::StreamMismatch {
            event_type: event_type.to_string(),
            expected: event_type.stream().to_string(),
            actual: stream.to_string(),
        });
    }

    let version = required(record, "version")?;
    let version = match version.parse::<u32>() {
        Ok(v) if v >= 1 => v,
        Ok(v) => return Err(malformed("version", format!("must be at least 1, got {v}"))),
        Err(e) => return Err(malformed("version", format!("'{version}': {e}"))),
    };

    let timestamp = required(record, "timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| malformed("timestamp", format!("'{timestamp}': {e}")))?;

    let data: Value =
        serde_json::from_str(required(record, "data")?).map_err(|e| malformed("data", e))?;
    let payload = EventPayload::decode(event_type, data).map_err(|e| malformed("data", e))?;

    let metadata = match record.get("metadata") {
        None | Some("") => Metadata::new(),
        Some(raw) => serde_json::from_str(raw).map_err(|e| malformed("metadata", e))?,
    };

    Ok(Event::assemble(
        id,
        version,
        timestamp,
        optional(record, "correlation_id"),
        optional(record, "user_id"),
        metadata,
        payload,
    ))
}

fn required<'a>(record: &'a WireRecord, field: &'static str) -> Result<&'a str, EventError> {
    record
        .get(field)
        .ok_or_else(|| malformed(field, "missing field"))
}

fn optional(record: &WireRecord, field: &str) -> Option<String> {
    record
        .get(field)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn malformed(field: &'static str, cause: impl ToString) -> EventError {
    EventError::Decode {
        field,
        cause: cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        AiGenerationRequested, AiTask, EventKind, SubscriptionTier, UserDeleted, UserRegistered,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Event {
        AiGenerationRequested::new("r-1", "v-1", AiTask::BusinessPlan)
            .with_context(json!({"industry": "fintech"}))
            .draft()
            .correlation_id("corr-1")
            .user_id("u-1")
            .with_metadata("source", "web")
            .build()
    }

    #[test]
    fn round_trip_preserves_the_event() {
        let event = sample();
        let record = encode(&event).unwrap();

        assert_eq!(record.len(), FIELDS.len());
        for field in FIELDS {
            assert!(record.get(field).is_some(), "missing {field}");
        }
        assert_eq!(decode(&record).unwrap(), event);
    }

    #[test]
    fn field_formats() {
        let event = sample();
        let record = encode(&event).unwrap();

        assert_eq!(record.get("id"), Some(event.id().to_string().as_str()));
        assert_eq!(record.get("stream"), Some("ai.events"));
        assert_eq!(record.get("type"), Some("ai.generation_requested"));
        assert_eq!(record.get("version"), Some("1"));

        let ts = record.get("timestamp").unwrap();
        assert!(ts.ends_with('Z'), "{ts}");
        assert_eq!(ts.len(), "2024-05-01T12:30:00.125Z".len(), "{ts}");
    }

    #[test]
    fn absent_optionals_encode_as_empty() {
        let event = UserDeleted::new("u-1").into_event();
        let record = encode(&event).unwrap();

        assert_eq!(record.get("correlation_id"), Some(""));
        assert_eq!(record.get("user_id"), Some(""));
        assert_eq!(record.get("metadata"), Some("{}"));

        let decoded = decode(&record).unwrap();
        assert_eq!(decoded.correlation_id(), None);
        assert_eq!(decoded.user_id(), None);
        assert!(decoded.metadata().is_empty());
    }

    #[test]
    fn missing_metadata_decodes_as_empty() {
        let event = UserDeleted::new("u-1").into_event();
        let record: WireRecord = encode(&event)
            .unwrap()
            .iter()
            .filter(|(field, _)| field.as_str() != "metadata")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        assert!(decode(&record).unwrap().metadata().is_empty());
    }

    #[test]
    fn malformed_fields_name_the_field() {
        let event = UserRegistered::new("u-1", "ada@example.com", SubscriptionTier::Free).into_event();

        for (field, value) in [
            ("id", "not-a-ulid"),
            ("type", "user.exploded"),
            ("version", "one"),
            ("version", "0"),
            ("timestamp", "yesterday"),
            ("data", "{not json"),
            ("data", r#"{"user_id": "u-1"}"#),
            ("metadata", "[1, 2]"),
        ] {
            let mut record = encode(&event).unwrap();
            record.insert(field, value);
            match decode(&record) {
                Err(EventError::Decode { field: reported, .. }) => {
                    assert_eq!(reported, field, "{field}={value}")
                }
                other => panic!("{field}={value}: expected Decode error, got {other:?}"),
            }
        }
    }

    #[test]
    fn stream_must_match_the_type() {
        let event = UserRegistered::new("u-1", "ada@example.com", SubscriptionTier::Free).into_event();
        let mut record = encode(&event).unwrap();
        record.insert("stream", "ai.events");

        assert!(matches!(
            decode(&record),
            Err(EventError::StreamMismatch { expected, actual, .. })
                if expected == "user.events" && actual == "ai.events"
        ));

        record.insert("stream", "billing.events");
        assert!(matches!(
            decode(&record),
            Err(EventError::Decode { field: "stream", .. })
        ));
    }

    #[test]
    fn from_redis_style_hash() {
        let event = sample();
        let hash: HashMap<String, String> = encode(&event)
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        assert_eq!(decode(&WireRecord::from(hash)).unwrap(), event);
    }
}
