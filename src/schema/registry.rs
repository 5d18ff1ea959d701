//! Schema registry - tag to structural contract for the whole envelope.
//!
//! The registry is opt-in: decoders and the publish path work from the
//! typed catalog directly. Use it at trust boundaries where an envelope
//! arrives as loose JSON (admin tooling, replay files, HTTP ingest).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use ulid::Ulid;

use super::{
    AiGenerationCompleted, AiGenerationFailed, AiGenerationRequested, ContentGenerated,
    ContextUpdated, EventKind, EventPayload, EventType, FileUploaded, MarketAnalysisCompleted,
    MarketDataCollected, NotificationDelivered, NotificationRequested, ServiceStarted,
    ServiceStopped, Stream, UserDeleted, UserRegistered, UserTierChanged, ValidationIssues,
};
use crate::error::EventError;
use crate::event::{Event, Metadata};

type DataDecoder = fn(Value) -> Result<EventPayload, serde_json::Error>;

/// Structural contract for one event type.
#[derive(Debug, Clone, Copy)]
pub struct EventSchema {
    event_type: EventType,
    stream: Stream,
    version: u32,
    decode_data: DataDecoder,
}

impl EventSchema {
    /// Derive the schema from a payload type. The stream binding comes from
    /// the type tag, so it cannot disagree with the catalog.
    pub fn of<E: EventKind>() -> Self {
        Self {
            event_type: E::TYPE,
            stream: E::TYPE.stream(),
            version: E::VERSION,
            decode_data: decode_as::<E>,
        }
    }

    /// Type this schema describes.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Stream the type is bound to.
    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Highest schema revision this build understands.
    pub fn version(&self) -> u32 {
        self.version
    }

    fn same_contract(&self, other: &EventSchema) -> bool {
        self.event_type == other.event_type
            && self.stream == other.stream
            && self.version == other.version
    }
}

fn decode_as<E: EventKind>(data: Value) -> Result<EventPayload, serde_json::Error> {
    serde_json::from_value::<E>(data).map(EventKind::into_payload)
}

/// Map of event type tag to [`EventSchema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, EventSchema>,
}

impl SchemaRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every type in the catalog.
    pub fn builtin() -> Self {
        let schemas = [
            EventSchema::of::<UserRegistered>(),
            EventSchema::of::<UserTierChanged>(),
            EventSchema::of::<UserDeleted>(),
            EventSchema::of::<FileUploaded>(),
            EventSchema::of::<ContentGenerated>(),
            EventSchema::of::<ContextUpdated>(),
            EventSchema::of::<MarketDataCollected>(),
            EventSchema::of::<MarketAnalysisCompleted>(),
            EventSchema::of::<AiGenerationRequested>(),
            EventSchema::of::<AiGenerationCompleted>(),
            EventSchema::of::<AiGenerationFailed>(),
            EventSchema::of::<NotificationRequested>(),
            EventSchema::of::<NotificationDelivered>(),
            EventSchema::of::<ServiceStarted>(),
            EventSchema::of::<ServiceStopped>(),
        ];

        Self {
            schemas: schemas
                .into_iter()
                .map(|schema| (schema.event_type.as_str().to_string(), schema))
                .collect(),
        }
    }

    /// Register a schema under its type tag.
    ///
    /// Registering the same contract twice is a no-op; a different contract
    /// for an already-registered tag is a [`EventError::SchemaConflict`].
    pub fn register(&mut self, schema: EventSchema) -> Result<(), EventError> {
        let tag = schema.event_type.as_str();
        match self.schemas.get(tag) {
            Some(existing) if existing.same_contract(&schema) => Ok(()),
            Some(existing) => Err(EventError::SchemaConflict {
                event_type: tag.to_string(),
                reason: format!(
                    "already registered as version {} on {}",
                    existing.version, existing.stream
                ),
            }),
            None => {
                self.schemas.insert(tag.to_string(), schema);
                Ok(())
            }
        }
    }

    /// Schema registered for `event_type`, if any.
    pub fn get(&self, event_type: &str) -> Option<&EventSchema> {
        self.schemas.get(event_type)
    }

    /// Look up a schema, failing with [`EventError::UnknownEventType`].
    pub fn schema(&self, event_type: &str) -> Result<&EventSchema, EventError> {
        self.get(event_type)
            .ok_or_else(|| EventError::UnknownEventType {
                event_type: event_type.to_string(),
            })
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Validate a JSON envelope against the schema for `event_type`.
    ///
    /// Every field is checked before failing, so the returned
    /// [`EventError::SchemaValidation`] lists all issues at once.
    pub fn validate(&self, event_type: &str, candidate: &Value) -> Result<Event, EventError> {
        let schema = self.schema(event_type)?;
        let mut issues = ValidationIssues::new();

        let Some(object) = candidate.as_object() else {
            issues.push("$", "envelope must be a JSON object");
            return Err(rejected(schema, issues));
        };

        let id = required_str(object, "id", &mut issues).and_then(|raw| {
            Ulid::from_string(raw)
                .map_err(|e| issues.push("id", format!("'{raw}' is not a ULID: {e}")))
                .ok()
        });

        if let Some(stream) = required_str(object, "stream", &mut issues) {
            if stream != schema.stream.as_str() {
                issues.push("stream", format!("must be {}, got '{stream}'", schema.stream));
            }
        }

        if let Some(tag) = required_str(object, "type", &mut issues) {
            if tag != schema.event_type.as_str() {
                issues.push("type", format!("must be {}, got '{tag}'", schema.event_type));
            }
        }

        let version = match object.get("version") {
            None | Some(Value::Null) => Some(1),
            Some(value) => match value.as_u64().and_then(|v| u32::try_from(v).ok()) {
                Some(v) if (1..=schema.version).contains(&v) => Some(v),
                _ => {
                    issues.push(
                        "version",
                        format!("must be an integer in 1..={}, got {value}", schema.version),
                    );
                    None
                }
            },
        };

        let timestamp = required_str(object, "timestamp", &mut issues).and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| issues.push("timestamp", format!("'{raw}' is not RFC 3339: {e}")))
                .ok()
        });

        let correlation_id = optional_str(object, "correlation_id", &mut issues);
        let user_id = optional_str(object, "user_id", &mut issues);

        let metadata = match object.get("metadata") {
            None | Some(Value::Null) => Metadata::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                issues.push("metadata", "must be an object");
                Metadata::new()
            }
        };

        let payload = match object.get("data") {
            None => {
                issues.push("data", "is required");
                None
            }
            Some(data) => match (schema.decode_data)(data.clone()) {
                Ok(payload) => {
                    issues.extend(payload.validate());
                    Some(payload)
                }
                Err(e) => {
                    issues.push("data", e.to_string());
                    None
                }
            },
        };

        match (id, version, timestamp, payload) {
            (Some(id), Some(version), Some(timestamp), Some(payload)) if issues.is_empty() => {
                Ok(Event::assemble(
                    id,
                    version,
                    timestamp,
                    correlation_id,
                    user_id,
                    metadata,
                    payload,
                ))
            }
            _ => Err(rejected(schema, issues)),
        }
    }

    /// Validate an already-typed event: semantic payload rules and the
    /// version bound.
    pub fn check(&self, event: &Event) -> Result<(), EventError> {
        let schema = self.schema(event.event_type().as_str())?;
        let mut issues = event.payload().validate();
        if !(1..=schema.version).contains(&event.version()) {
            issues.push(
                "version",
                format!(
                    "must be in 1..={}, got {}",
                    schema.version,
                    event.version()
                ),
            );
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(rejected(schema, issues))
        }
    }
}

fn rejected(schema: &EventSchema, issues: ValidationIssues) -> EventError {
    EventError::SchemaValidation {
        event_type: schema.event_type.as_str().to_string(),
        issues,
    }
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    issues: &mut ValidationIssues,
) -> Option<&'a str> {
    match object.get(field) {
        Some(Value::String(value)) => Some(value.as_str()),
        Some(_) => {
            issues.push(field, "must be a string");
            None
        }
        None => {
            issues.push(field, "is required");
            None
        }
    }
}

fn optional_str(
    object: &Map<String, Value>,
    field: &str,
    issues: &mut ValidationIssues,
) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) if value.is_empty() => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            issues.push(field, "must be a string or null");
            None
        }
    }
}
