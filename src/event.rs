//! Event envelope and factory.
//!
//! An [`Event`] is the unit written to a stream: a fresh ULID, a
//! factory-assigned timestamp, optional correlation/user context and a typed
//! payload. Stream and type are derived from the payload, so an event can
//! never be appended to the wrong stream.

use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde_json::Value;
use ulid::{Generator, Ulid};

use crate::schema::{EventKind, EventPayload, EventType, Stream};

/// Free-form side information carried with an event.
pub type Metadata = serde_json::Map<String, Value>;

/// A fully populated, uniquely identified event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: Ulid,
    version: u32,
    timestamp: DateTime<Utc>,
    correlation_id: Option<String>,
    user_id: Option<String>,
    metadata: Metadata,
    payload: EventPayload,
}

impl Event {
    pub(crate) fn assemble(
        id: Ulid,
        version: u32,
        timestamp: DateTime<Utc>,
        correlation_id: Option<String>,
        user_id: Option<String>,
        metadata: Metadata,
        payload: EventPayload,
    ) -> Self {
        Self {
            id,
            version,
            timestamp,
            correlation_id,
            user_id,
            metadata,
            payload,
        }
    }

    /// Unique, time-sortable event id.
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Stream the event is appended to, fixed by its type.
    pub fn stream(&self) -> Stream {
        self.payload.stream()
    }

    /// Catalog type of the payload.
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Schema revision the payload was written with.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Creation time, millisecond resolution.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Id tying a reply to its request.
    ///
    /// ```
    /// use venture_events::schema::{EventKind, UserDeleted};
    ///
    /// let event = UserDeleted::new("u-1").draft().correlation_id("c-1").build();
    /// assert_eq!(event.correlation_id(), Some("c-1"));
    /// assert_eq!(event.stream().as_str(), "user.events");
    /// ```
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// User on whose behalf the event was produced.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Free-form side information.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Typed payload.
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Consume the event, keeping only its payload.
    pub fn into_payload(self) -> EventPayload {
        self.payload
    }

    /// Set the correlation id before the event is published.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Whether this is the `event_type` reply carrying `correlation_id`.
    pub fn matches(&self, event_type: EventType, correlation_id: &str) -> bool {
        self.event_type() == event_type && self.correlation_id() == Some(correlation_id)
    }
}

/// Caller-supplied part of an event; [`create_event`] fills in the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    payload: EventPayload,
    version: Option<u32>,
    correlation_id: Option<String>,
    user_id: Option<String>,
    metadata: Metadata,
}

impl EventDraft {
    /// Start a draft from a typed payload.
    pub fn new<E: EventKind>(payload: E) -> Self {
        Self::from_payload(payload.into_payload())
    }

    /// Start a draft from an already wrapped payload.
    pub fn from_payload(payload: EventPayload) -> Self {
        Self {
            payload,
            version: None,
            correlation_id: None,
            user_id: None,
            metadata: Metadata::new(),
        }
    }

    /// Override the schema revision. Defaults to the type's current version.
    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the correlation id.
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the acting user.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Replace the metadata map.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Stamp id and timestamp; same as [`create_event`].
    pub fn build(self) -> Event {
        create_event(self)
    }
}

/// Build an event from a draft: assigns a fresh id and the current time and
/// passes every other field through unchanged.
pub fn create_event(draft: EventDraft) -> Event {
    let (id, timestamp) = next_identity();
    let version = draft
        .version
        .unwrap_or_else(|| draft.payload.event_type().current_version());

    Event {
        id,
        version,
        timestamp,
        correlation_id: draft.correlation_id,
        user_id: draft.user_id,
        metadata: draft.metadata,
        payload: draft.payload,
    }
}

/// Process-wide source of ids and timestamps.
///
/// Timestamps have millisecond resolution (the wire resolution) and never
/// go backwards even if the wall clock does. Ids come from a monotonic
/// generator fed the same instant, so they sort in creation order.
struct Clock {
    last_ms: i64,
    ids: Generator,
}

fn next_identity() -> (Ulid, DateTime<Utc>) {
    static CLOCK: OnceLock<Mutex<Clock>> = OnceLock::new();

    let mut clock = CLOCK
        .get_or_init(|| {
            Mutex::new(Clock {
                last_ms: 0,
                ids: Generator::new(),
            })
        })
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    let ms = Utc::now().timestamp_millis().max(clock.last_ms);
    clock.last_ms = ms;

    let at = UNIX_EPOCH + Duration::from_millis(u64::try_from(ms).unwrap_or_default());
    let id = clock
        .ids
        .generate_from_datetime(at)
        .unwrap_or_else(|_| Ulid::from_datetime(at));
    let timestamp = DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now);

    (id, timestamp)
}
