//! Event schemas - the closed catalog of event types and their payloads.
//!
//! Every event type is bound to exactly one stream and one payload struct.
//! The binding lives in [`EventType::stream`], an exhaustive match, so adding
//! a variant without routing it is a compile error rather than a runtime
//! surprise.
//!
//! ```text
//! user.events          user.registered, user.tier_changed, user.deleted
//! content.events       file.uploaded, content.generated
//! contextual.events    context.updated
//! market.events        market.data_collected, market.analysis_completed
//! ai.events            ai.generation_requested, ai.generation_completed, ai.generation_failed
//! notification.events  notification.requested, notification.delivered
//! system.events        system.service_started, system.service_stopped
//! ```

mod ai;
mod content;
mod contextual;
mod issues;
mod market;
mod notification;
mod registry;
mod system;
mod user;

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::EventError;
use crate::event::{create_event, Event, EventDraft};

pub use ai::{AiGenerationCompleted, AiGenerationFailed, AiGenerationRequested, AiTask};
pub use content::{ContentGenerated, FileUploaded};
pub use contextual::ContextUpdated;
pub use issues::{ValidationIssue, ValidationIssues};
pub use market::{MarketAnalysisCompleted, MarketDataCollected};
pub use notification::{NotificationChannel, NotificationDelivered, NotificationRequested};
pub use registry::{EventSchema, SchemaRegistry};
pub use system::{ServiceStarted, ServiceStopped};
pub use user::{SubscriptionTier, UserDeleted, UserRegistered, UserTierChanged};

/// The fixed set of streams. Streams are not ordered relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stream {
    User,
    Content,
    Contextual,
    Market,
    Ai,
    Notification,
    System,
}

impl Stream {
    pub const ALL: [Stream; 7] = [
        Stream::User,
        Stream::Content,
        Stream::Contextual,
        Stream::Market,
        Stream::Ai,
        Stream::Notification,
        Stream::System,
    ];

    /// The broker key for this stream.
    pub fn as_str(self) -> &'static str {
        match self {
            Stream::User => "user.events",
            Stream::Content => "content.events",
            Stream::Contextual => "contextual.events",
            Stream::Market => "market.events",
            Stream::Ai => "ai.events",
            Stream::Notification => "notification.events",
            Stream::System => "system.events",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stream {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stream::ALL
            .into_iter()
            .find(|stream| stream.as_str() == s)
            .ok_or_else(|| EventError::UnknownStream {
                stream: s.to_string(),
            })
    }
}

/// Closed set of event type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    UserRegistered,
    UserTierChanged,
    UserDeleted,
    FileUploaded,
    ContentGenerated,
    ContextUpdated,
    MarketDataCollected,
    MarketAnalysisCompleted,
    AiGenerationRequested,
    AiGenerationCompleted,
    AiGenerationFailed,
    NotificationRequested,
    NotificationDelivered,
    ServiceStarted,
    ServiceStopped,
}

impl EventType {
    pub const ALL: [EventType; 15] = [
        EventType::UserRegistered,
        EventType::UserTierChanged,
        EventType::UserDeleted,
        EventType::FileUploaded,
        EventType::ContentGenerated,
        EventType::ContextUpdated,
        EventType::MarketDataCollected,
        EventType::MarketAnalysisCompleted,
        EventType::AiGenerationRequested,
        EventType::AiGenerationCompleted,
        EventType::AiGenerationFailed,
        EventType::NotificationRequested,
        EventType::NotificationDelivered,
        EventType::ServiceStarted,
        EventType::ServiceStopped,
    ];

    /// The wire tag, e.g. `user.registered`.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::UserRegistered => "user.registered",
            EventType::UserTierChanged => "user.tier_changed",
            EventType::UserDeleted => "user.deleted",
            EventType::FileUploaded => "file.uploaded",
            EventType::ContentGenerated => "content.generated",
            EventType::ContextUpdated => "context.updated",
            EventType::MarketDataCollected => "market.data_collected",
            EventType::MarketAnalysisCompleted => "market.analysis_completed",
            EventType::AiGenerationRequested => "ai.generation_requested",
            EventType::AiGenerationCompleted => "ai.generation_completed",
            EventType::AiGenerationFailed => "ai.generation_failed",
            EventType::NotificationRequested => "notification.requested",
            EventType::NotificationDelivered => "notification.delivered",
            EventType::ServiceStarted => "system.service_started",
            EventType::ServiceStopped => "system.service_stopped",
        }
    }

    /// The one stream this type is published to.
    pub fn stream(self) -> Stream {
        match self {
            EventType::UserRegistered | EventType::UserTierChanged | EventType::UserDeleted => {
                Stream::User
            }
            EventType::FileUploaded | EventType::ContentGenerated => Stream::Content,
            EventType::ContextUpdated => Stream::Contextual,
            EventType::MarketDataCollected | EventType::MarketAnalysisCompleted => Stream::Market,
            EventType::AiGenerationRequested
            | EventType::AiGenerationCompleted
            | EventType::AiGenerationFailed => Stream::Ai,
            EventType::NotificationRequested | EventType::NotificationDelivered => {
                Stream::Notification
            }
            EventType::ServiceStarted | EventType::ServiceStopped => Stream::System,
        }
    }

    /// Current schema revision of this type's payload.
    pub fn current_version(self) -> u32 {
        match self {
            EventType::UserRegistered => UserRegistered::VERSION,
            EventType::UserTierChanged => UserTierChanged::VERSION,
            EventType::UserDeleted => UserDeleted::VERSION,
            EventType::FileUploaded => FileUploaded::VERSION,
            EventType::ContentGenerated => ContentGenerated::VERSION,
            EventType::ContextUpdated => ContextUpdated::VERSION,
            EventType::MarketDataCollected => MarketDataCollected::VERSION,
            EventType::MarketAnalysisCompleted => MarketAnalysisCompleted::VERSION,
            EventType::AiGenerationRequested => AiGenerationRequested::VERSION,
            EventType::AiGenerationCompleted => AiGenerationCompleted::VERSION,
            EventType::AiGenerationFailed => AiGenerationFailed::VERSION,
            EventType::NotificationRequested => NotificationRequested::VERSION,
            EventType::NotificationDelivered => NotificationDelivered::VERSION,
            EventType::ServiceStarted => ServiceStarted::VERSION,
            EventType::ServiceStopped => ServiceStopped::VERSION,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| EventError::UnknownEventType {
                event_type: s.to_string(),
            })
    }
}

/// Implemented by every payload struct in the catalog.
///
/// `TYPE` pins both the wire tag and (through [`EventType::stream`]) the
/// stream, so a payload can only ever be routed one way.
pub trait EventKind: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TYPE: EventType;

    /// Schema revision; bump on additive payload changes.
    const VERSION: u32 = 1;

    /// Semantic rules serde cannot express. Paths are rooted at `data`.
    fn check(&self, issues: &mut ValidationIssues) {
        let _ = issues;
    }

    fn into_payload(self) -> EventPayload;

    /// Start an event draft carrying this payload.
    fn draft(self) -> EventDraft {
        EventDraft::new(self)
    }

    /// Build a complete event with a fresh id and timestamp.
    fn into_event(self) -> Event {
        create_event(self.draft())
    }
}

/// Tagged union over every known payload.
///
/// Serializes as the bare payload; the tag travels separately in the
/// envelope's `type` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    UserRegistered(UserRegistered),
    UserTierChanged(UserTierChanged),
    UserDeleted(UserDeleted),
    FileUploaded(FileUploaded),
    ContentGenerated(ContentGenerated),
    ContextUpdated(ContextUpdated),
    MarketDataCollected(MarketDataCollected),
    MarketAnalysisCompleted(MarketAnalysisCompleted),
    AiGenerationRequested(AiGenerationRequested),
    AiGenerationCompleted(AiGenerationCompleted),
    AiGenerationFailed(AiGenerationFailed),
    NotificationRequested(NotificationRequested),
    NotificationDelivered(NotificationDelivered),
    ServiceStarted(ServiceStarted),
    ServiceStopped(ServiceStopped),
}

impl EventPayload {
    /// Catalog tag of the wrapped payload.
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::UserRegistered(_) => EventType::UserRegistered,
            EventPayload::UserTierChanged(_) => EventType::UserTierChanged,
            EventPayload::UserDeleted(_) => EventType::UserDeleted,
            EventPayload::FileUploaded(_) => EventType::FileUploaded,
            EventPayload::ContentGenerated(_) => EventType::ContentGenerated,
            EventPayload::ContextUpdated(_) => EventType::ContextUpdated,
            EventPayload::MarketDataCollected(_) => EventType::MarketDataCollected,
            EventPayload::MarketAnalysisCompleted(_) => EventType::MarketAnalysisCompleted,
            EventPayload::AiGenerationRequested(_) => EventType::AiGenerationRequested,
            EventPayload::AiGenerationCompleted(_) => EventType::AiGenerationCompleted,
            EventPayload::AiGenerationFailed(_) => EventType::AiGenerationFailed,
            EventPayload::NotificationRequested(_) => EventType::NotificationRequested,
            EventPayload::NotificationDelivered(_) => EventType::NotificationDelivered,
            EventPayload::ServiceStarted(_) => EventType::ServiceStarted,
            EventPayload::ServiceStopped(_) => EventType::ServiceStopped,
        }
    }

    /// Stream the wrapped payload is bound to.
    pub fn stream(&self) -> Stream {
        self.event_type().stream()
    }

    /// Deserialize `data` into the payload bound to `event_type`.
    pub fn decode(event_type: EventType, data: Value) -> Result<Self, serde_json::Error> {
        use serde_json::from_value;

        Ok(match event_type {
            EventType::UserRegistered => EventPayload::UserRegistered(from_value(data)?),
            EventType::UserTierChanged => EventPayload::UserTierChanged(from_value(data)?),
            EventType::UserDeleted => EventPayload::UserDeleted(from_value(data)?),
            EventType::FileUploaded => EventPayload::FileUploaded(from_value(data)?),
            EventType::ContentGenerated => EventPayload::ContentGenerated(from_value(data)?),
            EventType::ContextUpdated => EventPayload::ContextUpdated(from_value(data)?),
            EventType::MarketDataCollected => {
                EventPayload::MarketDataCollected(from_value(data)?)
            }
            EventType::MarketAnalysisCompleted => {
                EventPayload::MarketAnalysisCompleted(from_value(data)?)
            }
            EventType::AiGenerationRequested => {
                EventPayload::AiGenerationRequested(from_value(data)?)
            }
            EventType::AiGenerationCompleted => {
                EventPayload::AiGenerationCompleted(from_value(data)?)
            }
            EventType::AiGenerationFailed => EventPayload::AiGenerationFailed(from_value(data)?),
            EventType::NotificationRequested => {
                EventPayload::NotificationRequested(from_value(data)?)
            }
            EventType::NotificationDelivered => {
                EventPayload::NotificationDelivered(from_value(data)?)
            }
            EventType::ServiceStarted => EventPayload::ServiceStarted(from_value(data)?),
            EventType::ServiceStopped => EventPayload::ServiceStopped(from_value(data)?),
        })
    }

    /// The payload as a JSON value, as it appears in the envelope's `data`.
    pub fn to_data(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Run the payload's semantic rules. An empty result means valid.
    pub fn validate(&self) -> ValidationIssues {
        let mut issues = ValidationIssues::new();
        match self {
            EventPayload::UserRegistered(p) => p.check(&mut issues),
            EventPayload::UserTierChanged(p) => p.check(&mut issues),
            EventPayload::UserDeleted(p) => p.check(&mut issues),
            EventPayload::FileUploaded(p) => p.check(&mut issues),
            EventPayload::ContentGenerated(p) => p.check(&mut issues),
            EventPayload::ContextUpdated(p) => p.check(&mut issues),
            EventPayload::MarketDataCollected(p) => p.check(&mut issues),
            EventPayload::MarketAnalysisCompleted(p) => p.check(&mut issues),
            EventPayload::AiGenerationRequested(p) => p.check(&mut issues),
            EventPayload::AiGenerationCompleted(p) => p.check(&mut issues),
            EventPayload::AiGenerationFailed(p) => p.check(&mut issues),
            EventPayload::NotificationRequested(p) => p.check(&mut issues),
            EventPayload::NotificationDelivered(p) => p.check(&mut issues),
            EventPayload::ServiceStarted(p) => p.check(&mut issues),
            EventPayload::ServiceStopped(p) => p.check(&mut issues),
        }
        issues
    }
}
