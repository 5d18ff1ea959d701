//! Typed, durable, ordered event bus over Redis Streams.
//!
//! - [`schema`]: the closed catalog of event types, each bound to one stream
//!   and one payload struct, plus a registry for validating loose JSON.
//! - [`event`]: the envelope and the factory that stamps ids and timestamps.
//! - [`codec`]: the single mapping between an event and its wire record.
//! - [`bus`]: the client (publish, consumer groups, correlation waits), the
//!   broker seam and its in-memory and Redis implementations.
//!
//! ```ignore
//! use venture_events::bus::EventClient;
//! use venture_events::config::RedisConfig;
//! use venture_events::schema::{SubscriptionTier, UserRegistered};
//!
//! let client = EventClient::new(RedisConfig::from_env()?);
//! client.connect().await?;
//! let id = client
//!     .publish_user_registered(UserRegistered::new("u-1", "ada@example.com", SubscriptionTier::Pro))
//!     .await?;
//! ```

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod schema;

pub use bus::{EventClient, InMemoryBroker};
pub use config::{ConsumerOptions, RedisConfig, WaitOptions};
pub use error::EventError;
pub use event::{create_event, Event, EventDraft, Metadata};
pub use health::HealthStatus;
pub use schema::{EventKind, EventPayload, EventType, SchemaRegistry, Stream};
