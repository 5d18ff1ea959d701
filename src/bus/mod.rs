//! Event bus - publishing, consumer groups and correlated replies over an
//! append-only stream broker.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 EventClient<C: Connector>                   │
//! │  connect / disconnect / publish / publish_<type>            │
//! │  create_group / read_group / ack / pending_count            │
//! │  wait_for_event / request                                   │
//! └─────────────────────────────────────────────────────────────┘
//!          │ codec::encode / decode          │ GroupConsumer
//!          ▼                                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StreamBroker trait                       │
//! │  append / read_group / ack / create_group / destroy_group   │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                 │
//!          ▼                                 ▼
//! ┌─────────────────────┐          ┌─────────────────────┐
//! │   InMemoryBroker    │          │     RedisBroker     │
//! │     (included)      │          │  (feature "redis")  │
//! └─────────────────────┘          └─────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let client = EventClient::new(RedisConfig::from_env()?);
//! client.connect().await?;
//!
//! client
//!     .publish_user_registered(UserRegistered::new("u-1", "ada@example.com", SubscriptionTier::Free))
//!     .await?;
//!
//! let request = AiGenerationRequested::new("r-1", "v-1", AiTask::PitchDeck).into_event();
//! let reply = client
//!     .request(request, EventType::AiGenerationCompleted, Duration::from_secs(30))
//!     .await?;
//! ```

mod broker;
mod client;
mod consumer;
mod in_memory;
mod publish;
#[cfg(feature = "redis")]
mod redis;
mod waiter;

pub use broker::{Connector, GroupCreation, StartId, StreamBroker, StreamEntry};
pub use client::{Delivery, EventClient};
pub use consumer::{ConsumerHandle, ConsumerStats, EventHandler, GroupConsumer, HandlerError};
pub use in_memory::InMemoryBroker;
#[cfg(feature = "redis")]
pub use self::redis::RedisBroker;
pub use waiter::{EventWait, WaitCanceller};
