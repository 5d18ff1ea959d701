//! Broker seam: the handful of stream operations the bus needs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::codec::WireRecord;
use crate::error::EventError;

/// Where a new consumer group starts reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartId {
    /// Every entry already in the stream.
    Beginning,
    /// Only entries appended after the group is created.
    Tail,
    /// Entries strictly after this broker id.
    After(String),
}

impl StartId {
    /// The id as Redis spells it in `XGROUP CREATE`.
    pub fn as_redis_id(&self) -> &str {
        match self {
            StartId::Beginning => "0",
            StartId::Tail => "$",
            StartId::After(id) => id,
        }
    }
}

impl fmt::Display for StartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_redis_id())
    }
}

/// One stream entry as delivered to a group reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Broker-assigned id, e.g. `1714566600125-0`.
    pub id: String,
    pub record: WireRecord,
}

/// Outcome of a group creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCreation {
    Created,
    AlreadyExists,
}

/// Append-only streams with consumer groups.
///
/// Implementations own their connection(s) and must be shareable across
/// tasks. Every method is a single broker round trip; none retries.
#[async_trait]
pub trait StreamBroker: Send + Sync + 'static {
    /// Round-trip check.
    async fn ping(&self) -> Result<(), EventError>;

    /// Append a record, returning the broker-assigned entry id.
    async fn append(&self, stream: &str, record: &WireRecord) -> Result<String, EventError>;

    async fn stream_len(&self, stream: &str) -> Result<u64, EventError>;

    /// Create `group` on `stream`, creating the stream if needed.
    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: &StartId,
    ) -> Result<GroupCreation, EventError>;

    /// Destroy a group. Returns false if it did not exist.
    async fn destroy_group(&self, stream: &str, group: &str) -> Result<bool, EventError>;

    /// Deliver up to `count` new entries to `consumer`, waiting at most
    /// `block` when none are available. An empty result means the wait
    /// elapsed.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, EventError>;

    /// Acknowledge delivered entries. Returns how many were pending.
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, EventError>;

    /// Entries delivered to the group but not yet acknowledged.
    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64, EventError>;
}

/// Opens broker connections.
///
/// The client opens one on `connect()`; the correlation waiter opens a
/// dedicated one per wait so its blocking reads never hold up publishing.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Broker: StreamBroker;

    async fn connect(&self) -> Result<Self::Broker, EventError>;

    /// Human-readable destination, for logs.
    fn target(&self) -> String;
}

/// `timeout` from now, saturating at a deadline far enough out to never fire.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Longest wait ever handed to a timer or the broker; about thirty years.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);
