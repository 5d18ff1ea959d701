//! In-memory broker for tests and single-process use.
//!
//! Mirrors the Redis Streams semantics the bus relies on: per-stream
//! append-only logs with `<ms>-<seq>` ids, consumer groups with their own
//! cursor and pending list, and blocking group reads.
//!
//! ```
//! use venture_events::bus::{InMemoryBroker, StartId, StreamBroker};
//! use venture_events::codec::WireRecord;
//! use std::time::Duration;
//!
//! # tokio_test_block_on(async {
//! let broker = InMemoryBroker::new();
//! broker.create_group("user.events", "billing", &StartId::Beginning).await.unwrap();
//!
//! let mut record = WireRecord::new();
//! record.insert("type", "user.registered");
//! broker.append("user.events", &record).await.unwrap();
//!
//! let batch = broker
//!     .read_group("user.events", "billing", "worker-1", 10, Duration::ZERO)
//!     .await
//!     .unwrap();
//! assert_eq!(batch.len(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::timeout_at;

use super::broker::{
    deadline_after, Connector, GroupCreation, StartId, StreamBroker, StreamEntry,
};
use crate::codec::WireRecord;
use crate::error::EventError;

/// Thread-safe in-memory broker. Clones share the same streams.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    appended: Notify,
    operations: AtomicU64,
    connections: AtomicU64,
}

#[derive(Default)]
struct State {
    streams: HashMap<String, StreamLog>,
}

#[derive(Default)]
struct StreamLog {
    entries: Vec<(EntryId, WireRecord)>,
    last_id: EntryId,
    groups: BTreeMap<String, Group>,
}

struct Group {
    /// Index of the next undelivered entry.
    cursor: usize,
    /// Delivered but unacknowledged entries, with the consumer holding them.
    pending: BTreeMap<EntryId, String>,
}

/// Stream entry id: milliseconds plus a sequence within the millisecond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct EntryId {
    ms: u64,
    seq: u64,
}

impl EntryId {
    fn next_after(last: EntryId) -> EntryId {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        if now > last.ms {
            EntryId { ms: now, seq: 0 }
        } else {
            EntryId {
                ms: last.ms,
                seq: last.seq + 1,
            }
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EventError::broker("parse id", format!("invalid stream id '{s}'"));
        let (ms, seq) = s.split_once('-').unwrap_or((s, "0"));
        Ok(EntryId {
            ms: ms.parse().map_err(|_| invalid())?,
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }
}

impl InMemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of broker calls made so far.
    pub fn operations(&self) -> u64 {
        self.inner.operations.load(Ordering::SeqCst)
    }

    /// Number of times a connection to this broker was opened.
    pub fn connections(&self) -> u64 {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Names of the groups currently registered on `stream`.
    pub fn groups(&self, stream: &str) -> Vec<String> {
        self.state()
            .streams
            .get(stream)
            .map(|log| log.groups.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every entry in `stream`, oldest first.
    pub fn entries(&self, stream: &str) -> Vec<StreamEntry> {
        self.state()
            .streams
            .get(stream)
            .map(|log| {
                log.entries
                    .iter()
                    .map(|(id, record)| StreamEntry {
                        id: id.to_string(),
                        record: record.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pending entries of `group` held by `consumer`.
    pub fn pending_for(&self, stream: &str, group: &str, consumer: &str) -> usize {
        self.state()
            .streams
            .get(stream)
            .and_then(|log| log.groups.get(group))
            .map_or(0, |group_state| {
                group_state
                    .pending
                    .values()
                    .filter(|holder| holder.as_str() == consumer)
                    .count()
            })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self) {
        self.inner.operations.fetch_add(1, Ordering::SeqCst);
    }

    /// Deliver up to `count` undelivered entries. `None` when there are none.
    fn take(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Option<Vec<StreamEntry>>, EventError> {
        let mut state = self.state();
        let log = state
            .streams
            .get_mut(stream)
            .ok_or_else(|| no_group("xreadgroup", stream, group))?;
        let StreamLog {
            entries, groups, ..
        } = log;
        let group_state = groups
            .get_mut(group)
            .ok_or_else(|| no_group("xreadgroup", stream, group))?;

        let end = entries.len().min(group_state.cursor + count.max(1));
        if group_state.cursor >= end {
            return Ok(None);
        }

        let batch: Vec<StreamEntry> = entries[group_state.cursor..end]
            .iter()
            .map(|(id, record)| {
                group_state.pending.insert(*id, consumer.to_string());
                StreamEntry {
                    id: id.to_string(),
                    record: record.clone(),
                }
            })
            .collect();
        group_state.cursor = end;

        Ok(Some(batch))
    }
}

fn no_group(operation: &'static str, stream: &str, group: &str) -> EventError {
    EventError::broker(
        operation,
        format!("NOGROUP no such key '{stream}' or consumer group '{group}'"),
    )
}

#[async_trait]
impl StreamBroker for InMemoryBroker {
    async fn ping(&self) -> Result<(), EventError> {
        self.count();
        Ok(())
    }

    async fn append(&self, stream: &str, record: &WireRecord) -> Result<String, EventError> {
        self.count();
        let id = {
            let mut state = self.state();
            let log = state.streams.entry(stream.to_string()).or_default();
            let id = EntryId::next_after(log.last_id);
            log.last_id = id;
            log.entries.push((id, record.clone()));
            id
        };
        self.inner.appended.notify_waiters();
        Ok(id.to_string())
    }

    async fn stream_len(&self, stream: &str) -> Result<u64, EventError> {
        self.count();
        Ok(self
            .state()
            .streams
            .get(stream)
            .map_or(0, |log| log.entries.len() as u64))
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: &StartId,
    ) -> Result<GroupCreation, EventError> {
        self.count();
        let mut state = self.state();
        let log = state.streams.entry(stream.to_string()).or_default();
        if log.groups.contains_key(group) {
            return Ok(GroupCreation::AlreadyExists);
        }

        let cursor = match start {
            StartId::Beginning => 0,
            StartId::Tail => log.entries.len(),
            StartId::After(id) => {
                let after: EntryId = id.parse()?;
                log.entries.partition_point(|(entry, _)| *entry <= after)
            }
        };
        log.groups.insert(
            group.to_string(),
            Group {
                cursor,
                pending: BTreeMap::new(),
            },
        );
        Ok(GroupCreation::Created)
    }

    async fn destroy_group(&self, stream: &str, group: &str) -> Result<bool, EventError> {
        self.count();
        Ok(self
            .state()
            .streams
            .get_mut(stream)
            .is_some_and(|log| log.groups.remove(group).is_some()))
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, EventError> {
        self.count();
        let deadline = deadline_after(block);

        loop {
            // Register for wake-ups before looking, so an append between the
            // check and the wait is not missed.
            let appended = self.inner.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(batch) = self.take(stream, group, consumer, count)? {
                return Ok(batch);
            }
            if block.is_zero() || timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, EventError> {
        self.count();
        let ids = ids
            .iter()
            .map(|id| id.parse::<EntryId>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.state();
        let Some(group_state) = state
            .streams
            .get_mut(stream)
            .and_then(|log| log.groups.get_mut(group))
        else {
            return Ok(0);
        };
        Ok(ids
            .iter()
            .filter(|id| group_state.pending.remove(*id).is_some())
            .count() as u64)
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64, EventError> {
        self.count();
        self.state()
            .streams
            .get(stream)
            .and_then(|log| log.groups.get(group))
            .map(|group_state| group_state.pending.len() as u64)
            .ok_or_else(|| no_group("xpending", stream, group))
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    type Broker = InMemoryBroker;

    async fn connect(&self) -> Result<Self::Broker, EventError> {
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        Ok(self.clone())
    }

    fn target(&self) -> String {
        "in-memory".to_string()
    }
}
