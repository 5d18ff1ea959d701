//! Event client: connection lifecycle, publishing and consumer-group access.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use super::broker::{Connector, GroupCreation, StartId, StreamBroker};
use crate::codec;
use crate::config::WaitOptions;
use crate::error::EventError;
use crate::event::{Event, EventDraft};
use crate::health::HealthStatus;
use crate::schema::{EventKind, Stream};

/// An entry delivered to a group reader.
///
/// `event` is an error when the entry could not be decoded. The entry is
/// still pending in the group; acknowledging it is the caller's decision.
#[derive(Debug)]
pub struct Delivery {
    pub message_id: String,
    pub event: Result<Event, EventError>,
}

/// Handle to the event bus. Construct one per process and share it.
///
/// Nothing is opened until [`connect`](Self::connect). Every operation that
/// needs the broker fails with [`EventError::NotConnected`] before doing any
/// I/O when called on a disconnected client.
pub struct EventClient<C: Connector> {
    connector: C,
    broker: RwLock<Option<Arc<C::Broker>>>,
    wait_options: WaitOptions,
}

impl<C: Connector> EventClient<C> {
    /// Create a disconnected client for `connector`.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            broker: RwLock::new(None),
            wait_options: WaitOptions::default(),
        }
    }

    /// Replace the polling options used by correlation waits.
    pub fn with_wait_options(mut self, options: WaitOptions) -> Self {
        self.wait_options = options;
        self
    }

    /// The connector the client opens brokers with.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Polling options used by correlation waits.
    pub fn wait_options(&self) -> WaitOptions {
        self.wait_options
    }

    /// Open the broker connection. Calling it again while connected is a
    /// no-op.
    #[instrument(skip(self), fields(target = %self.connector.target()))]
    pub async fn connect(&self) -> Result<(), EventError> {
        let mut slot = self.broker.write().await;
        if slot.is_some() {
            debug!("Event client already connected");
            return Ok(());
        }

        let broker = self.connector.connect().await?;
        *slot = Some(Arc::new(broker));
        info!("Event client connected");
        Ok(())
    }

    /// Release the broker connection. Calling it while disconnected is a
    /// no-op. Operations already in flight keep their connection until they
    /// finish.
    #[instrument(skip(self), fields(target = %self.connector.target()))]
    pub async fn disconnect(&self) {
        if self.broker.write().await.take().is_some() {
            info!("Event client disconnected");
        }
    }

    /// Whether a broker connection is held.
    pub async fn is_connected(&self) -> bool {
        self.broker.read().await.is_some()
    }

    /// The live broker, or `NotConnected`.
    pub(crate) async fn broker(&self) -> Result<Arc<C::Broker>, EventError> {
        self.broker
            .read()
            .await
            .clone()
            .ok_or(EventError::NotConnected)
    }

    /// Connection state plus ping round trip.
    pub async fn health(&self) -> HealthStatus {
        let Ok(broker) = self.broker().await else {
            return HealthStatus::disconnected();
        };

        let started = Instant::now();
        let latency = match broker.ping().await {
            Ok(()) => Some(started.elapsed()),
            Err(e) => {
                warn!(error = %e, "Broker ping failed");
                None
            }
        };
        HealthStatus {
            connected: true,
            latency,
        }
    }

    /// Append an event to its stream and return the broker-assigned id.
    ///
    /// The payload's semantic rules are checked first; a failing event is
    /// rejected with [`EventError::SchemaValidation`] and nothing is written.
    /// Never retries.
    #[instrument(skip(self, event), fields(
        stream = %event.stream(),
        event_type = %event.event_type(),
        event_id = %event.id()
    ))]
    pub async fn publish(&self, event: &Event) -> Result<String, EventError> {
        let broker = self.broker().await?;

        let mut issues = event.payload().validate();
        let current = event.event_type().current_version();
        if !(1..=current).contains(&event.version()) {
            issues.push(
                "version",
                format!("must be in 1..={current}, got {}", event.version()),
            );
        }
        if !issues.is_empty() {
            return Err(EventError::SchemaValidation {
                event_type: event.event_type().to_string(),
                issues,
            });
        }

        let record = codec::encode(event)?;
        let message_id = broker.append(event.stream().as_str(), &record).await?;

        debug!(message_id = %message_id, "Event published");
        Ok(message_id)
    }

    /// Publish events one after another, stopping at the first failure.
    pub async fn publish_batch(&self, events: &[Event]) -> Result<Vec<String>, EventError> {
        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            ids.push(self.publish(event).await?);
        }
        Ok(ids)
    }

    /// Build an event from a bare payload and publish it.
    pub async fn emit<E: EventKind>(&self, payload: E) -> Result<String, EventError> {
        self.publish(&payload.into_event()).await
    }

    /// Build an event from a draft and publish it.
    pub async fn emit_with(&self, draft: EventDraft) -> Result<String, EventError> {
        self.publish(&draft.build()).await
    }

    /// Number of entries currently in `stream`.
    pub async fn stream_len(&self, stream: Stream) -> Result<u64, EventError> {
        self.broker().await?.stream_len(stream.as_str()).await
    }

    /// Create a consumer group. An existing group is left as it is.
    #[instrument(skip(self), fields(stream = %stream))]
    pub async fn create_group(
        &self,
        stream: Stream,
        group: &str,
        start: &StartId,
    ) -> Result<GroupCreation, EventError> {
        let broker = self.broker().await?;
        let created = broker.create_group(stream.as_str(), group, start).await?;
        match created {
            GroupCreation::Created => info!(start = %start, "Consumer group created"),
            GroupCreation::AlreadyExists => debug!("Consumer group already exists"),
        }
        Ok(created)
    }

    /// Read new entries for `consumer`, blocking up to `block`. An empty
    /// result means nothing arrived in time.
    pub async fn read_group(
        &self,
        stream: Stream,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>, EventError> {
        let broker = self.broker().await?;
        self.read_from(broker.as_ref(), stream, group, consumer, count, block)
            .await
    }

    /// Open a broker connection of its own for long blocking reads.
    ///
    /// Fails with `NotConnected` when the client is disconnected.
    pub(crate) async fn open_reader(&self) -> Result<C::Broker, EventError> {
        self.broker().await?;
        let reader = self.connector.connect().await?;
        debug!(broker = %self.connector.target(), "Opened dedicated reader");
        Ok(reader)
    }

    /// Group read over a connection from [`open_reader`](Self::open_reader).
    /// Still fails with `NotConnected` once the client is disconnected.
    pub(crate) async fn read_on(
        &self,
        reader: &C::Broker,
        stream: Stream,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>, EventError> {
        self.broker().await?;
        self.read_from(reader, stream, group, consumer, count, block)
            .await
    }

    #[instrument(skip(self, broker), fields(stream = %stream))]
    async fn read_from(
        &self,
        broker: &C::Broker,
        stream: Stream,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>, EventError> {
        let entries = broker
            .read_group(stream.as_str(), group, consumer, count, block)
            .await?;

        if !entries.is_empty() {
            debug!(count = entries.len(), "Read entries");
        }

        Ok(entries
            .into_iter()
            .map(|entry| {
                let event = codec::decode(&entry.record);
                if let Err(e) = &event {
                    error!(message_id = %entry.id, error = %e, "Malformed stream entry");
                }
                Delivery {
                    message_id: entry.id,
                    event,
                }
            })
            .collect())
    }

    /// Acknowledge entries; returns how many were pending.
    #[instrument(skip(self, ids), fields(stream = %stream, count = ids.len()))]
    pub async fn ack(&self, stream: Stream, group: &str, ids: &[String]) -> Result<u64, EventError> {
        let acked = self.broker().await?.ack(stream.as_str(), group, ids).await?;
        debug!(acked, "Entries acknowledged");
        Ok(acked)
    }

    /// Entries delivered to `group` and not yet acknowledged.
    pub async fn pending_count(&self, stream: Stream, group: &str) -> Result<u64, EventError> {
        self.broker().await?.pending_count(stream.as_str(), group).await
    }

    /// Destroy a consumer group. Returns false if it did not exist.
    #[instrument(skip(self), fields(stream = %stream))]
    pub async fn delete_group(&self, stream: Stream, group: &str) -> Result<bool, EventError> {
        let deleted = self
            .broker()
            .await?
            .destroy_group(stream.as_str(), group)
            .await?;
        if deleted {
            info!("Consumer group deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBroker;
    use crate::schema::{SubscriptionTier, UserRegistered, UserTierChanged};

    fn client() -> (EventClient<InMemoryBroker>, InMemoryBroker) {
        let broker = InMemoryBroker::new();
        (EventClient::new(broker.clone()), broker)
    }

    #[tokio::test]
    async fn publish_before_connect_does_no_io() {
        let (client, broker) = client();
        let event = UserRegistered::new("u-1", "ada@example.com", SubscriptionTier::Free).into_event();

        assert!(matches!(
            client.publish(&event).await,
            Err(EventError::NotConnected)
        ));
        assert!(matches!(
            client.stream_len(Stream::User).await,
            Err(EventError::NotConnected)
        ));
        assert_eq!(broker.operations(), 0);
    }

    #[tokio::test]
    async fn publish_appends_to_the_bound_stream() {
        let (client, broker) = client();
        client.connect().await.unwrap();

        let event = UserRegistered::new("u-1", "ada@example.com", SubscriptionTier::Pro).into_event();
        let id = client.publish(&event).await.unwrap();

        let entries = broker.entries("user.events");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(codec::decode(&entries[0].record).unwrap(), event);
    }

    #[tokio::test]
    async fn invalid_payload_is_not_written() {
        let (client, broker) = client();
        client.connect().await.unwrap();

        let same_tier = UserTierChanged::new("u-1", SubscriptionTier::Pro, SubscriptionTier::Pro);
        let err = client.emit(same_tier).await.unwrap_err();

        assert!(matches!(err, EventError::SchemaValidation { .. }));
        assert!(broker.entries("user.events").is_empty());
    }

    #[tokio::test]
    async fn connect_and_disconnect_are_idempotent() {
        let (client, _) = client();
        client.connect().await.unwrap();
        client.connect().await.unwrap();
        assert!(client.is_connected().await);

        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected().await);
        assert_eq!(client.health().await, HealthStatus::disconnected());
    }

    #[tokio::test]
    async fn health_pings_when_connected() {
        let (client, _) = client();
        client.connect().await.unwrap();
        assert!(client.health().await.is_healthy());
    }
}
