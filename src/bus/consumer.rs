//! Supervised consumer-group loop: read, decode, handle, acknowledge.
//!
//! ```ignore
//! let client = Arc::new(EventClient::new(RedisConfig::from_env()?));
//! client.connect().await?;
//!
//! let handle = GroupConsumer::new(client.clone(), Stream::Ai, "ai-workers", "worker-1", GenerateContent)
//!     .with_options(ConsumerOptions::default().with_start(StartId::Beginning))
//!     .spawn();
//!
//! // on shutdown
//! let stats = handle.stop().await?;
//! ```

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::broker::{Connector, GroupCreation};
use super::client::{Delivery, EventClient};
use crate::config::ConsumerOptions;
use crate::error::EventError;
use crate::event::Event;
use crate::schema::Stream;

/// Error returned by an [`EventHandler`].
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Processes events delivered to a consumer group.
///
/// Returning `Ok` acknowledges the entry. Returning an error leaves it
/// pending in the group.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Counters from a consumer loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Events handled and acknowledged.
    pub handled: usize,
    /// Events whose handler failed; left pending.
    pub failed: usize,
    /// Entries that could not be decoded; left pending.
    pub malformed: usize,
    /// Reads issued.
    pub polls: usize,
}

/// One named consumer in a group, bound to a handler.
pub struct GroupConsumer<C: Connector, H> {
    client: Arc<EventClient<C>>,
    stream: Stream,
    group: String,
    consumer: String,
    handler: Arc<H>,
    options: ConsumerOptions,
}

impl<C: Connector, H: EventHandler> GroupConsumer<C, H> {
    /// Bind `handler` to `consumer` in `group` on `stream`.
    pub fn new(
        client: Arc<EventClient<C>>,
        stream: Stream,
        group: impl Into<String>,
        consumer: impl Into<String>,
        handler: H,
    ) -> Self {
        Self {
            client,
            stream,
            group: group.into(),
            consumer: consumer.into(),
            handler: Arc::new(handler),
            options: ConsumerOptions::default(),
        }
    }

    /// Replace the read and start options.
    pub fn with_options(mut self, options: ConsumerOptions) -> Self {
        self.options = options;
        self
    }

    /// Stream this consumer reads.
    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Consumer group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Consumer name within the group.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Make sure the group exists, starting at the configured position.
    pub async fn prepare(&self) -> Result<GroupCreation, EventError> {
        self.client
            .create_group(self.stream, &self.group, &self.options.start)
            .await
    }

    /// One read plus handling of whatever it returned. Returns the number of
    /// entries delivered.
    pub async fn poll_once(&self, stats: &mut ConsumerStats) -> Result<usize, EventError> {
        stats.polls += 1;
        let deliveries = self
            .client
            .read_group(
                self.stream,
                &self.group,
                &self.consumer,
                self.options.count,
                self.options.block,
            )
            .await?;
        let delivered = deliveries.len();
        self.dispatch(deliveries, stats).await?;
        Ok(delivered)
    }

    /// Run until `shutdown` fires or the broker fails.
    ///
    /// Shutdown is honoured between reads and while a read is blocked; an
    /// event already being handled is finished first. Reads go over a
    /// connection of the loop's own, so consumers sharing a client never
    /// wait on each other's blocking reads.
    #[instrument(skip(self, shutdown), fields(
        stream = %self.stream,
        group = %self.group,
        consumer = %self.consumer
    ))]
    pub async fn run(self, shutdown: CancellationToken) -> Result<ConsumerStats, EventError> {
        self.prepare().await?;
        let reader = self.client.open_reader().await?;
        info!("Starting consumer loop");

        let mut stats = ConsumerStats::default();
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            stats.polls += 1;
            let deliveries = tokio::select! {
                _ = shutdown.cancelled() => break,
                read = self.read(&reader) => read,
            };

            let outcome = match deliveries {
                Ok(deliveries) => self.dispatch(deliveries, &mut stats).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                error!(error = %e, "Consumer loop stopped by broker failure");
                return Err(e);
            }
        }

        info!(
            handled = stats.handled,
            failed = stats.failed,
            malformed = stats.malformed,
            "Consumer loop ended"
        );
        Ok(stats)
    }

    /// Run on a background task.
    pub fn spawn(self) -> ConsumerHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        ConsumerHandle {
            shutdown,
            task: Some(task),
        }
    }

    async fn read(&self, reader: &C::Broker) -> Result<Vec<Delivery>, EventError> {
        self.client
            .read_on(
                reader,
                self.stream,
                &self.group,
                &self.consumer,
                self.options.count,
                self.options.block,
            )
            .await
    }

    async fn dispatch(
        &self,
        deliveries: Vec<Delivery>,
        stats: &mut ConsumerStats,
    ) -> Result<(), EventError> {
        for delivery in deliveries {
            let event = match delivery.event {
                Ok(event) => event,
                Err(_) => {
                    // Already logged by the client; stays pending for inspection.
                    stats.malformed += 1;
                    continue;
                }
            };

            match self.handler.handle(&event).await {
                Ok(()) => {
                    self.client
                        .ack(self.stream, &self.group, &[delivery.message_id])
                        .await?;
                    stats.handled += 1;
                }
                Err(e) => {
                    warn!(
                        message_id = %delivery.message_id,
                        event_type = %event.event_type(),
                        error = %e,
                        "Handler failed, entry left pending"
                    );
                    stats.failed += 1;
                }
            }
        }
        debug!(handled = stats.handled, failed = stats.failed, "Dispatched batch");
        Ok(())
    }
}

/// Handle to a background consumer. Drop or call [`stop`](Self::stop) to
/// shut it down.
pub struct ConsumerHandle {
    shutdown: CancellationToken,
    task: Option<JoinHandle<Result<ConsumerStats, EventError>>>,
}

impl ConsumerHandle {
    /// Stop the consumer and wait for it to finish. Returns its stats, or
    /// the broker failure that ended it.
    pub async fn stop(mut self) -> Result<ConsumerStats, EventError> {
        self.shutdown.cancel();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| EventError::broker("consumer task", e))?,
            None => Ok(ConsumerStats::default()),
        }
    }

    /// Signal stop without waiting.
    pub fn signal_stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether the loop has ended, by stop or by failure.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryBroker, StartId};
    use crate::schema::{EventKind, EventType, UserDeleted};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails user.deleted events published by user "bad".
    #[derive(Default)]
    struct Picky {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Picky {
        async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if event.event_type() == EventType::UserDeleted && event.user_id() == Some("bad") {
                return Err("refused".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn poll_once_acks_only_handled_events() {
        let client = Arc::new(EventClient::new(InMemoryBroker::new()));
        client.connect().await.unwrap();

        let consumer = GroupConsumer::new(client.clone(), Stream::User, "audit", "a-1", Picky::default())
            .with_options(
                ConsumerOptions::default()
                    .with_start(StartId::Beginning)
                    .with_block(Duration::ZERO),
            );
        consumer.prepare().await.unwrap();

        client.emit(UserDeleted::new("u-1")).await.unwrap();
        client
            .emit_with(UserDeleted::new("u-2").draft().user_id("bad"))
            .await
            .unwrap();

        let mut stats = ConsumerStats::default();
        assert_eq!(consumer.poll_once(&mut stats).await.unwrap(), 2);
        assert_eq!(stats.handled, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.polls, 1);
        assert_eq!(client.pending_count(Stream::User, "audit").await.unwrap(), 1);

        assert_eq!(consumer.poll_once(&mut stats).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn handle_stops_the_loop() {
        let client = Arc::new(EventClient::new(InMemoryBroker::new()));
        client.connect().await.unwrap();

        let handle = GroupConsumer::new(client.clone(), Stream::User, "audit", "a-1", Picky::default())
            .with_options(ConsumerOptions::default().with_block(Duration::from_secs(30)))
            .spawn();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        // Blocked in a 30s read; stop must not wait for it.
        let stats = tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("stop returned promptly")
            .unwrap();
        assert_eq!(stats.handled, 0);
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn each_running_consumer_reads_on_its_own_connection() {
        let broker = InMemoryBroker::new();
        let client = Arc::new(EventClient::new(broker.clone()));
        client.connect().await.unwrap();
        assert_eq!(broker.connections(), 1);

        let parked = ConsumerOptions::default().with_block(Duration::from_secs(30));
        let users = Arc::new(AtomicUsize::new(0));
        let audit = GroupConsumer::new(client.clone(), Stream::User, "audit", "a-1", Counting(users.clone()))
            .with_options(parked.clone())
            .spawn();
        let ai = GroupConsumer::new(client.clone(), Stream::Ai, "ai-workers", "w-1", Picky::default())
            .with_options(parked)
            .spawn();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while broker.connections() < 3 || broker.groups("user.events").is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "consumers never started");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(broker.connections(), 3);

        // Both loops sit in 30s reads; the user event still arrives promptly.
        client.emit(UserDeleted::new("u-1")).await.unwrap();
        while users.load(Ordering::SeqCst) == 0 {
            assert!(tokio::time::Instant::now() < deadline, "delivery held up");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(audit.stop().await.unwrap().handled, 1);
        assert_eq!(ai.stop().await.unwrap().handled, 0);
    }

    #[tokio::test]
    async fn loop_ends_when_the_client_disconnects() {
        let client = Arc::new(EventClient::new(InMemoryBroker::new()));
        client.connect().await.unwrap();

        let handle = GroupConsumer::new(client.clone(), Stream::User, "audit", "a-1", Picky::default())
            .with_options(ConsumerOptions::default().with_block(Duration::from_millis(10)))
            .spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;
        client.disconnect().await;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() {
            assert!(tokio::time::Instant::now() < deadline, "loop kept running");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(handle.stop().await, Err(EventError::NotConnected)));
    }

    #[tokio::test]
    async fn broker_failure_ends_the_loop() {
        let client = Arc::new(EventClient::new(InMemoryBroker::new()));
        client.connect().await.unwrap();

        let consumer = GroupConsumer::new(client.clone(), Stream::User, "audit", "a-1", Picky::default())
            .with_options(ConsumerOptions::default().with_block(Duration::from_millis(10)));
        let handle = consumer.spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Pulling the group out from under the reader makes the next read fail.
        client.delete_group(Stream::User, "audit").await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() {
            assert!(tokio::time::Instant::now() < deadline, "loop kept running");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(handle.stop().await.unwrap_err().is_broker_failure());
    }
}
