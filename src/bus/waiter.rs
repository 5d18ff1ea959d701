//! Correlation waiter: wait for the reply event carrying a given
//! correlation id, on top of an ephemeral consumer group.
//!
//! ```text
//! wait_for_event ──► group created at tail ──► POLLING ─┬─► MATCHED
//!                                                       ├─► TIMED_OUT
//!                                                       ├─► CANCELLED
//!                                                       └─► ERROR
//!                                 (group destroyed on every exit)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn, Instrument, Span};
use ulid::Ulid;

use super::broker::{deadline_after, Connector, StartId, StreamBroker};
use super::client::EventClient;
use crate::codec;
use crate::config::WaitOptions;
use crate::error::EventError;
use crate::event::Event;
use crate::schema::{EventType, Stream};

impl<C: Connector> EventClient<C> {
    /// Start waiting for the `event_type` event on `stream` whose
    /// correlation id equals `correlation_id`.
    ///
    /// The waiter's group is positioned at the stream tail before this
    /// returns: every event appended afterwards is seen, nothing appended
    /// before is. Await the returned [`EventWait`] for the outcome.
    #[instrument(skip(self), fields(stream = %stream, event_type = %event_type))]
    pub async fn wait_for_event(
        &self,
        stream: Stream,
        event_type: EventType,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<EventWait, EventError> {
        self.broker().await?;
        if event_type.stream() != stream {
            return Err(EventError::StreamMismatch {
                event_type: event_type.to_string(),
                expected: event_type.stream().to_string(),
                actual: stream.to_string(),
            });
        }

        let broker = Arc::new(self.open_reader().await?);
        let group = format!("waiter-{}", Ulid::new());
        broker
            .create_group(stream.as_str(), &group, &StartId::Tail)
            .await?;
        debug!(group = %group, "Waiter registered");

        let target = WaitTarget {
            stream,
            event_type,
            correlation_id: correlation_id.to_string(),
            group: group.clone(),
            timeout,
            options: self.wait_options(),
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            run_wait(broker, target, cancel.clone()).instrument(Span::current()),
        );

        Ok(EventWait {
            group,
            cancel,
            task,
        })
    }

    /// Publish `event` and wait for its `reply` type.
    ///
    /// The reply is matched on the request's correlation id; a request
    /// without one is correlated by its own id. The wait is registered
    /// before publishing, so a fast reply cannot be missed.
    #[instrument(skip(self, event), fields(event_type = %event.event_type(), reply = %reply))]
    pub async fn request(
        &self,
        event: Event,
        reply: EventType,
        timeout: Duration,
    ) -> Result<Event, EventError> {
        let event = match event.correlation_id() {
            Some(_) => event,
            None => {
                let id = event.id().to_string();
                event.with_correlation_id(id)
            }
        };
        let correlation_id = event.correlation_id().unwrap_or_default().to_string();

        let wait = self
            .wait_for_event(reply.stream(), reply, &correlation_id, timeout)
            .await?;
        self.publish(&event).await?;
        wait.await
    }
}

/// A pending correlation wait.
///
/// Resolves to the matching event, [`EventError::Timeout`],
/// [`EventError::Cancelled`] or the broker failure that ended it. Dropping
/// it cancels the wait; the ephemeral group is removed in every case.
pub struct EventWait {
    group: String,
    cancel: CancellationToken,
    task: JoinHandle<Result<Event, EventError>>,
}

impl EventWait {
    /// Name of the ephemeral consumer group backing this wait.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Stop waiting; the wait resolves to [`EventError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A cancel handle that can be moved elsewhere while this is awaited.
    pub fn canceller(&self) -> WaitCanceller {
        WaitCanceller(self.cancel.clone())
    }
}

impl Future for EventWait {
    type Output = Result<Event, EventError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx).map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(e) => Err(EventError::broker("wait task", e)),
        })
    }
}

impl Drop for EventWait {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Cancels an [`EventWait`] from elsewhere.
#[derive(Debug, Clone)]
pub struct WaitCanceller(CancellationToken);

impl WaitCanceller {
    /// Cancel the wait this handle came from.
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

struct WaitTarget {
    stream: Stream,
    event_type: EventType,
    correlation_id: String,
    group: String,
    timeout: Duration,
    options: WaitOptions,
}

impl WaitTarget {
    fn timed_out(&self) -> EventError {
        EventError::Timeout {
            stream: self.stream.to_string(),
            event_type: self.event_type.to_string(),
            correlation_id: self.correlation_id.clone(),
            waited: self.timeout,
        }
    }
}

async fn run_wait<B: StreamBroker>(
    broker: Arc<B>,
    target: WaitTarget,
    cancel: CancellationToken,
) -> Result<Event, EventError> {
    let outcome = watch(broker.as_ref(), &target, &cancel).await;

    match broker
        .destroy_group(target.stream.as_str(), &target.group)
        .await
    {
        Ok(_) => debug!(group = %target.group, "Waiter group removed"),
        Err(e) => warn!(group = %target.group, error = %e, "Failed to remove waiter group"),
    }

    match &outcome {
        Ok(event) => debug!(event_id = %event.id(), "Correlated event received"),
        Err(e) => debug!(error = %e, "Wait ended without a match"),
    }
    outcome
}

async fn watch<B: StreamBroker>(
    broker: &B,
    target: &WaitTarget,
    cancel: &CancellationToken,
) -> Result<Event, EventError> {
    let deadline = deadline_after(target.timeout);

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(target.timed_out());
        }
        let block = remaining.min(target.options.poll_interval.max(Duration::from_millis(1)));

        let entries = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EventError::Cancelled),
            _ = sleep_until(deadline) => return Err(target.timed_out()),
            read = broker.read_group(
                target.stream.as_str(),
                &target.group,
                &target.group,
                target.options.batch,
                block,
            ) => read?,
        };

        for entry in entries {
            match codec::decode(&entry.record) {
                Ok(event) if event.matches(target.event_type, &target.correlation_id) => {
                    return Ok(event);
                }
                Ok(_) => {}
                Err(e) => debug!(message_id = %entry.id, error = %e, "Skipping undecodable entry"),
            }
        }
    }
}
