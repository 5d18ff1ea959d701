//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use venture_events::bus::{EventClient, InMemoryBroker};
use venture_events::config::WaitOptions;
use venture_events::schema::{
    AiGenerationCompleted, AiGenerationRequested, AiTask, SubscriptionTier, UserRegistered,
};

/// Route crate logs to the test output. Set `RUST_LOG=venture_events=debug`
/// to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A connected client over a fresh in-memory broker, plus the broker for
/// inspection.
pub async fn connected() -> (Arc<EventClient<InMemoryBroker>>, InMemoryBroker) {
    init_tracing();
    let broker = InMemoryBroker::new();
    let client = EventClient::new(broker.clone())
        .with_wait_options(WaitOptions::default().with_poll_interval(Duration::from_millis(25)));
    client.connect().await.expect("in-memory connect");
    (Arc::new(client), broker)
}

pub fn registered(n: usize) -> UserRegistered {
    UserRegistered::new(
        format!("u-{n}"),
        format!("user{n}@example.com"),
        SubscriptionTier::Free,
    )
}

pub fn generation_request(request_id: &str) -> AiGenerationRequested {
    AiGenerationRequested::new(request_id, "v-1", AiTask::BusinessPlan)
}

pub fn generation_done(request_id: &str) -> AiGenerationCompleted {
    AiGenerationCompleted::new(request_id, format!("content-{request_id}"), "gpt-4o", 512)
}
