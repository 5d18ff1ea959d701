//! Correlated request/response on top of ephemeral consumer groups.

mod support;

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use venture_events::schema::{EventKind, EventType, Stream};
use venture_events::EventError;

use support::{connected, generation_done, generation_request, registered};

#[tokio::test]
async fn resolves_with_the_matching_event() {
    let (client, _) = connected().await;

    let wait = client
        .wait_for_event(
            Stream::Ai,
            EventType::AiGenerationCompleted,
            "job-7",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    let reply = generation_done("r-7").draft().correlation_id("job-7").build();
    client.publish(&reply).await.unwrap();

    assert_eq!(wait.await.unwrap(), reply);
}

#[tokio::test]
async fn ignores_other_types_and_correlations() {
    let (client, _) = connected().await;

    let wait = client
        .wait_for_event(
            Stream::Ai,
            EventType::AiGenerationCompleted,
            "job-1",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    // Same correlation, wrong type.
    client
        .emit_with(generation_request("r-1").draft().correlation_id("job-1"))
        .await
        .unwrap();
    // Right type, other correlation.
    client
        .emit_with(generation_done("r-2").draft().correlation_id("job-2"))
        .await
        .unwrap();
    // Right type, no correlation.
    client.emit(generation_done("r-3")).await.unwrap();

    let wanted = generation_done("r-1").draft().correlation_id("job-1").build();
    client.publish(&wanted).await.unwrap();

    let got = wait.await.unwrap();
    assert_eq!(got.id(), wanted.id());
}

#[tokio::test]
async fn times_out_after_the_deadline() {
    let (client, _) = connected().await;

    let started = Instant::now();
    let wait = client
        .wait_for_event(
            Stream::Ai,
            EventType::AiGenerationCompleted,
            "never",
            Duration::from_millis(200),
        )
        .await
        .unwrap();

    let err = wait.await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "{err:?}");
    assert!(!err.is_broker_failure());
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "{elapsed:?}");
    match err {
        EventError::Timeout {
            stream,
            event_type,
            correlation_id,
            waited,
        } => {
            assert_eq!(stream, "ai.events");
            assert_eq!(event_type, "ai.generation_completed");
            assert_eq!(correlation_id, "never");
            assert_eq!(waited, Duration::from_millis(200));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_ends_the_wait_and_removes_the_group() {
    let (client, broker) = connected().await;

    let wait = client
        .wait_for_event(
            Stream::Ai,
            EventType::AiGenerationCompleted,
            "job-x",
            Duration::from_secs(30),
        )
        .await
        .unwrap();
    assert_eq!(broker.groups("ai.events").len(), 1);

    let canceller = wait.canceller();
    let started = Instant::now();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    assert!(matches!(wait.await, Err(EventError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(2));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(broker.groups("ai.events").is_empty());
}

#[tokio::test]
async fn unbounded_timeout_still_cancels_and_cleans_up() {
    let (client, broker) = connected().await;

    let wait = client
        .wait_for_event(
            Stream::Ai,
            EventType::AiGenerationCompleted,
            "forever",
            Duration::MAX,
        )
        .await
        .unwrap();
    let canceller = wait.canceller();
    let outcome = tokio::spawn(wait);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(broker.groups("ai.events").len(), 1, "wait ended early");
    canceller.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), outcome)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, Err(EventError::Cancelled)), "{outcome:?}");

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(broker.groups("ai.events").is_empty());
}

#[tokio::test]
async fn unbounded_timeout_resolves_on_match() {
    let (client, _) = connected().await;

    let wait = client
        .wait_for_event(
            Stream::Ai,
            EventType::AiGenerationCompleted,
            "job-max",
            Duration::MAX,
        )
        .await
        .unwrap();
    let reply = generation_done("r-m").draft().correlation_id("job-max").build();
    client.publish(&reply).await.unwrap();

    let got = tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.id(), reply.id());
}

#[tokio::test]
async fn dropping_the_wait_cleans_up() {
    let (client, broker) = connected().await;

    let wait = client
        .wait_for_event(
            Stream::User,
            EventType::UserRegistered,
            "signup-1",
            Duration::from_secs(30),
        )
        .await
        .unwrap();
    assert_eq!(broker.groups("user.events").len(), 1);
    drop(wait);

    let deadline = Instant::now() + Duration::from_secs(2);
    while !broker.groups("user.events").is_empty() {
        assert!(Instant::now() < deadline, "waiter group leaked");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn events_before_the_wait_are_not_seen() {
    let (client, _) = connected().await;

    client
        .emit_with(generation_done("r-1").draft().correlation_id("early"))
        .await
        .unwrap();

    let wait = client
        .wait_for_event(
            Stream::Ai,
            EventType::AiGenerationCompleted,
            "early",
            Duration::from_millis(150),
        )
        .await
        .unwrap();

    assert!(wait.await.unwrap_err().is_timeout());
}

#[tokio::test]
async fn events_right_after_registration_are_seen() {
    let (client, _) = connected().await;

    let wait = client
        .wait_for_event(
            Stream::User,
            EventType::UserRegistered,
            "signup-9",
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    // Published before the poll task has necessarily issued a read.
    client
        .emit_with(registered(9).draft().correlation_id("signup-9"))
        .await
        .unwrap();

    assert_eq!(wait.await.unwrap().correlation_id(), Some("signup-9"));
}

#[tokio::test]
async fn stream_must_match_the_type() {
    let (client, broker) = connected().await;

    let err = client
        .wait_for_event(
            Stream::User,
            EventType::AiGenerationCompleted,
            "c",
            Duration::from_secs(1),
        )
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EventError::StreamMismatch { .. }));
    assert!(broker.groups("user.events").is_empty());
}

#[tokio::test]
async fn request_round_trip() {
    let (client, _) = connected().await;

    // A worker answering every generation request.
    let worker = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .create_group(Stream::Ai, "ai-workers", &venture_events::bus::StartId::Tail)
                .await
                .unwrap();
            loop {
                let batch = client
                    .read_group(Stream::Ai, "ai-workers", "w-1", 10, Duration::from_millis(50))
                    .await
                    .unwrap();
                for delivery in batch {
                    let event = delivery.event.unwrap();
                    if event.event_type() != EventType::AiGenerationRequested {
                        continue;
                    }
                    let reply = generation_done("r-1")
                        .draft()
                        .correlation_id(event.correlation_id().unwrap())
                        .build();
                    client.publish(&reply).await.unwrap();
                    return;
                }
            }
        })
    };
    // Give the worker a moment to create its group at the tail.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let request = generation_request("r-1").into_event();
    let request_id = request.id().to_string();
    let reply = client
        .request(request, EventType::AiGenerationCompleted, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(reply.event_type(), EventType::AiGenerationCompleted);
    assert_eq!(reply.correlation_id(), Some(request_id.as_str()));
    worker.await.unwrap();
}

#[tokio::test]
async fn request_times_out_without_a_responder() {
    let (client, _) = connected().await;

    let request = generation_request("r-2")
        .draft()
        .correlation_id("lonely")
        .build();
    let err = client
        .request(request, EventType::AiGenerationCompleted, Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(matches!(err, EventError::Timeout { ref correlation_id, .. } if correlation_id == "lonely"));
    // The request itself was still published.
    assert_eq!(client.stream_len(Stream::Ai).await.unwrap(), 1);
}
