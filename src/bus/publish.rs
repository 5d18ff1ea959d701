//! One typed publish method per catalog event.

use super::broker::Connector;
use super::client::EventClient;
use crate::error::EventError;
use crate::schema::{
    AiGenerationCompleted, AiGenerationFailed, AiGenerationRequested, ContentGenerated,
    ContextUpdated, FileUploaded, MarketAnalysisCompleted, MarketDataCollected,
    NotificationDelivered, NotificationRequested, ServiceStarted, ServiceStopped, UserDeleted,
    UserRegistered, UserTierChanged,
};

macro_rules! typed_publishers {
    ($($method:ident => $payload:ty, $tag:literal;)+) => {
        impl<C: Connector> EventClient<C> {
            $(
                #[doc = concat!("Publish a `", $tag, "` event. Returns the broker id.")]
                pub async fn $method(&self, data: $payload) -> Result<String, EventError> {
                    self.emit(data).await
                }
            )+
        }
    };
}

typed_publishers! {
    publish_user_registered => UserRegistered, "user.registered";
    publish_user_tier_changed => UserTierChanged, "user.tier_changed";
    publish_user_deleted => UserDeleted, "user.deleted";
    publish_file_uploaded => FileUploaded, "file.uploaded";
    publish_content_generated => ContentGenerated, "content.generated";
    publish_context_updated => ContextUpdated, "context.updated";
    publish_market_data_collected => MarketDataCollected, "market.data_collected";
    publish_market_analysis_completed => MarketAnalysisCompleted, "market.analysis_completed";
    publish_ai_generation_requested => AiGenerationRequested, "ai.generation_requested";
    publish_ai_generation_completed => AiGenerationCompleted, "ai.generation_completed";
    publish_ai_generation_failed => AiGenerationFailed, "ai.generation_failed";
    publish_notification_requested => NotificationRequested, "notification.requested";
    publish_notification_delivered => NotificationDelivered, "notification.delivered";
    publish_service_started => ServiceStarted, "system.service_started";
    publish_service_stopped => ServiceStopped, "system.service_stopped";
}

#[cfg(test)]
mod tests {
    use crate::bus::{EventClient, InMemoryBroker};
    use crate::codec;
    use crate::schema::*;

    #[tokio::test]
    async fn each_method_routes_to_its_stream() {
        let broker = InMemoryBroker::new();
        let client = EventClient::new(broker.clone());
        client.connect().await.unwrap();

        client
            .publish_user_registered(UserRegistered::new("u-1", "a@b.co", SubscriptionTier::Free))
            .await
            .unwrap();
        client
            .publish_file_uploaded(FileUploaded::new(
                "f-1",
                "u-1",
                "deck.pdf",
                "application/pdf",
                2048,
                "uploads/f-1",
            ))
            .await
            .unwrap();
        client
            .publish_context_updated(ContextUpdated::new("v-1", "interview", ["audience"]))
            .await
            .unwrap();
        client
            .publish_ai_generation_failed(AiGenerationFailed::new("r-1", "quota", true))
            .await
            .unwrap();
        client
            .publish_service_started(ServiceStarted::new("ai-worker", "i-1", "1.4.0"))
            .await
            .unwrap();

        for (stream, event_type) in [
            ("user.events", EventType::UserRegistered),
            ("content.events", EventType::FileUploaded),
            ("contextual.events", EventType::ContextUpdated),
            ("ai.events", EventType::AiGenerationFailed),
            ("system.events", EventType::ServiceStarted),
        ] {
            let entries = broker.entries(stream);
            assert_eq!(entries.len(), 1, "{stream}");
            let event = codec::decode(&entries[0].record).unwrap();
            assert_eq!(event.event_type(), event_type);
        }
        assert!(broker.entries("market.events").is_empty());
    }
}
