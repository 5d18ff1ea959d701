//! `notification.events` - fan-out to the notification workers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EventKind, EventPayload, EventType, ValidationIssues};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    InApp,
    Push,
    Sms,
}

/// Ask the notification workers to render `template` for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequested {
    pub user_id: String,
    pub channel: NotificationChannel,
    pub template: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
}

impl NotificationRequested {
    pub fn new(
        user_id: impl Into<String>,
        channel: NotificationChannel,
        template: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            channel,
            template: template.into(),
            variables: Map::new(),
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

impl EventKind for NotificationRequested {
    const TYPE: EventType = EventType::NotificationRequested;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.user_id", &self.user_id);
        issues.require_non_empty("data.template", &self.template);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::NotificationRequested(self)
    }
}

/// Published by a worker after the provider accepted the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDelivered {
    pub notification_id: String,
    pub user_id: String,
    pub channel: NotificationChannel,
}

impl NotificationDelivered {
    pub fn new(
        notification_id: impl Into<String>,
        user_id: impl Into<String>,
        channel: NotificationChannel,
    ) -> Self {
        Self {
            notification_id: notification_id.into(),
            user_id: user_id.into(),
            channel,
        }
    }
}

impl EventKind for NotificationDelivered {
    const TYPE: EventType = EventType::NotificationDelivered;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.notification_id", &self.notification_id);
        issues.require_non_empty("data.user_id", &self.user_id);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::NotificationDelivered(self)
    }
}
