//! `user.events` - account lifecycle.

use serde::{Deserialize, Serialize};

use super::{EventKind, EventPayload, EventType, ValidationIssues};

/// Billing tier a user is subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Starter,
    Pro,
    Enterprise,
}

/// Published once a new account exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub user_id: String,
    pub email: String,
    pub tier: SubscriptionTier,
}

impl UserRegistered {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, tier: SubscriptionTier) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            tier,
        }
    }
}

impl EventKind for UserRegistered {
    const TYPE: EventType = EventType::UserRegistered;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.user_id", &self.user_id);
        issues.require_email("data.email", &self.email);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::UserRegistered(self)
    }
}

/// Published when billing moves a user to another tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTierChanged {
    pub user_id: String,
    pub previous_tier: SubscriptionTier,
    pub new_tier: SubscriptionTier,
}

impl UserTierChanged {
    pub fn new(
        user_id: impl Into<String>,
        previous_tier: SubscriptionTier,
        new_tier: SubscriptionTier,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            previous_tier,
            new_tier,
        }
    }
}

impl EventKind for UserTierChanged {
    const TYPE: EventType = EventType::UserTierChanged;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.user_id", &self.user_id);
        if self.previous_tier == self.new_tier {
            issues.push("data.new_tier", "must differ from previous_tier");
        }
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::UserTierChanged(self)
    }
}

/// Published after an account is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl UserDeleted {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl EventKind for UserDeleted {
    const TYPE: EventType = EventType::UserDeleted;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.user_id", &self.user_id);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::UserDeleted(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Stream;

    #[test]
    fn registered_factory_pins_routing() {
        let event = UserRegistered::new("u-42", "grace@example.com", SubscriptionTier::Starter)
            .into_event();

        assert_eq!(event.stream(), Stream::User);
        assert_eq!(event.event_type(), EventType::UserRegistered);
        assert_eq!(event.version(), 1);
    }

    #[test]
    fn registered_rejects_bad_email_and_blank_id() {
        let issues = UserRegistered::new(" ", "not-an-email", SubscriptionTier::Free)
            .into_payload()
            .validate();

        assert!(issues.has_path("data.user_id"));
        assert!(issues.has_path("data.email"));
    }

    #[test]
    fn tier_change_must_change_tier() {
        let same = UserTierChanged::new("u-1", SubscriptionTier::Pro, SubscriptionTier::Pro);
        assert!(same.into_payload().validate().has_path("data.new_tier"));

        let upgrade =
            UserTierChanged::new("u-1", SubscriptionTier::Pro, SubscriptionTier::Enterprise);
        assert!(upgrade.into_payload().validate().is_empty());
    }

    #[test]
    fn deleted_reason_is_optional_on_the_wire() {
        let parsed: UserDeleted = serde_json::from_str(r#"{"user_id":"u-9"}"#).unwrap();
        assert_eq!(parsed, UserDeleted::new("u-9"));
        assert_eq!(
            serde_json::to_string(&UserDeleted::new("u-9")).unwrap(),
            r#"{"user_id":"u-9"}"#
        );
    }
}
