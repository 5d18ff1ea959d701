//! `system.events` - service lifecycle announcements.

use serde::{Deserialize, Serialize};

use super::{EventKind, EventPayload, EventType, ValidationIssues};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStarted {
    pub service: String,
    pub instance_id: String,
    pub version: String,
}

impl ServiceStarted {
    pub fn new(
        service: impl Into<String>,
        instance_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            instance_id: instance_id.into(),
            version: version.into(),
        }
    }
}

impl EventKind for ServiceStarted {
    const TYPE: EventType = EventType::ServiceStarted;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.service", &self.service);
        issues.require_non_empty("data.instance_id", &self.instance_id);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::ServiceStarted(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStopped {
    pub service: String,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ServiceStopped {
    pub fn new(service: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            instance_id: instance_id.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl EventKind for ServiceStopped {
    const TYPE: EventType = EventType::ServiceStopped;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.service", &self.service);
        issues.require_non_empty("data.instance_id", &self.instance_id);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::ServiceStopped(self)
    }
}
