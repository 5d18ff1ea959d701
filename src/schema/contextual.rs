//! `contextual.events` - changes to the context a venture's generators read from.

use serde::{Deserialize, Serialize};

use super::{EventKind, EventPayload, EventType, ValidationIssues};

/// Published when a venture's context documents change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextUpdated {
    pub venture_id: String,
    /// Where the change came from, e.g. `questionnaire` or `file:f-12`.
    pub source: String,
    /// Context keys that changed.
    pub keys: Vec<String>,
}

impl ContextUpdated {
    pub fn new<I, S>(venture_id: impl Into<String>, source: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            venture_id: venture_id.into(),
            source: source.into(),
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl EventKind for ContextUpdated {
    const TYPE: EventType = EventType::ContextUpdated;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.venture_id", &self.venture_id);
        issues.require_non_empty("data.source", &self.source);
        if self.keys.is_empty() {
            issues.push("data.keys", "must name at least one key");
        }
        for (index, key) in self.keys.iter().enumerate() {
            issues.require_non_empty(&format!("data.keys[{index}]"), key);
        }
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::ContextUpdated(self)
    }
}
