//! `ai.events` - generation requests and their outcomes.
//!
//! Requests and replies are paired by the envelope's `correlation_id`;
//! `request_id` is the AI worker's own bookkeeping key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EventKind, EventPayload, EventType, ValidationIssues};

/// What the worker is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiTask {
    BusinessPlan,
    PitchDeck,
    MarketAnalysis,
    MarketingCopy,
    FinancialModel,
}

/// Published by the core API to ask an AI worker for content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiGenerationRequested {
    pub request_id: String,
    pub venture_id: String,
    pub task: AiTask,
    /// Task-specific inputs, passed through to the prompt builder untouched.
    #[serde(default)]
    pub context: Value,
}

impl AiGenerationRequested {
    pub fn new(request_id: impl Into<String>, venture_id: impl Into<String>, task: AiTask) -> Self {
        Self {
            request_id: request_id.into(),
            venture_id: venture_id.into(),
            task,
            context: Value::Null,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

impl EventKind for AiGenerationRequested {
    const TYPE: EventType = EventType::AiGenerationRequested;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.request_id", &self.request_id);
        issues.require_non_empty("data.venture_id", &self.venture_id);
        if !(self.context.is_null() || self.context.is_object()) {
            issues.push("data.context", "must be an object when present");
        }
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::AiGenerationRequested(self)
    }
}

/// Published by the worker once content is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiGenerationCompleted {
    pub request_id: String,
    pub content_id: String,
    pub model: String,
    pub tokens_used: u32,
}

impl AiGenerationCompleted {
    pub fn new(
        request_id: impl Into<String>,
        content_id: impl Into<String>,
        model: impl Into<String>,
        tokens_used: u32,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            content_id: content_id.into(),
            model: model.into(),
            tokens_used,
        }
    }
}

impl EventKind for AiGenerationCompleted {
    const TYPE: EventType = EventType::AiGenerationCompleted;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.request_id", &self.request_id);
        issues.require_non_empty("data.content_id", &self.content_id);
        issues.require_non_empty("data.model", &self.model);
        issues.require_positive("data.tokens_used", u64::from(self.tokens_used));
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::AiGenerationCompleted(self)
    }
}

/// Published by the worker when a request cannot be fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiGenerationFailed {
    pub request_id: String,
    pub error: String,
    /// Whether re-issuing the same request may succeed.
    pub retryable: bool,
}

impl AiGenerationFailed {
    pub fn new(request_id: impl Into<String>, error: impl Into<String>, retryable: bool) -> Self {
        Self {
            request_id: request_id.into(),
            error: error.into(),
            retryable,
        }
    }
}

impl EventKind for AiGenerationFailed {
    const TYPE: EventType = EventType::AiGenerationFailed;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.request_id", &self.request_id);
        issues.require_non_empty("data.error", &self.error);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::AiGenerationFailed(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_is_snake_case() {
        assert_eq!(
            serde_json::to_value(AiTask::BusinessPlan).unwrap(),
            json!("business_plan")
        );
    }

    #[test]
    fn request_context_defaults_to_null() {
        let parsed: AiGenerationRequested = serde_json::from_value(json!({
            "request_id": "r-1",
            "venture_id": "v-1",
            "task": "pitch_deck"
        }))
        .unwrap();

        assert_eq!(parsed.context, Value::Null);
        assert!(parsed.into_payload().validate().is_empty());
    }

    #[test]
    fn request_context_must_be_an_object() {
        let request = AiGenerationRequested::new("r-1", "v-1", AiTask::MarketingCopy)
            .with_context(json!(["not", "an", "object"]));

        assert!(request.into_payload().validate().has_path("data.context"));
    }

    #[test]
    fn completion_needs_tokens() {
        let done = AiGenerationCompleted::new("r-1", "c-1", "gpt-4o", 0);
        assert!(done.into_payload().validate().has_path("data.tokens_used"));
    }
}
