//! `content.events` - uploads and generated documents.

use serde::{Deserialize, Serialize};

use super::{EventKind, EventPayload, EventType, ValidationIssues};

/// Published after a file lands in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploaded {
    pub file_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venture_id: Option<String>,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub storage_key: String,
}

impl FileUploaded {
    pub fn new(
        file_id: impl Into<String>,
        user_id: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: u64,
        storage_key: impl Into<String>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            user_id: user_id.into(),
            venture_id: None,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size_bytes,
            storage_key: storage_key.into(),
        }
    }

    pub fn for_venture(mut self, venture_id: impl Into<String>) -> Self {
        self.venture_id = Some(venture_id.into());
        self
    }
}

impl EventKind for FileUploaded {
    const TYPE: EventType = EventType::FileUploaded;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.file_id", &self.file_id);
        issues.require_non_empty("data.user_id", &self.user_id);
        issues.require_non_empty("data.file_name", &self.file_name);
        issues.require_non_empty("data.storage_key", &self.storage_key);
        if !self.mime_type.contains('/') {
            issues.push(
                "data.mime_type",
                format!("'{}' is not a media type", self.mime_type),
            );
        }
        issues.require_positive("data.size_bytes", self.size_bytes);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::FileUploaded(self)
    }
}

/// Published when a generated document has been stored for a venture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentGenerated {
    pub content_id: String,
    pub venture_id: String,
    /// Free-form kind, e.g. `business_plan` or `landing_page`.
    pub content_kind: String,
    /// The AI request this content answers, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub word_count: u32,
}

impl ContentGenerated {
    pub fn new(
        content_id: impl Into<String>,
        venture_id: impl Into<String>,
        content_kind: impl Into<String>,
        word_count: u32,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            venture_id: venture_id.into(),
            content_kind: content_kind.into(),
            request_id: None,
            word_count,
        }
    }

    pub fn answering(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl EventKind for ContentGenerated {
    const TYPE: EventType = EventType::ContentGenerated;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.content_id", &self.content_id);
        issues.require_non_empty("data.venture_id", &self.venture_id);
        issues.require_non_empty("data.content_kind", &self.content_kind);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::ContentGenerated(self)
    }
}
