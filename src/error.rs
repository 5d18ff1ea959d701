//! Error types for the event bus.

use std::time::Duration;

use thiserror::Error;

use crate::schema::ValidationIssues;

/// Errors that can occur while building, encoding, publishing or consuming
/// events. Nothing in this crate retries; every failure reaches the caller.
#[derive(Debug, Error)]
pub enum EventError {
    // Configuration errors (permanent)
    /// Required configuration variable is missing.
    #[error("Configuration missing: {var}")]
    ConfigMissing { var: String },

    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    // Connection errors
    /// An operation needing the broker ran before `connect()` succeeded.
    #[error("Event client is not connected")]
    NotConnected,

    /// Failed to open a broker connection.
    #[error("Connection to broker {target} failed: {cause}")]
    ConnectionFailed { target: String, cause: String },

    // Schema errors
    /// No schema is registered for this type tag.
    #[error("Unknown event type: {event_type}")]
    UnknownEventType { event_type: String },

    /// Not one of the fixed stream names.
    #[error("Unknown stream: {stream}")]
    UnknownStream { stream: String },

    /// The type tag is bound to a different stream.
    #[error("Event type {event_type} belongs to stream {expected}, not {actual}")]
    StreamMismatch {
        event_type: String,
        expected: String,
        actual: String,
    },

    /// Candidate does not match its schema.
    #[error("Event {event_type} failed schema validation: {issues}")]
    SchemaValidation {
        event_type: String,
        issues: ValidationIssues,
    },

    /// A different schema is already registered for this tag.
    #[error("Conflicting schema for event type {event_type}: {reason}")]
    SchemaConflict { event_type: String, reason: String },

    // Wire codec errors
    #[error("Failed to encode field {field}: {cause}")]
    Encode { field: &'static str, cause: String },

    #[error("Failed to decode field {field}: {cause}")]
    Decode { field: &'static str, cause: String },

    // Correlation waiter
    /// No matching event arrived before the deadline.
    #[error(
        "Timed out after {waited:?} waiting for {event_type} on {stream} (correlation id {correlation_id})"
    )]
    Timeout {
        stream: String,
        event_type: String,
        correlation_id: String,
        waited: Duration,
    },

    /// The wait was cancelled by its owner.
    #[error("Wait cancelled")]
    Cancelled,

    // Transport errors
    /// Any other broker-side failure.
    #[error("Broker {operation} failed: {cause}")]
    Broker {
        operation: &'static str,
        cause: String,
    },

    /// Redis client error.
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl EventError {
    /// Returns true if this error is transient and the operation may be
    /// re-issued by the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            EventError::ConnectionFailed { .. } | EventError::Broker { .. } => true,
            #[cfg(feature = "redis")]
            EventError::Redis(e) => e.is_io_error() || e.is_connection_dropped() || e.is_timeout(),
            _ => false,
        }
    }

    /// Returns true for a correlation wait that ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EventError::Timeout { .. })
    }

    /// Returns true for transport-level failures.
    pub fn is_broker_failure(&self) -> bool {
        match self {
            EventError::ConnectionFailed { .. } | EventError::Broker { .. } => true,
            #[cfg(feature = "redis")]
            EventError::Redis(_) => true,
            _ => false,
        }
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EventError::ConfigMissing { .. } | EventError::ConfigInvalid { .. }
        )
    }

    pub(crate) fn broker(operation: &'static str, cause: impl ToString) -> Self {
        EventError::Broker {
            operation,
            cause: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_not_a_broker_failure() {
        let timeout = EventError::Timeout {
            stream: "ai.events".to_string(),
            event_type: "ai.generation_completed".to_string(),
            correlation_id: "c-1".to_string(),
            waited: Duration::from_millis(200),
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_broker_failure());
        assert!(!timeout.is_transient());

        let broker = EventError::broker("xadd", "connection reset");
        assert!(broker.is_broker_failure());
        assert!(broker.is_transient());
        assert!(!broker.is_timeout());
    }

    #[test]
    fn config_errors() {
        let err = EventError::ConfigMissing {
            var: "REDIS_HOST".to_string(),
        };
        assert!(err.is_config_error());
        assert!(!EventError::NotConnected.is_config_error());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            EventError::NotConnected.to_string(),
            "Event client is not connected"
        );
        assert_eq!(
            EventError::broker("xack", "NOGROUP").to_string(),
            "Broker xack failed: NOGROUP"
        );
    }
}
