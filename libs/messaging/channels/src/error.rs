use crate::Message;
use std::sync::Arc;

/// Boxed error returned by handlers and converters
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared form of [`BoxError`] so that [`MessagingError`] stays cloneable
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MessagingError {
    #[error("Failed to send message {id} to channel '{channel}': {reason}", id = .message.id())]
    Delivery {
        message: Message,
        channel: String,
        reason: String,
        #[source]
        source: Option<SharedError>,
    },

    #[error("Channel '{channel}' expected one of the following datatypes [{expected_list}], but received [{actual}]",
            expected_list = .expected.join(", "))]
    UnsupportedDatatype {
        message: Message,
        channel: String,
        expected: Vec<&'static str>,
        actual: &'static str,
    },

    #[error("Dispatcher has no subscribers for message {id}", id = .message.id())]
    NoSubscribers { message: Message },

    #[error("All {handlers} handlers rejected message {id} after {passes} passes",
            id = .message.id())]
    RejectionLimitExceeded {
        message: Message,
        handlers: usize,
        passes: usize,
    },

    #[error("Handler '{handler}' failed for message {id}: {source}", id = .message.id())]
    Handling {
        message: Message,
        handler: String,
        #[source]
        source: SharedError,
    },

    #[error("{count} handler(s) failed for message {id}: {summary}",
            count = .failures.len(),
            id = .message.id(),
            summary = summarize(.failures))]
    Aggregate {
        message: Message,
        failures: Vec<MessagingError>,
    },

    #[error("Worker pool rejected message {id}: {reason}", id = .message.id())]
    TaskRejected { message: Message, reason: String },

    #[error("Cannot resolve channel '{name}': {reason}")]
    ChannelResolution { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn summarize(failures: &[MessagingError]) -> String {
    failures
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl MessagingError {
    /// The message whose send or handling failed, if the failure is tied to one
    pub fn failed_message(&self) -> Option<&Message> {
        match self {
            MessagingError::Delivery { message, .. }
            | MessagingError::UnsupportedDatatype { message, .. }
            | MessagingError::NoSubscribers { message }
            | MessagingError::RejectionLimitExceeded { message, .. }
            | MessagingError::Handling { message, .. }
            | MessagingError::Aggregate { message, .. }
            | MessagingError::TaskRejected { message, .. } => Some(message),
            MessagingError::ChannelResolution { .. } | MessagingError::InvalidConfig(_) => None,
        }
    }

    /// Check if the send itself could not be completed
    pub fn is_delivery_failure(&self) -> bool {
        matches!(
            self,
            MessagingError::Delivery { .. }
                | MessagingError::UnsupportedDatatype { .. }
                | MessagingError::NoSubscribers { .. }
                | MessagingError::RejectionLimitExceeded { .. }
                | MessagingError::TaskRejected { .. }
        )
    }

    /// Check if a consumer raised an error while processing an accepted message
    pub fn is_handling_failure(&self) -> bool {
        match self {
            MessagingError::Handling { .. } => true,
            MessagingError::Aggregate { failures, .. } => {
                failures.iter().any(MessagingError::is_handling_failure)
            }
            _ => false,
        }
    }

    /// Create a delivery failure without an underlying cause
    pub fn delivery(message: Message, channel: impl Into<String>, reason: impl Into<String>) -> Self {
        MessagingError::Delivery {
            message,
            channel: channel.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Turn an error raised by a handler into a messaging failure. Errors that
    /// already are a `MessagingError` pass through unchanged.
    pub fn from_handler(message: Message, handler: impl Into<String>, error: BoxError) -> Self {
        match error.downcast::<MessagingError>() {
            Ok(messaging) => *messaging,
            Err(other) => MessagingError::Handling {
                message,
                handler: handler.into(),
                source: Arc::from(other),
            },
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        MessagingError::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn test_handler_error_is_wrapped() {
        let message = Message::new(1i64);
        let error = MessagingError::from_handler(message.clone(), "writer", Box::new(DiskFull));

        assert!(error.is_handling_failure());
        assert!(!error.is_delivery_failure());
        assert_eq!(error.failed_message().unwrap().id(), message.id());
        assert!(error.to_string().contains("writer"));
        assert!(error.to_string().contains("disk full"));
    }

    #[test]
    fn test_messaging_error_passes_through_unchanged() {
        let message = Message::new(1i64);
        let inner = MessagingError::delivery(message.clone(), "downstream", "full");
        let error = MessagingError::from_handler(message, "relay", Box::new(inner));

        assert!(matches!(
            error,
            MessagingError::Delivery { ref channel, .. } if channel == "downstream"
        ));
    }

    #[test]
    fn test_unsupported_datatype_names_types() {
        let error = MessagingError::UnsupportedDatatype {
            message: Message::new(1.5f64),
            channel: "numbers".to_string(),
            expected: vec!["i64", "alloc::string::String"],
            actual: "f64",
        };

        let text = error.to_string();
        assert!(text.contains("numbers"));
        assert!(text.contains("i64, alloc::string::String"));
        assert!(text.contains("[f64]"));
        assert!(error.is_delivery_failure());
    }

    #[test]
    fn test_aggregate_lists_failures() {
        let message = Message::new(1i64);
        let error = MessagingError::Aggregate {
            message: message.clone(),
            failures: vec![MessagingError::from_handler(
                message,
                "second",
                Box::new(DiskFull),
            )],
        };

        assert!(error.is_handling_failure());
        assert!(error.to_string().starts_with("1 handler(s) failed"));
        assert!(error.to_string().contains("second"));
    }

    #[test]
    fn test_config_errors_have_no_message() {
        let error = MessagingError::invalid_config("capacity must be greater than 0");
        assert!(error.failed_message().is_none());
        assert!(!error.is_delivery_failure());
        assert!(!error.is_handling_failure());
    }
}
