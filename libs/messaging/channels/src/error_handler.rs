//! Handling of failures raised off the sender's thread
//!
//! When a dispatcher runs handlers on an executor, the sender has already
//! returned by the time a handler fails. Those failures go to an
//! [`ErrorHandler`] instead.

use crate::registry::resolve_channel_ref;
use crate::{ChannelRef, ChannelResolver, Message, MessagingError, Timeout};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

pub trait ErrorHandler: Send + Sync + Debug {
    fn handle_error(&self, error: MessagingError);
}

/// Logs failures and drops them
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle_error(&self, error: MessagingError) {
        error!(error = %error, "Asynchronous message handling failed");
    }
}

/// Publishes failures as error messages.
///
/// The destination is the failed message's error channel header when it has
/// one, otherwise the configured default channel. The published message
/// carries the [`MessagingError`] as its payload.
#[derive(Debug)]
pub struct MessagePublishingErrorHandler {
    default_channel: Option<ChannelRef>,
    resolver: Option<Arc<dyn ChannelResolver>>,
    send_timeout: Timeout,
}

impl Default for MessagePublishingErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessagePublishingErrorHandler {
    pub fn new() -> Self {
        Self {
            default_channel: None,
            resolver: None,
            send_timeout: Timeout::After(Duration::from_millis(1000)),
        }
    }

    pub fn with_default_channel(mut self, channel: impl Into<ChannelRef>) -> Self {
        self.default_channel = Some(channel.into());
        self
    }

    /// Shorthand for a default channel resolved by name
    pub fn with_default_channel_name(self, name: impl Into<String>) -> Self {
        self.with_default_channel(ChannelRef::Named(name.into()))
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ChannelResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Timeout) -> Self {
        self.send_timeout = timeout;
        self
    }

    fn destination<'a>(&'a self, error: &'a MessagingError) -> Option<&'a ChannelRef> {
        error
            .failed_message()
            .and_then(|failed| failed.headers().error_channel())
            .or(self.default_channel.as_ref())
    }
}

impl ErrorHandler for MessagePublishingErrorHandler {
    fn handle_error(&self, error: MessagingError) {
        let Some(target) = self.destination(&error) else {
            warn!(error = %error, "No error channel available, dropping failure");
            return;
        };

        let channel = match resolve_channel_ref(target, self.resolver.as_deref()) {
            Ok(channel) => channel,
            Err(resolution) => {
                error!(error = %error, cause = %resolution, "Failed to resolve error channel");
                return;
            }
        };

        let description = error.to_string();
        match channel.send_timeout(Message::from_error(error), self.send_timeout) {
            Ok(true) => {}
            Ok(false) => {
                error!(channel = channel.name(), error = %description, "Error channel did not accept failure in time");
            }
            Err(send_error) => {
                error!(
                    channel = channel.name(),
                    error = %description,
                    cause = %send_error,
                    "Failed to publish failure to error channel"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageBuilder, MessageChannel, PollableChannel, QueueChannel};

    fn failure_for(message: Message) -> MessagingError {
        MessagingError::delivery(message, "orders", "handler exploded")
    }

    #[test]
    fn test_publishes_to_default_channel() {
        let errors = Arc::new(QueueChannel::new("errors"));
        let target: Arc<dyn MessageChannel> = errors.clone();
        let handler = MessagePublishingErrorHandler::new().with_default_channel(target);

        let failed = Message::new(1i64);
        handler.handle_error(failure_for(failed.clone()));

        let published = errors.receive_timeout(Timeout::Immediate).unwrap();
        let payload = published.payload_as::<MessagingError>().unwrap();
        assert_eq!(payload.failed_message().unwrap().id(), failed.id());
        let correlation = failed.id().to_string();
        assert_eq!(published.headers().correlation_id(), Some(correlation.as_str()));
    }

    #[test]
    fn test_error_channel_header_wins_over_default() {
        let default = Arc::new(QueueChannel::new("default"));
        let specific = Arc::new(QueueChannel::new("specific"));
        let default_target: Arc<dyn MessageChannel> = default.clone();
        let specific_target: Arc<dyn MessageChannel> = specific.clone();
        let handler = MessagePublishingErrorHandler::new().with_default_channel(default_target);

        let failed = MessageBuilder::with_payload(1i64)
            .error_channel(specific_target)
            .build();
        handler.handle_error(failure_for(failed));

        assert_eq!(specific.queue_size(), 1);
        assert_eq!(default.queue_size(), 0);
    }

    #[test]
    fn test_without_destination_failure_is_dropped() {
        let handler = MessagePublishingErrorHandler::new();
        // Nothing to assert beyond not panicking
        handler.handle_error(failure_for(Message::new(1i64)));
    }

    #[test]
    fn test_full_error_channel_does_not_block_forever() {
        let errors = Arc::new(QueueChannel::with_capacity("errors", 1).unwrap());
        errors.send(Message::new(0i64)).unwrap();
        let target: Arc<dyn MessageChannel> = errors.clone();
        let handler = MessagePublishingErrorHandler::new()
            .with_default_channel(target)
            .with_send_timeout(Timeout::After(Duration::from_millis(20)));

        handler.handle_error(failure_for(Message::new(1i64)));
        assert_eq!(errors.queue_size(), 1);
    }
}
