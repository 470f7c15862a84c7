use super::{ChannelCore, ConfigurableChannel, MessageChannel, SubscribableChannel};
use crate::dispatcher::{MessageDispatcher, UnicastingDispatcher};
use crate::{Message, MessageHandler, MessagingError, Timeout};
use std::sync::Arc;

/// Point-to-point channel that invokes one subscriber in the sender's thread.
///
/// `send` returns only after a handler has processed the message, so a slow
/// handler slows the producer down. The timeout is ignored.
#[derive(Debug)]
pub struct DirectChannel {
    core: ChannelCore,
    dispatcher: UnicastingDispatcher,
}

impl DirectChannel {
    /// Create a channel with round-robin load balancing
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_dispatcher(name, UnicastingDispatcher::new())
    }

    pub fn with_dispatcher(name: impl Into<String>, dispatcher: UnicastingDispatcher) -> Self {
        Self {
            core: ChannelCore::new(name),
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &UnicastingDispatcher {
        &self.dispatcher
    }
}

impl ConfigurableChannel for DirectChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl MessageChannel for DirectChannel {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn send_timeout(&self, message: Message, timeout: Timeout) -> Result<bool, MessagingError> {
        self.core
            .send(self, message, timeout, |message, _| self.dispatcher.dispatch(message))
    }

    fn as_configurable(&self) -> Option<&dyn ConfigurableChannel> {
        Some(self)
    }

    fn as_subscribable(&self) -> Option<&dyn SubscribableChannel> {
        Some(self)
    }
}

impl SubscribableChannel for DirectChannel {
    fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> bool {
        self.dispatcher.add_handler(handler)
    }

    fn unsubscribe(&self, handler: &Arc<dyn MessageHandler>) -> bool {
        self.dispatcher.remove_handler(handler)
    }

    fn subscriber_count(&self) -> usize {
        self.dispatcher.handler_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CollectingHandler, FailingHandler};

    #[test]
    fn test_round_robin_alternates_between_two_handlers() {
        let channel = DirectChannel::new("work");
        let a = Arc::new(CollectingHandler::with_name("a"));
        let b = Arc::new(CollectingHandler::with_name("b"));
        channel.subscribe(a.clone());
        channel.subscribe(b.clone());

        let messages: Vec<Message> = (0..4i64).map(Message::new).collect();
        for message in &messages {
            assert!(channel.send(message.clone()).unwrap());
        }

        let a_ids: Vec<_> = a.received_messages().iter().map(Message::id).collect();
        let b_ids: Vec<_> = b.received_messages().iter().map(Message::id).collect();
        assert_eq!(a_ids, vec![messages[0].id(), messages[2].id()]);
        assert_eq!(b_ids, vec![messages[1].id(), messages[3].id()]);
    }

    #[test]
    fn test_send_runs_handler_in_caller_thread() {
        let channel = DirectChannel::new("inline");
        let handler = Arc::new(CollectingHandler::new());
        channel.subscribe(handler.clone());

        channel.send(Message::new(1i64)).unwrap();
        assert_eq!(handler.threads(), vec![std::thread::current().id()]);
    }

    #[test]
    fn test_handler_failure_surfaces_to_sender() {
        let channel = DirectChannel::new("failing");
        channel.subscribe(Arc::new(FailingHandler::new("boom")));

        let err = channel.send(Message::new(1i64)).unwrap_err();
        assert!(err.is_handling_failure());
        assert!(err.to_string().contains("boom"));
        assert_eq!(channel.stats().send_error_count, 1);
    }

    #[test]
    fn test_send_without_subscribers_fails() {
        let channel = DirectChannel::new("empty");
        let err = channel.send(Message::new(1i64)).unwrap_err();
        assert!(matches!(err, MessagingError::NoSubscribers { .. }));
    }

    #[test]
    fn test_duplicate_subscription_is_ignored() {
        let channel = DirectChannel::new("dupes");
        let handler: Arc<dyn MessageHandler> = Arc::new(CollectingHandler::new());

        assert!(channel.subscribe(handler.clone()));
        assert!(!channel.subscribe(handler.clone()));
        assert_eq!(channel.subscriber_count(), 1);

        assert!(channel.unsubscribe(&handler));
        assert!(!channel.unsubscribe(&handler));
        assert_eq!(channel.subscriber_count(), 0);
    }
}
