use super::{ChannelCore, ConfigurableChannel, MessageChannel, SubscribableChannel};
use crate::dispatcher::{BroadcastingDispatcher, MessageDispatcher};
use crate::{
    ErrorHandler, Message, MessageHandler, MessagePublishingErrorHandler, MessagingError,
    TaskExecutor, Timeout,
};
use std::sync::Arc;

/// Channel that delivers every message to all subscribers.
///
/// Without an executor, subscribers run in the sender's thread in
/// subscription order and `send` reports their collected failures. With an
/// executor each subscriber runs as its own task.
#[derive(Debug)]
pub struct PublishSubscribeChannel {
    core: ChannelCore,
    dispatcher: BroadcastingDispatcher,
}

impl PublishSubscribeChannel {
    /// Synchronous broadcaster
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_dispatcher(name, BroadcastingDispatcher::new())
    }

    /// Broadcaster that runs subscribers on `executor`
    pub fn with_executor(name: impl Into<String>, executor: Arc<dyn TaskExecutor>) -> Self {
        let error_handler: Arc<dyn ErrorHandler> = Arc::new(MessagePublishingErrorHandler::new());
        Self::with_dispatcher(
            name,
            BroadcastingDispatcher::new().with_executor(executor, Some(error_handler)),
        )
    }

    pub fn with_dispatcher(name: impl Into<String>, dispatcher: BroadcastingDispatcher) -> Self {
        Self {
            core: ChannelCore::new(name),
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &BroadcastingDispatcher {
        &self.dispatcher
    }
}

impl ConfigurableChannel for PublishSubscribeChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl MessageChannel for PublishSubscribeChannel {
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

impl SubscribableChannel for PublishSubscribeChannel {
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
