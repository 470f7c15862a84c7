use super::{ChannelCore, ConfigurableChannel, MessageChannel, SubscribableChannel};
use crate::dispatcher::{MessageDispatcher, UnicastingDispatcher};
use crate::{
    ErrorHandler, Message, MessageHandler, MessagePublishingErrorHandler, MessagingError,
    TaskExecutor, Timeout,
};
use std::sync::Arc;

/// Point-to-point channel that hands each message to an executor.
///
/// `send` returns once the delivery task is submitted; the handler runs
/// later on an executor thread. Handler failures cannot reach the sender and
/// go to the channel's [`ErrorHandler`] instead.
#[derive(Debug)]
pub struct ExecutorChannel {
    core: ChannelCore,
    dispatcher: UnicastingDispatcher,
}

impl ExecutorChannel {
    /// Channel whose failures are published to the failed message's error
    /// channel header, or logged when it has none
    pub fn new(name: impl Into<String>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self::new_with_error_handler(
            name,
            executor,
            Arc::new(MessagePublishingErrorHandler::new()),
        )
    }

    pub fn new_with_error_handler(
        name: impl Into<String>,
        executor: Arc<dyn TaskExecutor>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self::with_dispatcher(
            name,
            UnicastingDispatcher::new().with_executor(executor, Some(error_handler)),
        )
    }

    /// Use a preconfigured dispatcher; it should carry an executor
    pub fn with_dispatcher(name: impl Into<String>, dispatcher: UnicastingDispatcher) -> Self {
        let core = ChannelCore::new(name);
        if !dispatcher.is_async() {
            tracing::warn!(channel = core.name(), "executor channel created with a synchronous dispatcher");
        }
        Self { core, dispatcher }
    }

    pub fn dispatcher(&self) -> &UnicastingDispatcher {
        &self.dispatcher
    }
}

impl ConfigurableChannel for ExecutorChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl MessageChannel for ExecutorChannel {
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

impl SubscribableChannel for ExecutorChannel {
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
    use crate::test_utils::{CollectingErrorHandler, CollectingHandler, FailingHandler};
    use crate::{MessageBuilder, PollableChannel, QueueChannel, ThreadPoolExecutor};
    use std::time::Duration;

    fn pool() -> Arc<ThreadPoolExecutor> {
        Arc::new(ThreadPoolExecutor::with_name("exec-test", 2).unwrap())
    }

    #[test]
    fn test_handler_runs_off_sender_thread() {
        let channel = ExecutorChannel::new("async", pool());
        let handler = Arc::new(CollectingHandler::new());
        channel.subscribe(handler.clone());

        assert!(channel.send(Message::new(1i64)).unwrap());
        assert!(handler.wait_for_messages(1, Duration::from_secs(5)));
        assert_ne!(handler.threads()[0], std::thread::current().id());
    }

    #[test]
    fn test_no_subscribers_fails_at_send() {
        let channel = ExecutorChannel::new("empty", pool());
        let err = channel.send(Message::new(1i64)).unwrap_err();
        assert!(matches!(err, MessagingError::NoSubscribers { .. }));
    }

    #[test]
    fn test_failure_reaches_error_handler_not_sender() {
        let errors = Arc::new(CollectingErrorHandler::new());
        let channel = ExecutorChannel::new_with_error_handler("async", pool(), errors.clone());
        channel.subscribe(Arc::new(FailingHandler::new("worker")));

        assert!(channel.send(Message::new(1i64)).unwrap());
        assert!(errors.wait_for_errors(1, Duration::from_secs(5)));
        assert!(errors.errors()[0].is_handling_failure());
    }

    #[test]
    fn test_failure_published_to_error_channel_header() {
        let channel = ExecutorChannel::new("async", pool());
        channel.subscribe(Arc::new(FailingHandler::new("worker")));
        let errors = Arc::new(QueueChannel::new("errors"));
        let error_target: Arc<dyn MessageChannel> = errors.clone();

        let message = MessageBuilder::with_payload(5i64)
            .error_channel(error_target)
            .build();
        assert!(channel.send(message.clone()).unwrap());

        let published = errors
            .receive_timeout(Timeout::After(Duration::from_secs(5)))
            .unwrap();
        let failure = published.payload_as::<MessagingError>().unwrap();
        assert_eq!(failure.failed_message().unwrap().id(), message.id());
    }

    #[test]
    fn test_rejected_submission_fails_send() {
        let executor = pool();
        let channel = ExecutorChannel::new("async", executor.clone());
        channel.subscribe(Arc::new(CollectingHandler::new()));
        executor.shutdown();

        let err = channel.send(Message::new(1i64)).unwrap_err();
        assert!(matches!(err, MessagingError::TaskRejected { .. }));
    }
}
