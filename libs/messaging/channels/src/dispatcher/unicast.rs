//! Point-to-point dispatch
//!
//! Each message goes to exactly one handler. The load balancer picks where
//! to start in the handler snapshot; from there every handler is offered the
//! message in rotation until one accepts. A full rotation where everyone
//! rejects counts as one pass; after `rejection_limit` passes the dispatch
//! gives up. Handler errors are never retried unless `failover` is enabled,
//! in which case the next handler in the same pass gets the message.

use super::{report_async_failure, HandlerSet, LoadBalancingStrategy, MessageDispatcher, RoundRobinStrategy};
use crate::{
    interrupt, ErrorHandler, HandleOutcome, Message, MessageHandler, MessagingError, TaskExecutor,
};
use std::sync::Arc;
use std::time::Duration;

/// Retry behaviour of a [`UnicastingDispatcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherPolicy {
    /// Number of full passes over the handlers before giving up
    pub rejection_limit: usize,
    /// Pause between passes
    pub retry_interval: Duration,
    /// Fail with [`MessagingError::RejectionLimitExceeded`] when every pass
    /// was rejected; otherwise the dispatch quietly returns `false`
    pub fail_on_rejection_limit: bool,
    /// Offer the message to the next handler when one fails
    pub failover: bool,
}

impl Default for DispatcherPolicy {
    fn default() -> Self {
        Self {
            rejection_limit: 5,
            retry_interval: Duration::from_millis(1000),
            fail_on_rejection_limit: true,
            failover: false,
        }
    }
}

impl DispatcherPolicy {
    /// Policy for tests and latency-sensitive paths: no pause between passes
    pub fn no_delay() -> Self {
        Self {
            retry_interval: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct UnicastingDispatcher {
    handlers: HandlerSet,
    load_balancer: Option<Arc<dyn LoadBalancingStrategy>>,
    policy: DispatcherPolicy,
    executor: Option<Arc<dyn TaskExecutor>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl UnicastingDispatcher {
    /// Synchronous dispatcher with round-robin load balancing
    pub fn new() -> Self {
        Self {
            handlers: HandlerSet::new(),
            load_balancer: Some(Arc::new(RoundRobinStrategy::new())),
            policy: DispatcherPolicy::default(),
            executor: None,
            error_handler: None,
        }
    }

    /// Replace the load balancer; `None` always starts at the first handler
    pub fn with_load_balancer(mut self, strategy: Option<Arc<dyn LoadBalancingStrategy>>) -> Self {
        self.load_balancer = strategy;
        self
    }

    pub fn with_policy(mut self, policy: DispatcherPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run handlers on `executor`; failures go to `error_handler`
    pub fn with_executor(
        mut self,
        executor: Arc<dyn TaskExecutor>,
        error_handler: Option<Arc<dyn ErrorHandler>>,
    ) -> Self {
        self.executor = Some(executor);
        self.error_handler = error_handler;
        self
    }

    pub fn policy(&self) -> &DispatcherPolicy {
        &self.policy
    }

    pub fn is_async(&self) -> bool {
        self.executor.is_some()
    }

    fn deliver(
        handlers: &[Arc<dyn MessageHandler>],
        start: usize,
        policy: &DispatcherPolicy,
        message: &Message,
    ) -> Result<bool, MessagingError> {
        let count = handlers.len();
        let passes = policy.rejection_limit.max(1);

        for pass in 0..passes {
            if pass > 0 && !policy.retry_interval.is_zero() && !interrupt::sleep(policy.retry_interval) {
                tracing::debug!(id = %message.id(), "interrupted while waiting to retry dispatch");
                return Ok(false);
            }

            let mut failures = Vec::new();
            for offset in 0..count {
                let handler = &handlers[(start + offset) % count];
                match handler.handle(message) {
                    Ok(HandleOutcome::Accepted) => {
                        if !failures.is_empty() {
                            tracing::info!(
                                handler = handler.name(),
                                failed = failures.len(),
                                "failover delivered message"
                            );
                        }
                        return Ok(true);
                    }
                    Ok(HandleOutcome::Rejected) => {
                        tracing::trace!(handler = handler.name(), pass, id = %message.id(), "handler rejected message");
                    }
                    Err(e) => {
                        let error = MessagingError::from_handler(message.clone(), handler.name(), e);
                        if !policy.failover {
                            return Err(error);
                        }
                        tracing::warn!(handler = handler.name(), error = %error, "handler failed, failing over");
                        failures.push(error);
                    }
                }
            }

            match failures.len() {
                0 => {}
                1 => return Err(failures.remove(0)),
                _ => {
                    return Err(MessagingError::Aggregate {
                        message: message.clone(),
                        failures,
                    })
                }
            }
        }

        tracing::debug!(id = %message.id(), handlers = count, passes, "rejection limit reached");
        if policy.fail_on_rejection_limit {
            Err(MessagingError::RejectionLimitExceeded {
                message: message.clone(),
                handlers: count,
                passes,
            })
        } else {
            Ok(false)
        }
    }
}

impl Default for UnicastingDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDispatcher for UnicastingDispatcher {
    fn add_handler(&self, handler: Arc<dyn MessageHandler>) -> bool {
        self.handlers.add(handler)
    }

    fn remove_handler(&self, handler: &Arc<dyn MessageHandler>) -> bool {
        self.handlers.remove(handler)
    }

    fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn dispatch(&self, message: Message) -> Result<bool, MessagingError> {
        let handlers = self.handlers.snapshot();
        if handlers.is_empty() {
            return Err(MessagingError::NoSubscribers { message });
        }
        let start = self
            .load_balancer
            .as_ref()
            .map_or(0, |strategy| strategy.next_start(handlers.len()));

        let Some(executor) = &self.executor else {
            return Self::deliver(&handlers, start, &self.policy, &message);
        };

        let policy = self.policy.clone();
        let error_handler = self.error_handler.clone();
        let task_message = message.clone();
        executor
            .execute(Box::new(move || {
                match Self::deliver(&handlers, start, &policy, &task_message) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(id = %task_message.id(), "asynchronous dispatch was not accepted by any handler")
                    }
                    Err(error) => report_async_failure(error_handler.as_ref(), error),
                }
            }))
            .map_err(|rejected| MessagingError::TaskRejected {
                message,
                reason: rejected.to_string(),
            })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CollectingHandler, FailingHandler, RejectingHandler};
    use crate::{FirstAvailableStrategy, InlineExecutor};
    use crate::test_utils::CollectingErrorHandler;

    fn fast_policy(rejection_limit: usize) -> DispatcherPolicy {
        DispatcherPolicy {
            rejection_limit,
            retry_interval: Duration::ZERO,
            ..DispatcherPolicy::default()
        }
    }

    #[test]
    fn test_rejection_moves_to_next_handler() {
        let dispatcher = UnicastingDispatcher::new().with_policy(fast_policy(1));
        let rejecting = Arc::new(RejectingHandler::new());
        let accepting = Arc::new(CollectingHandler::new());
        dispatcher.add_handler(rejecting.clone());
        dispatcher.add_handler(accepting.clone());

        for i in 0..4i64 {
            assert!(dispatcher.dispatch(Message::new(i)).unwrap());
        }

        // Every message ends up with the accepting handler; the rejecting one
        // is offered the messages whose rotation started with it
        assert_eq!(accepting.message_count(), 4);
        assert_eq!(rejecting.rejection_count(), 2);
    }

    #[test]
    fn test_rejection_limit_counts_full_passes() {
        let dispatcher = UnicastingDispatcher::new().with_policy(fast_policy(2));
        let first = Arc::new(RejectingHandler::new());
        let second = Arc::new(RejectingHandler::new());
        dispatcher.add_handler(first.clone());
        dispatcher.add_handler(second.clone());

        let err = dispatcher.dispatch(Message::new(1i64)).unwrap_err();
        assert!(matches!(
            err,
            MessagingError::RejectionLimitExceeded { handlers: 2, passes: 2, .. }
        ));
        assert!(err.is_delivery_failure());
        assert_eq!(first.rejection_count(), 2);
        assert_eq!(second.rejection_count(), 2);
    }

    #[test]
    fn test_rejection_limit_without_failure_returns_false() {
        let policy = DispatcherPolicy {
            fail_on_rejection_limit: false,
            ..fast_policy(3)
        };
        let dispatcher = UnicastingDispatcher::new().with_policy(policy);
        let handler = Arc::new(RejectingHandler::new());
        dispatcher.add_handler(handler.clone());

        assert!(!dispatcher.dispatch(Message::new(1i64)).unwrap());
        assert_eq!(handler.rejection_count(), 3);
    }

    #[test]
    fn test_retry_interval_between_passes() {
        let policy = DispatcherPolicy {
            rejection_limit: 3,
            retry_interval: Duration::from_millis(20),
            fail_on_rejection_limit: false,
            failover: false,
        };
        let dispatcher = UnicastingDispatcher::new().with_policy(policy);
        dispatcher.add_handler(Arc::new(RejectingHandler::new()));

        let started = std::time::Instant::now();
        assert!(!dispatcher.dispatch(Message::new(1i64)).unwrap());
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_interrupt_during_retry_returns_false() {
        interrupt::clear();
        let policy = DispatcherPolicy {
            rejection_limit: 10,
            retry_interval: Duration::from_secs(10),
            ..DispatcherPolicy::default()
        };
        let dispatcher = UnicastingDispatcher::new().with_policy(policy);
        dispatcher.add_handler(Arc::new(RejectingHandler::new()));

        interrupt::InterruptHandle::current().interrupt();
        assert!(!dispatcher.dispatch(Message::new(1i64)).unwrap());
        assert!(interrupt::is_interrupted());
        interrupt::clear();
    }

    #[test]
    fn test_handler_error_is_not_retried() {
        let dispatcher = UnicastingDispatcher::new()
            .with_load_balancer(None)
            .with_policy(fast_policy(5));
        let failing = Arc::new(FailingHandler::new("broken"));
        let backup = Arc::new(CollectingHandler::new());
        dispatcher.add_handler(failing.clone());
        dispatcher.add_handler(backup.clone());

        let err = dispatcher.dispatch(Message::new(1i64)).unwrap_err();
        assert!(err.is_handling_failure());
        assert_eq!(failing.failure_count(), 1);
        assert_eq!(backup.message_count(), 0);
    }

    #[test]
    fn test_failover_tries_next_handler() {
        let policy = DispatcherPolicy {
            failover: true,
            ..fast_policy(1)
        };
        let dispatcher = UnicastingDispatcher::new()
            .with_load_balancer(Some(Arc::new(FirstAvailableStrategy)))
            .with_policy(policy);
        let failing = Arc::new(FailingHandler::new("broken"));
        let backup = Arc::new(CollectingHandler::new());
        dispatcher.add_handler(failing.clone());
        dispatcher.add_handler(backup.clone());

        assert!(dispatcher.dispatch(Message::new(1i64)).unwrap());
        assert_eq!(backup.message_count(), 1);
    }

    #[test]
    fn test_failover_with_all_handlers_failing_aggregates() {
        let policy = DispatcherPolicy {
            failover: true,
            ..fast_policy(3)
        };
        let dispatcher = UnicastingDispatcher::new().with_policy(policy);
        let a = Arc::new(FailingHandler::new("a"));
        let b = Arc::new(FailingHandler::new("b"));
        dispatcher.add_handler(a.clone());
        dispatcher.add_handler(b.clone());

        let err = dispatcher.dispatch(Message::new(1i64)).unwrap_err();
        match err {
            MessagingError::Aggregate { failures, .. } => assert_eq!(failures.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        // Failures end the dispatch; no second pass
        assert_eq!(a.failure_count() + b.failure_count(), 2);
    }

    #[test]
    fn test_async_failure_goes_to_error_handler() {
        let errors = Arc::new(CollectingErrorHandler::new());
        let dispatcher = UnicastingDispatcher::new()
            .with_executor(Arc::new(InlineExecutor), Some(errors.clone()));
        dispatcher.add_handler(Arc::new(FailingHandler::new("worker")));

        assert!(dispatcher.dispatch(Message::new(1i64)).unwrap());
        let reported = errors.errors();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].is_handling_failure());
    }

    #[test]
    fn test_async_rejection_limit_goes_to_error_handler() {
        let errors = Arc::new(CollectingErrorHandler::new());
        let dispatcher = UnicastingDispatcher::new()
            .with_policy(fast_policy(2))
            .with_executor(Arc::new(InlineExecutor), Some(errors.clone()));
        dispatcher.add_handler(Arc::new(RejectingHandler::new()));

        assert!(dispatcher.dispatch(Message::new(1i64)).unwrap());
        assert!(matches!(
            errors.errors()[0],
            MessagingError::RejectionLimitExceeded { .. }
        ));
    }

    #[test]
    fn test_handlers_added_during_dispatch_see_later_messages() {
        let dispatcher = Arc::new(UnicastingDispatcher::new());
        let late = Arc::new(CollectingHandler::with_name("late"));

        let registrar = Arc::clone(&dispatcher);
        let late_handler: Arc<dyn MessageHandler> = late.clone();
        let first = crate::handler_fn("first", move |_| {
            registrar.add_handler(late_handler.clone());
            Ok(HandleOutcome::Accepted)
        });
        dispatcher.add_handler(first);

        assert!(dispatcher.dispatch(Message::new(1i64)).unwrap());
        assert_eq!(dispatcher.handler_count(), 2);
        assert!(dispatcher.dispatch(Message::new(2i64)).unwrap());
        assert_eq!(late.message_count(), 1);
    }
}
