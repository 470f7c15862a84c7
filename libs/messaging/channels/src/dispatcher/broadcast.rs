//! Fan-out dispatch
//!
//! Every handler gets its own invocation. A failing handler never keeps the
//! others from seeing the message; failures are collected and reported once
//! all handlers have run.

use super::{report_async_failure, HandlerSet, MessageDispatcher};
use crate::{
    ErrorHandler, HandleOutcome, Message, MessageBuilder, MessageHandler, MessagingError,
    TaskExecutor,
};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct BroadcastingDispatcher {
    handlers: HandlerSet,
    apply_sequence: bool,
    executor: Option<Arc<dyn TaskExecutor>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl BroadcastingDispatcher {
    /// Synchronous broadcaster without sequence headers
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp each copy with correlation id, sequence number and sequence size
    pub fn with_apply_sequence(mut self, apply_sequence: bool) -> Self {
        self.apply_sequence = apply_sequence;
        self
    }

    /// Run each handler as a separate task on `executor`
    pub fn with_executor(
        mut self,
        executor: Arc<dyn TaskExecutor>,
        error_handler: Option<Arc<dyn ErrorHandler>>,
    ) -> Self {
        self.executor = Some(executor);
        self.error_handler = error_handler;
        self
    }

    pub fn applies_sequence(&self) -> bool {
        self.apply_sequence
    }

    pub fn is_async(&self) -> bool {
        self.executor.is_some()
    }

    fn message_for(&self, message: &Message, sequence_number: usize, sequence_size: usize) -> Message {
        if !self.apply_sequence {
            return message.clone();
        }
        MessageBuilder::from_message(message)
            .correlation_id(message.id().to_string())
            .sequence_number(sequence_number as u32)
            .sequence_size(sequence_size as u32)
            .build()
    }

    fn invoke(handler: &Arc<dyn MessageHandler>, message: &Message) -> Result<(), MessagingError> {
        match handler.handle(message) {
            Ok(HandleOutcome::Accepted) => Ok(()),
            Ok(HandleOutcome::Rejected) => {
                tracing::trace!(handler = handler.name(), id = %message.id(), "subscriber declined broadcast");
                Ok(())
            }
            Err(e) => Err(MessagingError::from_handler(message.clone(), handler.name(), e)),
        }
    }
}

impl MessageDispatcher for BroadcastingDispatcher {
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
            tracing::debug!(id = %message.id(), "broadcast has no subscribers");
            return Ok(false);
        }

        let size = handlers.len();
        let mut failures = Vec::new();
        for (index, handler) in handlers.iter().enumerate() {
            let copy = self.message_for(&message, index + 1, size);

            match &self.executor {
                None => {
                    if let Err(error) = Self::invoke(handler, &copy) {
                        tracing::warn!(handler = handler.name(), error = %error, "subscriber failed");
                        failures.push(error);
                    }
                }
                Some(executor) => {
                    let handler = Arc::clone(handler);
                    let error_handler = self.error_handler.clone();
                    let task_message = copy.clone();
                    let submitted = executor.execute(Box::new(move || {
                        if let Err(error) = Self::invoke(&handler, &task_message) {
                            report_async_failure(error_handler.as_ref(), error);
                        }
                    }));
                    if let Err(rejected) = submitted {
                        failures.push(MessagingError::TaskRejected {
                            message: copy,
                            reason: rejected.to_string(),
                        });
                    }
                }
            }
        }

        match failures.len() {
            0 => Ok(true),
            1 if size == 1 => Err(failures.remove(0)),
            _ => Err(MessagingError::Aggregate { message, failures }),
        }
    }
}
