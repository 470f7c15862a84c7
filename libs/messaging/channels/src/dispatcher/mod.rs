//! Dispatch strategies for push channels
//!
//! A dispatcher owns the handlers subscribed to a channel and decides which
//! of them see each message: exactly one ([`UnicastingDispatcher`]) or all
//! of them ([`BroadcastingDispatcher`]). Either may run handlers in the
//! caller's thread or hand them to a [`TaskExecutor`](crate::TaskExecutor).

mod broadcast;
mod load_balancing;
mod unicast;

pub use broadcast::BroadcastingDispatcher;
pub use load_balancing::{FirstAvailableStrategy, LoadBalancingStrategy, RoundRobinStrategy};
pub use unicast::{DispatcherPolicy, UnicastingDispatcher};

use crate::support::CopyOnWriteList;
use crate::{ErrorHandler, Message, MessageHandler, MessagingError};
use std::fmt::Debug;
use std::sync::Arc;

pub trait MessageDispatcher: Send + Sync + Debug {
    /// Register a handler. Returns `false` if it is already registered.
    fn add_handler(&self, handler: Arc<dyn MessageHandler>) -> bool;

    /// Remove a handler. Returns `false` if it was not registered.
    fn remove_handler(&self, handler: &Arc<dyn MessageHandler>) -> bool;

    fn handler_count(&self) -> usize;

    /// Deliver a message to the selected handler(s)
    fn dispatch(&self, message: Message) -> Result<bool, MessagingError>;
}

/// Handlers registered on a dispatcher.
///
/// Dispatch iterates over a snapshot, so handlers can be added or removed
/// (even by a handler that is currently running) without blocking delivery.
#[derive(Debug, Default)]
pub struct HandlerSet {
    handlers: CopyOnWriteList<Arc<dyn MessageHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: Arc<dyn MessageHandler>) -> bool {
        self.handlers.push_if_absent(handler, same_handler)
    }

    pub fn remove(&self, handler: &Arc<dyn MessageHandler>) -> bool {
        self.handlers
            .remove_where(|existing| same_handler(existing, handler))
            > 0
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn MessageHandler>>> {
        self.handlers.snapshot()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn same_handler(a: &Arc<dyn MessageHandler>, b: &Arc<dyn MessageHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Route a failure raised off the caller's thread
pub(crate) fn report_async_failure(error_handler: Option<&Arc<dyn ErrorHandler>>, error: MessagingError) {
    match error_handler {
        Some(handler) => handler.handle_error(error),
        None => tracing::warn!(error = %error, "asynchronous dispatch failed and no error handler is configured"),
    }
}
