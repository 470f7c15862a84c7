//! Message consumers
//!
//! A handler either accepts a message, rejects it (a normal outcome that
//! lets the dispatcher try another handler) or fails with an error.

use crate::registry::resolve_channel_ref;
use crate::{
    BoxError, ChannelResolver, Message, MessageBuilder, MessagingError, Payload, Timeout,
};
use std::fmt;
use std::sync::Arc;

/// Result of offering a message to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The handler processed the message
    Accepted,
    /// The handler declined the message; another handler may take it
    Rejected,
}

/// A registered message consumer
pub trait MessageHandler: Send + Sync + fmt::Debug {
    /// Process a message. Errors are handling failures, never retried by
    /// the dispatcher; use [`HandleOutcome::Rejected`] to decline instead.
    fn handle(&self, message: &Message) -> Result<HandleOutcome, BoxError>;

    /// Name used in logs and error reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handler backed by a closure
pub struct FnHandler<F> {
    name: String,
    handle: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Message) -> Result<HandleOutcome, BoxError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, handle: F) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Message) -> Result<HandleOutcome, BoxError> + Send + Sync,
{
    fn handle(&self, message: &Message) -> Result<HandleOutcome, BoxError> {
        (self.handle)(message)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap a closure as a shareable handler
pub fn handler_fn<F>(name: impl Into<String>, handle: F) -> Arc<dyn MessageHandler>
where
    F: Fn(&Message) -> Result<HandleOutcome, BoxError> + Send + Sync + 'static,
{
    Arc::new(FnHandler::new(name, handle))
}

/// Decides whether a message is acceptable
pub trait MessageSelector: Send + Sync {
    fn accept(&self, message: &Message) -> bool;
}

impl<F> MessageSelector for F
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn accept(&self, message: &Message) -> bool {
        self(message)
    }
}

/// Handler that rejects messages its selector refuses
pub struct SelectingHandler {
    selector: Box<dyn MessageSelector>,
    inner: Arc<dyn MessageHandler>,
}

impl SelectingHandler {
    pub fn new(selector: impl MessageSelector + 'static, inner: Arc<dyn MessageHandler>) -> Self {
        Self {
            selector: Box::new(selector),
            inner,
        }
    }
}

impl fmt::Debug for SelectingHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectingHandler")
            .field("inner", &self.inner)
            .finish()
    }
}

impl MessageHandler for SelectingHandler {
    fn handle(&self, message: &Message) -> Result<HandleOutcome, BoxError> {
        if !self.selector.accept(message) {
            tracing::trace!(handler = self.inner.name(), id = %message.id(), "selector declined message");
            return Ok(HandleOutcome::Rejected);
        }
        self.inner.handle(message)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Handler that computes a reply and sends it to the request's reply channel
pub struct ReplyProducingHandler<F> {
    name: String,
    produce: F,
    resolver: Option<Arc<dyn ChannelResolver>>,
    send_timeout: Timeout,
}

impl<F> ReplyProducingHandler<F>
where
    F: Fn(&Message) -> Result<Option<Payload>, BoxError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, produce: F) -> Self {
        Self {
            name: name.into(),
            produce,
            resolver: None,
            send_timeout: Timeout::Indefinite,
        }
    }

    /// Resolver used when the reply channel header holds a name
    pub fn with_resolver(mut self, resolver: Arc<dyn ChannelResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Timeout) -> Self {
        self.send_timeout = timeout;
        self
    }
}

impl<F> fmt::Debug for ReplyProducingHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyProducingHandler")
            .field("name", &self.name)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

impl<F> MessageHandler for ReplyProducingHandler<F>
where
    F: Fn(&Message) -> Result<Option<Payload>, BoxError> + Send + Sync,
{
    fn handle(&self, message: &Message) -> Result<HandleOutcome, BoxError> {
        let Some(reply_payload) = (self.produce)(message)? else {
            return Ok(HandleOutcome::Accepted);
        };

        let target = message.headers().reply_channel().ok_or_else(|| {
            MessagingError::delivery(message.clone(), "<reply>", "no reply channel header")
        })?;
        let channel = resolve_channel_ref(target, self.resolver.as_deref())?;

        let reply = MessageBuilder::with_raw_payload(reply_payload)
            .copy_headers_if_absent(message.headers())
            .build();
        if !channel.send_timeout(reply.clone(), self.send_timeout)? {
            return Err(MessagingError::delivery(
                reply,
                channel.name(),
                "reply channel did not accept the reply in time",
            )
            .into());
        }
        Ok(HandleOutcome::Accepted)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
