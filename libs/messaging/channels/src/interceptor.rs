//! Channel interceptors
//!
//! Interceptors observe or transform traffic on a channel without the
//! channel knowing about them. All four hooks run in registration order.
//! Returning `None` from `pre_send` (or `false` from `pre_receive`) vetoes
//! the operation and skips the rest of the chain.

use crate::support::CopyOnWriteList;
use crate::{Message, MessageChannel};
use std::fmt::Debug;
use std::sync::Arc;

pub trait ChannelInterceptor: Send + Sync + Debug {
    /// Called before the message reaches the channel. `None` vetoes the send.
    fn pre_send(&self, message: Message, _channel: &dyn MessageChannel) -> Option<Message> {
        Some(message)
    }

    /// Called after the channel accepted or refused the message
    fn post_send(&self, _message: &Message, _channel: &dyn MessageChannel, _sent: bool) {}

    /// Called before a receive attempt. `false` vetoes the receive.
    fn pre_receive(&self, _channel: &dyn MessageChannel) -> bool {
        true
    }

    /// Called with a received message. `None` drops it.
    fn post_receive(&self, message: Message, _channel: &dyn MessageChannel) -> Option<Message> {
        Some(message)
    }
}

/// Ordered interceptor list supporting registration while traffic flows
#[derive(Debug, Default)]
pub struct InterceptorChain {
    interceptors: CopyOnWriteList<Arc<dyn ChannelInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor to the end of the chain
    pub fn add(&self, interceptor: Arc<dyn ChannelInterceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Replace the whole chain
    pub fn set(&self, interceptors: Vec<Arc<dyn ChannelInterceptor>>) {
        self.interceptors.replace(interceptors);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pre_send(&self, message: Message, channel: &dyn MessageChannel) -> Option<Message> {
        tracing::debug!(channel = channel.name(), message = ?message, "preSend");
        let mut message = message;
        for interceptor in self.interceptors.snapshot().iter() {
            message = interceptor.pre_send(message, channel)?;
        }
        Some(message)
    }

    pub fn post_send(&self, message: &Message, channel: &dyn MessageChannel, sent: bool) {
        tracing::debug!(channel = channel.name(), sent, message = ?message, "postSend");
        for interceptor in self.interceptors.snapshot().iter() {
            interceptor.post_send(message, channel, sent);
        }
    }

    pub fn pre_receive(&self, channel: &dyn MessageChannel) -> bool {
        tracing::trace!(channel = channel.name(), "preReceive");
        self.interceptors
            .snapshot()
            .iter()
            .all(|interceptor| interceptor.pre_receive(channel))
    }

    pub fn post_receive(&self, message: Message, channel: &dyn MessageChannel) -> Option<Message> {
        tracing::debug!(channel = channel.name(), message = ?message, "postReceive");
        let mut message = message;
        for interceptor in self.interceptors.snapshot().iter() {
            message = interceptor.post_receive(message, channel)?;
        }
        Some(message)
    }
}
