//! Channel contracts and the shared send/receive pipeline
//!
//! Every channel variant owns a [`ChannelCore`] and routes its public
//! `send`/`receive` calls through it. The core runs the steps common to all
//! channels (history tracking, datatype guard, interceptors, statistics) and
//! delegates the actual hand-off to the variant:
//!
//! - push channels ([`DirectChannel`], [`ExecutorChannel`],
//!   [`PublishSubscribeChannel`]) hand the message to a dispatcher
//! - pull channels ([`QueueChannel`], [`PriorityChannel`],
//!   [`ThreadLocalChannel`]) buffer it until someone calls `receive`

mod direct;
mod executor;
mod priority;
mod publish_subscribe;
mod queue;
mod thread_local;

pub use direct::DirectChannel;
pub use executor::ExecutorChannel;
pub use priority::{MessageComparator, PriorityChannel, PriorityComparator};
pub use publish_subscribe::PublishSubscribeChannel;
pub use queue::QueueChannel;
pub use thread_local::ThreadLocalChannel;

use crate::{
    ChannelInterceptor, ConversionService, Datatype, InterceptorChain, Message, MessageBuilder,
    MessageHandler, MessagingError, Timeout,
};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A named endpoint that accepts messages from producers
pub trait MessageChannel: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Send a message, waiting according to `timeout` if the channel is at
    /// capacity. `Ok(false)` means the message was not sent: vetoed by an
    /// interceptor, timed out, or the calling thread was interrupted.
    fn send_timeout(&self, message: Message, timeout: Timeout) -> Result<bool, MessagingError>;

    /// Send a message, blocking until it is accepted or the thread is interrupted
    fn send(&self, message: Message) -> Result<bool, MessagingError> {
        self.send_timeout(message, Timeout::Indefinite)
    }

    /// This channel as a pull channel, if it is one
    fn as_pollable(&self) -> Option<&dyn PollableChannel> {
        None
    }

    /// This channel as a push channel, if it is one
    fn as_subscribable(&self) -> Option<&dyn SubscribableChannel> {
        None
    }

    /// Access to interceptors, datatypes and statistics
    fn as_configurable(&self) -> Option<&dyn ConfigurableChannel> {
        None
    }
}

/// Channel that buffers messages for consumers to pull
pub trait PollableChannel: MessageChannel {
    /// Receive the next message, waiting according to `timeout`. `None` on
    /// timeout, interruption, or an interceptor veto.
    fn receive_timeout(&self, timeout: Timeout) -> Option<Message>;

    fn receive(&self) -> Option<Message> {
        self.receive_timeout(Timeout::Indefinite)
    }
}

/// Channel that pushes messages to subscribed handlers
pub trait SubscribableChannel: MessageChannel {
    /// Register a handler. Returns `false` if this handler is already subscribed.
    fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> bool;

    /// Remove a handler. Returns `false` if it was not subscribed.
    fn unsubscribe(&self, handler: &Arc<dyn MessageHandler>) -> bool;

    fn subscriber_count(&self) -> usize;
}

/// Per-channel traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Sends that completed with `Ok(true)`
    pub send_count: u64,
    /// Sends that ended in an error
    pub send_error_count: u64,
    /// Messages handed out by `receive`
    pub receive_count: u64,
}

/// State and behaviour shared by all channel variants
#[derive(Debug)]
pub struct ChannelCore {
    name: String,
    datatypes: RwLock<Vec<Datatype>>,
    conversion_service: RwLock<Option<Arc<dyn ConversionService>>>,
    interceptors: InterceptorChain,
    track_history: AtomicBool,
    send_count: AtomicU64,
    send_error_count: AtomicU64,
    receive_count: AtomicU64,
}

impl ChannelCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datatypes: RwLock::new(Vec::new()),
            conversion_service: RwLock::new(None),
            interceptors: InterceptorChain::new(),
            track_history: AtomicBool::new(false),
            send_count: AtomicU64::new(0),
            send_error_count: AtomicU64::new(0),
            receive_count: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Restrict accepted payload types. An empty list accepts anything.
    pub fn set_datatypes(&self, datatypes: Vec<Datatype>) {
        *self.datatypes.write() = datatypes;
    }

    pub fn datatypes(&self) -> Vec<Datatype> {
        self.datatypes.read().clone()
    }

    pub fn set_conversion_service(&self, service: Arc<dyn ConversionService>) {
        *self.conversion_service.write() = Some(service);
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    pub fn add_interceptor(&self, interceptor: Arc<dyn ChannelInterceptor>) {
        self.interceptors.add(interceptor);
    }

    /// Record this channel's name in the history header of every message sent
    pub fn set_track_history(&self, track: bool) {
        self.track_history.store(track, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            send_count: self.send_count.load(Ordering::Relaxed),
            send_error_count: self.send_error_count.load(Ordering::Relaxed),
            receive_count: self.receive_count.load(Ordering::Relaxed),
        }
    }

    /// Run the send pipeline around `do_send`
    pub fn send<F>(
        &self,
        channel: &dyn MessageChannel,
        message: Message,
        timeout: Timeout,
        do_send: F,
    ) -> Result<bool, MessagingError>
    where
        F: FnOnce(Message, Timeout) -> Result<bool, MessagingError>,
    {
        let message = if self.track_history.load(Ordering::Relaxed) {
            MessageBuilder::from_message(&message)
                .preserve_identity()
                .append_history(&self.name)
                .build()
        } else {
            message
        };

        let message = match self.convert_payload_if_necessary(message) {
            Ok(message) => message,
            Err(e) => {
                self.send_error_count.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let Some(message) = self.interceptors.pre_send(message, channel) else {
            tracing::debug!(channel = %self.name, "send vetoed by interceptor");
            return Ok(false);
        };

        match do_send(message.clone(), timeout) {
            Ok(sent) => {
                if sent {
                    self.send_count.fetch_add(1, Ordering::Relaxed);
                }
                self.interceptors.post_send(&message, channel, sent);
                Ok(sent)
            }
            Err(e) => {
                self.send_error_count.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Run the receive pipeline around `do_receive`
    pub fn receive<F>(
        &self,
        channel: &dyn MessageChannel,
        timeout: Timeout,
        do_receive: F,
    ) -> Option<Message>
    where
        F: FnOnce(Timeout) -> Option<Message>,
    {
        if !self.interceptors.pre_receive(channel) {
            tracing::debug!(channel = %self.name, "receive vetoed by interceptor");
            return None;
        }

        let Some(message) = do_receive(timeout) else {
            tracing::trace!(channel = %self.name, "no message received");
            return None;
        };
        self.receive_count.fetch_add(1, Ordering::Relaxed);
        self.interceptors.post_receive(message, channel)
    }

    fn convert_payload_if_necessary(&self, message: Message) -> Result<Message, MessagingError> {
        let datatypes = self.datatypes.read().clone();
        if datatypes.is_empty() || datatypes.iter().any(|d| d.matches(message.payload())) {
            return Ok(message);
        }

        let service = self.conversion_service.read().clone();
        if let Some(service) = service {
            for datatype in &datatypes {
                if !service.can_convert(message.payload(), datatype) {
                    continue;
                }
                match service.convert(message.payload(), datatype) {
                    Ok(converted) => return Ok(message.with_payload(converted)),
                    Err(e) => {
                        tracing::debug!(
                            channel = %self.name,
                            target = %datatype,
                            error = %e,
                            "payload conversion failed, trying next datatype"
                        );
                    }
                }
            }
        }

        Err(MessagingError::UnsupportedDatatype {
            channel: self.name.clone(),
            expected: datatypes.iter().map(Datatype::name).collect(),
            actual: message.payload().type_name(),
            message,
        })
    }
}

/// Channels that expose their [`ChannelCore`] for configuration
pub trait ConfigurableChannel {
    fn core(&self) -> &ChannelCore;

    fn add_interceptor(&self, interceptor: Arc<dyn ChannelInterceptor>) {
        self.core().add_interceptor(interceptor);
    }

    fn set_interceptors(&self, interceptors: Vec<Arc<dyn ChannelInterceptor>>) {
        self.core().interceptors().set(interceptors);
    }

    fn set_datatypes(&self, datatypes: Vec<Datatype>) {
        self.core().set_datatypes(datatypes);
    }

    fn set_conversion_service(&self, service: Arc<dyn ConversionService>) {
        self.core().set_conversion_service(service);
    }

    fn set_track_history(&self, track: bool) {
        self.core().set_track_history(track);
    }

    fn stats(&self) -> ChannelStats {
        self.core().stats()
    }
}
