//! # Message Channels
//!
//! In-process messaging between components of a service: producers send
//! immutable [`Message`] envelopes into named channels and consumers either
//! subscribe handlers (push) or poll for messages (pull).
//!
//! ## Channel types
//!
//! | Channel | Style | Delivery |
//! |---------|-------|----------|
//! | [`DirectChannel`] | push | one handler, sender's thread |
//! | [`ExecutorChannel`] | push | one handler, worker pool |
//! | [`PublishSubscribeChannel`] | push | every handler |
//! | [`QueueChannel`] | pull | FIFO, optional capacity |
//! | [`PriorityChannel`] | pull | highest priority first |
//! | [`ThreadLocalChannel`] | pull | FIFO visible only to the sending thread |
//!
//! Every send runs the same pipeline: history tracking, payload datatype
//! guard and conversion, interceptors, then the variant's own hand-off.
//!
//! ## Usage
//!
//! ```rust
//! use message_channels::{handler_fn, DirectChannel, HandleOutcome, Message, MessageChannel, SubscribableChannel};
//!
//! let channel = DirectChannel::new("orders");
//! channel.subscribe(handler_fn("printer", |message| {
//!     println!("{:?}", message.payload_as::<String>());
//!     Ok(HandleOutcome::Accepted)
//! }));
//! assert!(channel.send(Message::new("order-1".to_string())).unwrap());
//! ```
//!
//! ## Blocking and interruption
//!
//! Sends to full buffers and receives from empty ones block according to a
//! [`Timeout`]. Blocked threads can be woken through an
//! [`interrupt::InterruptHandle`]; the operation then reports `false`/`None`.

pub mod channel;
pub mod config;
pub mod conversion;
pub mod dispatcher;
pub mod error;
pub mod error_handler;
pub mod executor;
pub mod handler;
pub mod interceptor;
pub mod interrupt;
pub mod message;
pub mod registry;
mod support;
pub mod template;
pub mod test_utils;
pub mod timeout;

pub use channel::{
    ChannelCore, ChannelStats, ConfigurableChannel, DirectChannel, ExecutorChannel,
    MessageChannel, MessageComparator, PollableChannel, PriorityChannel, PriorityComparator,
    PublishSubscribeChannel, QueueChannel, SubscribableChannel, ThreadLocalChannel,
};
pub use config::{ChannelConfig, ChannelType, ChannelsConfig, ExecutorConfig, LoadBalancerType};
pub use conversion::{ConversionService, Datatype, DefaultConversionService};
pub use dispatcher::{
    BroadcastingDispatcher, DispatcherPolicy, FirstAvailableStrategy, HandlerSet,
    LoadBalancingStrategy, MessageDispatcher, RoundRobinStrategy, UnicastingDispatcher,
};
pub use error::{BoxError, MessagingError, SharedError};
pub use error_handler::{ErrorHandler, LoggingErrorHandler, MessagePublishingErrorHandler};
pub use executor::{InlineExecutor, Task, TaskExecutor, TaskRejected, ThreadPoolExecutor, TokioExecutor};
pub use handler::{
    handler_fn, FnHandler, HandleOutcome, MessageHandler, MessageSelector, ReplyProducingHandler,
    SelectingHandler,
};
pub use interceptor::{ChannelInterceptor, InterceptorChain};
pub use message::{
    ChannelRef, HeaderValue, Message, MessageBuilder, MessageHeaders, MessagePriority, Payload,
};
pub use registry::{resolve_channel_ref, ChannelRegistry, ChannelResolver};
pub use template::MessagingTemplate;
pub use timeout::Timeout;
