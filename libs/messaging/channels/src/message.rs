//! Immutable message envelope
//!
//! A [`Message`] pairs an opaque [`Payload`] with a [`MessageHeaders`] map.
//! Neither is ever mutated once the envelope exists; every "modifying"
//! operation goes through [`MessageBuilder`] and yields a new envelope.

use crate::{MessageChannel, MessagingError};
use chrono::{DateTime, Utc};
use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Type-erased, shareable message payload
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the payload as `T` if that is its concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Runtime type of the wrapped value (not of the `Payload` wrapper)
    pub fn value_type_id(&self) -> TypeId {
        (*self.value).type_id()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.downcast_ref::<String>() {
            return write!(f, "{:?}", text);
        }
        if let Some(text) = self.downcast_ref::<&'static str>() {
            return write!(f, "{:?}", text);
        }
        if let Some(number) = self.downcast_ref::<i64>() {
            return write!(f, "{}", number);
        }
        if let Some(error) = self.downcast_ref::<MessagingError>() {
            return write!(f, "error({})", error);
        }
        write!(f, "<{}>", self.type_name)
    }
}

/// Message priority, ordered so that a greater value is more urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessagePriority {
    Lowest = 0,
    Low = 1,
    Normal = 2,
    High = 3,
    Highest = 4,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

/// Value of a free-form header
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Uuid(Uuid),
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Integer(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Boolean(value)
    }
}

impl From<Uuid> for HeaderValue {
    fn from(value: Uuid) -> Self {
        HeaderValue::Uuid(value)
    }
}

/// Reference to a channel carried in a header: either the channel itself
/// or a name to be looked up through a [`ChannelResolver`](crate::ChannelResolver)
#[derive(Clone)]
pub enum ChannelRef {
    Named(String),
    Direct(Arc<dyn MessageChannel>),
}

impl ChannelRef {
    pub fn name(&self) -> &str {
        match self {
            ChannelRef::Named(name) => name,
            ChannelRef::Direct(channel) => channel.name(),
        }
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Named(name) => write!(f, "Named({})", name),
            ChannelRef::Direct(channel) => write!(f, "Direct({})", channel.name()),
        }
    }
}

impl From<&str> for ChannelRef {
    fn from(name: &str) -> Self {
        ChannelRef::Named(name.to_string())
    }
}

impl From<String> for ChannelRef {
    fn from(name: String) -> Self {
        ChannelRef::Named(name)
    }
}

impl From<Arc<dyn MessageChannel>> for ChannelRef {
    fn from(channel: Arc<dyn MessageChannel>) -> Self {
        ChannelRef::Direct(channel)
    }
}

/// Header map of a message. Read-only once built.
#[derive(Debug, Clone)]
pub struct MessageHeaders {
    id: Uuid,
    timestamp: DateTime<Utc>,
    priority: MessagePriority,
    correlation_id: Option<String>,
    sequence_number: Option<u32>,
    sequence_size: Option<u32>,
    reply_channel: Option<ChannelRef>,
    error_channel: Option<ChannelRef>,
    history: Vec<String>,
    custom: BTreeMap<String, HeaderValue>,
}

impl MessageHeaders {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn priority(&self) -> MessagePriority {
        self.priority
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn sequence_number(&self) -> Option<u32> {
        self.sequence_number
    }

    pub fn sequence_size(&self) -> Option<u32> {
        self.sequence_size
    }

    pub fn reply_channel(&self) -> Option<&ChannelRef> {
        self.reply_channel.as_ref()
    }

    pub fn error_channel(&self) -> Option<&ChannelRef> {
        self.error_channel.as_ref()
    }

    /// Names of the tracking channels this message passed through, oldest first
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Look up a free-form header
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.custom.get(name)
    }

    pub fn custom(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.custom.iter()
    }
}

/// Immutable message envelope: payload plus headers
#[derive(Clone)]
pub struct Message {
    payload: Payload,
    headers: Arc<MessageHeaders>,
}

impl Message {
    /// Create a message with default headers and a fresh id
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        MessageBuilder::with_payload(payload).build()
    }

    /// Error envelope whose payload is the failure itself. The failed
    /// message's correlation id is carried over when it has one.
    pub fn from_error(error: MessagingError) -> Self {
        let correlation = error
            .failed_message()
            .map(|failed| failed.id().to_string());
        let mut builder = MessageBuilder::with_payload(error);
        if let Some(correlation) = correlation {
            builder = builder.correlation_id(correlation);
        }
        builder.build()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Borrow the payload as `T`
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    pub fn id(&self) -> Uuid {
        self.headers.id
    }

    pub fn priority(&self) -> MessagePriority {
        self.headers.priority
    }

    /// True if both envelopes share the very same header map instance
    pub fn shares_headers_with(&self, other: &Message) -> bool {
        Arc::ptr_eq(&self.headers, &other.headers)
    }

    /// New envelope with `payload` and this message's header map, identity included
    pub(crate) fn with_payload(&self, payload: Payload) -> Message {
        Message {
            payload,
            headers: Arc::clone(&self.headers),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.headers.id)
            .field("payload", &self.payload)
            .field("priority", &self.headers.priority)
            .finish()
    }
}

/// Builder producing new [`Message`] instances
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    payload: Payload,
    source_identity: Option<(Uuid, DateTime<Utc>)>,
    preserve_identity: bool,
    priority: Option<MessagePriority>,
    correlation_id: Option<String>,
    sequence_number: Option<u32>,
    sequence_size: Option<u32>,
    reply_channel: Option<ChannelRef>,
    error_channel: Option<ChannelRef>,
    history: Vec<String>,
    custom: BTreeMap<String, HeaderValue>,
}

impl MessageBuilder {
    pub fn with_payload<T: Any + Send + Sync>(payload: T) -> Self {
        Self::with_raw_payload(Payload::new(payload))
    }

    pub fn with_raw_payload(payload: Payload) -> Self {
        Self {
            payload,
            source_identity: None,
            preserve_identity: false,
            priority: None,
            correlation_id: None,
            sequence_number: None,
            sequence_size: None,
            reply_channel: None,
            error_channel: None,
            history: Vec::new(),
            custom: BTreeMap::new(),
        }
    }

    /// Start from an existing message: same payload and headers. The built
    /// message gets a new id unless [`preserve_identity`](Self::preserve_identity) is called.
    pub fn from_message(message: &Message) -> Self {
        Self::with_raw_payload(message.payload.clone()).copy_headers(message.headers())
    }

    /// Copy every header except id and timestamp, overwriting values already set
    pub fn copy_headers(mut self, headers: &MessageHeaders) -> Self {
        self.source_identity = Some((headers.id, headers.timestamp));
        self.priority = Some(headers.priority);
        self.correlation_id = headers.correlation_id.clone();
        self.sequence_number = headers.sequence_number;
        self.sequence_size = headers.sequence_size;
        self.reply_channel = headers.reply_channel.clone();
        self.error_channel = headers.error_channel.clone();
        self.history = headers.history.clone();
        self.custom
            .extend(headers.custom.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Copy headers only where this builder has no value yet
    pub fn copy_headers_if_absent(mut self, headers: &MessageHeaders) -> Self {
        self.priority = self.priority.or(Some(headers.priority));
        if self.correlation_id.is_none() {
            self.correlation_id = headers.correlation_id.clone();
        }
        self.sequence_number = self.sequence_number.or(headers.sequence_number);
        self.sequence_size = self.sequence_size.or(headers.sequence_size);
        if self.reply_channel.is_none() {
            self.reply_channel = headers.reply_channel.clone();
        }
        if self.error_channel.is_none() {
            self.error_channel = headers.error_channel.clone();
        }
        if self.history.is_empty() {
            self.history = headers.history.clone();
        }
        for (name, value) in &headers.custom {
            self.custom
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    /// Keep the id and timestamp of the message whose headers were copied
    pub fn preserve_identity(mut self) -> Self {
        self.preserve_identity = true;
        self
    }

    pub fn priority(mut self, priority: MessagePriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn sequence_number(mut self, sequence_number: u32) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    pub fn sequence_size(mut self, sequence_size: u32) -> Self {
        self.sequence_size = Some(sequence_size);
        self
    }

    pub fn reply_channel(mut self, channel: impl Into<ChannelRef>) -> Self {
        self.reply_channel = Some(channel.into());
        self
    }

    pub fn error_channel(mut self, channel: impl Into<ChannelRef>) -> Self {
        self.error_channel = Some(channel.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.custom.insert(name.into(), value.into());
        self
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.custom.remove(name);
        self
    }

    pub(crate) fn append_history(mut self, channel_name: &str) -> Self {
        self.history.push(channel_name.to_string());
        self
    }

    pub fn build(self) -> Message {
        let (id, timestamp) = match (self.preserve_identity, self.source_identity) {
            (true, Some(identity)) => identity,
            _ => (Uuid::new_v4(), Utc::now()),
        };

        Message {
            payload: self.payload,
            headers: Arc::new(MessageHeaders {
                id,
                timestamp,
                priority: self.priority.unwrap_or_default(),
                correlation_id: self.correlation_id,
                sequence_number: self.sequence_number,
                sequence_size: self.sequence_size,
                reply_channel: self.reply_channel,
                error_channel: self.error_channel,
                history: self.history,
                custom: self.custom,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_defaults() {
        let message = Message::new("hello".to_string());

        assert_eq!(message.payload_as::<String>().unwrap(), "hello");
        assert_eq!(message.priority(), MessagePriority::Normal);
        assert!(message.headers().correlation_id().is_none());
        assert!(message.headers().sequence_number().is_none());
        assert!(message.headers().history().is_empty());
    }

    #[test]
    fn test_id_is_stable_across_reads_and_clones() {
        let message = Message::new(7i64);
        let first = message.id();
        let clone = message.clone();

        assert_eq!(first, message.id());
        assert_eq!(first, message.headers().id());
        assert_eq!(first, clone.id());
        assert!(clone.shares_headers_with(&message));
    }

    #[test]
    fn test_builder_from_message_assigns_new_identity() {
        let original = MessageBuilder::with_payload("order".to_string())
            .priority(MessagePriority::High)
            .header("region", "eu")
            .build();

        let copy = MessageBuilder::from_message(&original).build();

        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.priority(), MessagePriority::High);
        assert_eq!(
            copy.headers().get("region"),
            Some(&HeaderValue::Text("eu".to_string()))
        );
        // Original untouched
        assert_eq!(original.headers().custom().count(), 1);
    }

    #[test]
    fn test_preserve_identity_keeps_id_and_timestamp() {
        let original = Message::new(1i64);
        let copy = MessageBuilder::from_message(&original)
            .preserve_identity()
            .header("extra", true)
            .build();

        assert_eq!(copy.id(), original.id());
        assert_eq!(copy.headers().timestamp(), original.headers().timestamp());
        assert!(original.headers().get("extra").is_none());
    }

    #[test]
    fn test_preserve_identity_without_source_generates_id() {
        let a = MessageBuilder::with_payload(1i64).preserve_identity().build();
        let b = MessageBuilder::with_payload(1i64).preserve_identity().build();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_copy_headers_if_absent_keeps_explicit_values() {
        let source = MessageBuilder::with_payload(0i64)
            .correlation_id("source")
            .priority(MessagePriority::Low)
            .header("a", 1i64)
            .build();

        let message = MessageBuilder::with_payload(1i64)
            .correlation_id("explicit")
            .header("a", 2i64)
            .copy_headers_if_absent(source.headers())
            .build();

        assert_eq!(message.headers().correlation_id(), Some("explicit"));
        assert_eq!(message.priority(), MessagePriority::Low);
        assert_eq!(message.headers().get("a"), Some(&HeaderValue::Integer(2)));
    }

    #[test]
    fn test_error_message_payload() {
        let failed = Message::new("boom".to_string());
        let error = MessagingError::NoSubscribers {
            message: failed.clone(),
        };
        let envelope = Message::from_error(error);

        let payload = envelope.payload_as::<MessagingError>().unwrap();
        assert_eq!(payload.failed_message().unwrap().id(), failed.id());
        assert_eq!(
            envelope.headers().correlation_id(),
            Some(failed.id().to_string().as_str())
        );
    }

    #[test]
    fn test_payload_type_information() {
        let payload = Payload::new(3.5f64);
        assert!(payload.is::<f64>());
        assert_eq!(payload.value_type_id(), TypeId::of::<f64>());
        assert_eq!(payload.type_name(), "f64");
        assert_eq!(format!("{:?}", payload), "<f64>");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(MessagePriority::Highest > MessagePriority::High);
        assert!(MessagePriority::Normal > MessagePriority::Low);
        assert_eq!(MessagePriority::default(), MessagePriority::Normal);
    }
}
