//! Convenience facade over channels
//!
//! Holds a default channel and timeouts so that callers can send, receive and
//! run request/reply exchanges without repeating them.

use crate::{
    Message, MessageBuilder, MessageChannel, MessagingError, PollableChannel, QueueChannel,
    Timeout,
};
use std::any::Any;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MessagingTemplate {
    default_channel: Option<Arc<dyn MessageChannel>>,
    send_timeout: Timeout,
    receive_timeout: Timeout,
}

impl MessagingTemplate {
    /// Template with no default channel and indefinite timeouts
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.default_channel = Some(channel);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Timeout) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Timeout) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn default_channel(&self) -> Option<&Arc<dyn MessageChannel>> {
        self.default_channel.as_ref()
    }

    fn required_default(&self) -> Result<&Arc<dyn MessageChannel>, MessagingError> {
        self.default_channel
            .as_ref()
            .ok_or_else(|| MessagingError::invalid_config("no default channel configured"))
    }

    /// Send to the default channel
    pub fn send(&self, message: Message) -> Result<(), MessagingError> {
        let channel = self.required_default()?;
        self.send_to(channel.as_ref(), message)
    }

    /// Wrap `payload` in a message and send it to the default channel
    pub fn send_payload<T: Any + Send + Sync>(&self, payload: T) -> Result<(), MessagingError> {
        self.send(Message::new(payload))
    }

    /// Send to `channel`. A send that times out or is vetoed is a delivery failure.
    pub fn send_to(&self, channel: &dyn MessageChannel, message: Message) -> Result<(), MessagingError> {
        if channel.send_timeout(message.clone(), self.send_timeout)? {
            Ok(())
        } else {
            Err(MessagingError::delivery(
                message,
                channel.name(),
                format!("message not sent within {:?}", self.send_timeout),
            ))
        }
    }

    /// Receive from the default channel
    pub fn receive(&self) -> Result<Option<Message>, MessagingError> {
        let channel = self.required_default()?;
        self.receive_from(channel.as_ref())
    }

    /// Receive from `channel`, which must be a pull channel
    pub fn receive_from(&self, channel: &dyn MessageChannel) -> Result<Option<Message>, MessagingError> {
        let pollable = pollable(channel)?;
        Ok(pollable.receive_timeout(self.receive_timeout))
    }

    /// Request/reply against the default channel
    pub fn send_and_receive(&self, request: Message) -> Result<Option<Message>, MessagingError> {
        let channel = self.required_default()?;
        self.send_and_receive_to(channel.as_ref(), request)
    }

    /// Send `request` with a temporary single-slot reply channel and wait for
    /// the reply. `Ok(None)` means no reply arrived within the receive timeout.
    pub fn send_and_receive_to(
        &self,
        channel: &dyn MessageChannel,
        request: Message,
    ) -> Result<Option<Message>, MessagingError> {
        let reply_channel: Arc<dyn MessageChannel> = Arc::new(QueueChannel::with_capacity(
            format!("{}.reply", channel.name()),
            1,
        )?);
        let request = MessageBuilder::from_message(&request)
            .preserve_identity()
            .reply_channel(Arc::clone(&reply_channel))
            .build();

        self.send_to(channel, request)?;
        let reply = pollable(reply_channel.as_ref())?.receive_timeout(self.receive_timeout);
        if reply.is_none() {
            tracing::debug!(channel = channel.name(), "no reply received");
        }
        Ok(reply)
    }
}

fn pollable(channel: &dyn MessageChannel) -> Result<&dyn PollableChannel, MessagingError> {
    channel.as_pollable().ok_or_else(|| {
        MessagingError::invalid_config(format!(
            "channel '{}' is not pollable; receive requires a queue-type channel",
            channel.name()
        ))
    })
}
