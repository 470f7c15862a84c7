use super::{ChannelCore, ConfigurableChannel, MessageChannel, PollableChannel};
use crate::support::wait_while;
use crate::{Message, MessageSelector, MessagingError, Timeout};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// FIFO buffer between producers and consumers.
///
/// A bounded queue applies backpressure: `send` waits for space according to
/// its timeout. `receive` waits for a message the same way.
#[derive(Debug)]
pub struct QueueChannel {
    core: ChannelCore,
    queue: Mutex<VecDeque<Message>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

impl QueueChannel {
    /// Unbounded queue
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name, None)
    }

    /// Queue holding at most `capacity` messages
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Result<Self, MessagingError> {
        if capacity == 0 {
            return Err(MessagingError::invalid_config(
                "queue capacity must be greater than 0",
            ));
        }
        Ok(Self::build(name, Some(capacity)))
    }

    fn build(name: impl Into<String>, capacity: Option<usize>) -> Self {
        Self {
            core: ChannelCore::new(name),
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn queue_size(&self) -> usize {
        self.queue.lock().len()
    }

    /// Free slots; `usize::MAX` for an unbounded queue
    pub fn remaining_capacity(&self) -> usize {
        match self.capacity {
            Some(capacity) => capacity.saturating_sub(self.queue_size()),
            None => usize::MAX,
        }
    }

    /// Remove and return every buffered message
    pub fn clear(&self) -> Vec<Message> {
        let drained: Vec<Message> = self.queue.lock().drain(..).collect();
        if !drained.is_empty() {
            self.not_full.notify_all();
        }
        drained
    }

    /// Remove and return the buffered messages `selector` does not accept
    pub fn purge(&self, selector: &dyn MessageSelector) -> Vec<Message> {
        let mut queue = self.queue.lock();
        let mut purged = Vec::new();
        queue.retain(|message| {
            if selector.accept(message) {
                true
            } else {
                purged.push(message.clone());
                false
            }
        });
        drop(queue);
        if !purged.is_empty() {
            tracing::debug!(channel = self.core.name(), purged = purged.len(), "purged messages");
            self.not_full.notify_all();
        }
        purged
    }

    fn enqueue(&self, message: Message, timeout: Timeout) -> bool {
        let mut queue = self.queue.lock();
        if let Some(capacity) = self.capacity {
            if !wait_while(&self.not_full, &mut queue, timeout, |q| q.len() >= capacity) {
                tracing::trace!(channel = self.core.name(), "queue full, message not sent");
                return false;
            }
        }
        queue.push_back(message);
        drop(queue);
        self.not_empty.notify_one();
        true
    }

    fn dequeue(&self, timeout: Timeout) -> Option<Message> {
        let mut queue = self.queue.lock();
        if !wait_while(&self.not_empty, &mut queue, timeout, |q| q.is_empty()) {
            return None;
        }
        let message = queue.pop_front();
        drop(queue);
        self.not_full.notify_one();
        message
    }
}

impl ConfigurableChannel for QueueChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl MessageChannel for QueueChannel {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn send_timeout(&self, message: Message, timeout: Timeout) -> Result<bool, MessagingError> {
        self.core
            .send(self, message, timeout, |message, timeout| Ok(self.enqueue(message, timeout)))
    }

    fn as_configurable(&self) -> Option<&dyn ConfigurableChannel> {
        Some(self)
    }

    fn as_pollable(&self) -> Option<&dyn PollableChannel> {
        Some(self)
    }
}

impl PollableChannel for QueueChannel {
    fn receive_timeout(&self, timeout: Timeout) -> Option<Message> {
        self.core
            .receive(self, timeout, |timeout| self.dequeue(timeout))
    }
}
