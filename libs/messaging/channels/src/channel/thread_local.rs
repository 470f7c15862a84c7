//! Per-thread queue
//!
//! Each thread that touches a [`ThreadLocalChannel`] gets its own unbounded
//! FIFO. A message is only ever visible to the thread that sent it:
//!
//! ```text
//! Thread A: send(a1) send(a2) -> receive() = a1, a2
//! Thread B: send(b1)          -> receive() = b1
//! ```
//!
//! Buffers live in thread-local storage keyed by a per-channel id, so the
//! channel itself needs no locking. Each buffer also holds a weak reference
//! to its channel's liveness token; buffers of dropped channels are pruned
//! the next time the owning thread sends on any thread-local channel.

use super::{ChannelCore, ConfigurableChannel, MessageChannel, PollableChannel};
use crate::{Message, MessagingError, Timeout};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

struct Buffer {
    owner: Weak<()>,
    messages: VecDeque<Message>,
}

thread_local! {
    static QUEUES: RefCell<HashMap<u64, Buffer>> = RefCell::new(HashMap::new());
}

/// Queue channel whose buffer is confined to the calling thread.
///
/// Sends never block and receives never wait: a timeout is accepted for
/// interface compatibility and ignored. Dropping the channel frees the
/// dropping thread's buffer at once; other threads release theirs on their
/// next send to any thread-local channel, or when they exit.
#[derive(Debug)]
pub struct ThreadLocalChannel {
    core: ChannelCore,
    id: u64,
    alive: Arc<()>,
}

impl ThreadLocalChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: ChannelCore::new(name),
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            alive: Arc::new(()),
        }
    }

    /// Messages buffered for the calling thread
    pub fn queue_size(&self) -> usize {
        QUEUES.with(|queues| {
            queues
                .borrow()
                .get(&self.id)
                .map_or(0, |buffer| buffer.messages.len())
        })
    }

    /// Remove and return the calling thread's buffered messages
    pub fn clear(&self) -> Vec<Message> {
        QUEUES.with(|queues| {
            queues
                .borrow_mut()
                .remove(&self.id)
                .map(|buffer| Vec::from(buffer.messages))
                .unwrap_or_default()
        })
    }

    fn enqueue(&self, message: Message) -> bool {
        QUEUES.with(|queues| {
            let mut queues = queues.borrow_mut();
            queues.retain(|_, buffer| buffer.owner.strong_count() > 0);
            queues
                .entry(self.id)
                .or_insert_with(|| Buffer {
                    owner: Arc::downgrade(&self.alive),
                    messages: VecDeque::new(),
                })
                .messages
                .push_back(message)
        });
        true
    }

    fn dequeue(&self) -> Option<Message> {
        QUEUES.with(|queues| {
            let mut queues = queues.borrow_mut();
            let buffer = queues.get_mut(&self.id)?;
            let message = buffer.messages.pop_front();
            if buffer.messages.is_empty() {
                queues.remove(&self.id);
            }
            message
        })
    }
}

impl Drop for ThreadLocalChannel {
    fn drop(&mut self) {
        // Other threads prune their buffers once `alive` is gone
        let id = self.id;
        let _ = QUEUES.try_with(|queues| {
            if let Ok(mut queues) = queues.try_borrow_mut() {
                queues.remove(&id);
            }
        });
    }
}

impl ConfigurableChannel for ThreadLocalChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl MessageChannel for ThreadLocalChannel {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn send_timeout(&self, message: Message, timeout: Timeout) -> Result<bool, MessagingError> {
        self.core
            .send(self, message, timeout, |message, _| Ok(self.enqueue(message)))
    }

    fn as_configurable(&self) -> Option<&dyn ConfigurableChannel> {
        Some(self)
    }

    fn as_pollable(&self) -> Option<&dyn PollableChannel> {
        Some(self)
    }
}

impl PollableChannel for ThreadLocalChannel {
    fn receive_timeout(&self, timeout: Timeout) -> Option<Message> {
        self.core.receive(self, timeout, |_| self.dequeue())
    }
}
