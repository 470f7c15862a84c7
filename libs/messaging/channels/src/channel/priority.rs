use super::{ChannelCore, ConfigurableChannel, MessageChannel, PollableChannel};
use crate::support::{wait_while, Permits};
use crate::{Message, MessageSelector, MessagingError, Timeout};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Debug;
use std::sync::Arc;

/// Orders messages in a [`PriorityChannel`]; `Greater` is received first
pub trait MessageComparator: Send + Sync + Debug {
    fn compare(&self, a: &Message, b: &Message) -> Ordering;
}

/// Orders by the priority header; equal priorities keep send order
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityComparator;

impl MessageComparator for PriorityComparator {
    fn compare(&self, a: &Message, b: &Message) -> Ordering {
        a.priority().cmp(&b.priority())
    }
}

struct Entry {
    message: Message,
    sequence: u64,
    comparator: Arc<dyn MessageComparator>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: earlier sequence wins ties
        self.comparator
            .compare(&self.message, &other.message)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Default)]
struct Heap {
    entries: BinaryHeap<Entry>,
    next_sequence: u64,
}

/// Queue that hands out the highest-priority message first.
///
/// Capacity is enforced with permits: a sender takes one before inserting and
/// a receiver returns one after removing.
#[derive(Debug)]
pub struct PriorityChannel {
    core: ChannelCore,
    heap: Mutex<Heap>,
    not_empty: Condvar,
    permits: Option<Permits>,
    comparator: Arc<dyn MessageComparator>,
}

impl Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap").field("len", &self.entries.len()).finish()
    }
}

impl PriorityChannel {
    /// Unbounded channel ordered by the priority header
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name, None, Arc::new(PriorityComparator))
    }

    /// Bounded channel ordered by the priority header
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Result<Self, MessagingError> {
        Self::with_comparator(name, Some(capacity), Arc::new(PriorityComparator))
    }

    pub fn with_comparator(
        name: impl Into<String>,
        capacity: Option<usize>,
        comparator: Arc<dyn MessageComparator>,
    ) -> Result<Self, MessagingError> {
        if capacity == Some(0) {
            return Err(MessagingError::invalid_config(
                "priority channel capacity must be greater than 0",
            ));
        }
        Ok(Self::build(name, capacity, comparator))
    }

    fn build(
        name: impl Into<String>,
        capacity: Option<usize>,
        comparator: Arc<dyn MessageComparator>,
    ) -> Self {
        Self {
            core: ChannelCore::new(name),
            heap: Mutex::new(Heap::default()),
            not_empty: Condvar::new(),
            permits: capacity.map(Permits::new),
            comparator,
        }
    }

    pub fn queue_size(&self) -> usize {
        self.heap.lock().entries.len()
    }

    /// Free slots; `usize::MAX` for an unbounded channel
    pub fn remaining_capacity(&self) -> usize {
        self.permits.as_ref().map_or(usize::MAX, Permits::available)
    }

    /// Remove and return every buffered message, highest priority first
    pub fn clear(&self) -> Vec<Message> {
        let entries = std::mem::take(&mut self.heap.lock().entries);
        let cleared: Vec<Message> = entries
            .into_sorted_vec()
            .into_iter()
            .rev()
            .map(|entry| entry.message)
            .collect();
        self.release(cleared.len());
        cleared
    }

    /// Remove and return the buffered messages `selector` does not accept
    pub fn purge(&self, selector: &dyn MessageSelector) -> Vec<Message> {
        let mut heap = self.heap.lock();
        let mut purged = Vec::new();
        heap.entries.retain(|entry| {
            if selector.accept(&entry.message) {
                true
            } else {
                purged.push(entry.message.clone());
                false
            }
        });
        drop(heap);
        self.release(purged.len());
        purged
    }

    fn release(&self, count: usize) {
        if let Some(permits) = &self.permits {
            permits.release(count);
        }
    }

    fn enqueue(&self, message: Message, timeout: Timeout) -> bool {
        if let Some(permits) = &self.permits {
            if !permits.acquire(timeout) {
                tracing::trace!(channel = self.core.name(), "priority channel full, message not sent");
                return false;
            }
        }
        let mut heap = self.heap.lock();
        let sequence = heap.next_sequence;
        heap.next_sequence += 1;
        heap.entries.push(Entry {
            message,
            sequence,
            comparator: Arc::clone(&self.comparator),
        });
        drop(heap);
        self.not_empty.notify_one();
        true
    }

    fn dequeue(&self, timeout: Timeout) -> Option<Message> {
        let mut heap = self.heap.lock();
        if !wait_while(&self.not_empty, &mut heap, timeout, |h| h.entries.is_empty()) {
            return None;
        }
        let entry = heap.entries.pop();
        drop(heap);
        if entry.is_some() {
            self.release(1);
        }
        entry.map(|entry| entry.message)
    }
}

impl ConfigurableChannel for PriorityChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl MessageChannel for PriorityChannel {
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

impl PollableChannel for PriorityChannel {
    fn receive_timeout(&self, timeout: Timeout) -> Option<Message> {
        self.core
            .receive(self, timeout, |timeout| self.dequeue(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageBuilder, MessagePriority};
    use std::time::Duration;

    fn prioritized(value: i64, priority: MessagePriority) -> Message {
        MessageBuilder::with_payload(value).priority(priority).build()
    }

    fn drain(channel: &PriorityChannel) -> Vec<i64> {
        std::iter::from_fn(|| channel.receive_timeout(Timeout::Immediate))
            .map(|m| *m.payload_as::<i64>().unwrap())
            .collect()
    }

    #[test]
    fn test_highest_priority_first() {
        let channel = PriorityChannel::new("prio");
        channel.send(prioritized(1, MessagePriority::Low)).unwrap();
        channel.send(prioritized(2, MessagePriority::Highest)).unwrap();
        channel.send(prioritized(3, MessagePriority::Normal)).unwrap();
        channel.send(prioritized(4, MessagePriority::High)).unwrap();

        assert_eq!(drain(&channel), vec![2, 4, 3, 1]);
    }

    #[test]
    fn test_equal_priority_keeps_send_order() {
        let channel = PriorityChannel::new("fifo-ties");
        for i in 0..10 {
            channel.send(prioritized(i, MessagePriority::Normal)).unwrap();
        }
        assert_eq!(drain(&channel), (0..10).collect::<Vec<_>>());
    }

    #[derive(Debug)]
    struct SmallestFirst;

    impl MessageComparator for SmallestFirst {
        fn compare(&self, a: &Message, b: &Message) -> Ordering {
            b.payload_as::<i64>().cmp(&a.payload_as::<i64>())
        }
    }

    #[test]
    fn test_custom_comparator() {
        let channel = PriorityChannel::with_comparator("custom", None, Arc::new(SmallestFirst)).unwrap();
        for value in [5, 1, 4, 2, 3] {
            channel.send(Message::new(value as i64)).unwrap();
        }
        assert_eq!(drain(&channel), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_capacity_applies_backpressure() {
        let channel = PriorityChannel::with_capacity("bounded", 2).unwrap();
        assert!(channel.send(prioritized(1, MessagePriority::Low)).unwrap());
        assert!(channel.send(prioritized(2, MessagePriority::Low)).unwrap());
        assert!(!channel
            .send_timeout(prioritized(3, MessagePriority::Highest), Timeout::After(Duration::from_millis(20)))
            .unwrap());

        channel.receive_timeout(Timeout::Immediate).unwrap();
        assert_eq!(channel.remaining_capacity(), 1);
        assert!(channel.send_timeout(prioritized(3, MessagePriority::Highest), Timeout::Immediate).unwrap());
    }

    #[test]
    fn test_clear_and_purge_release_capacity() {
        let channel = PriorityChannel::with_capacity("bounded", 4).unwrap();
        for i in 0..4 {
            channel.send(Message::new(i as i64)).unwrap();
        }

        let odd = |m: &Message| m.payload_as::<i64>().is_some_and(|n| n % 2 == 1);
        assert_eq!(channel.purge(&odd).len(), 2);
        assert_eq!(channel.remaining_capacity(), 2);

        assert_eq!(channel.clear().len(), 2);
        assert_eq!(channel.remaining_capacity(), 4);
        assert_eq!(channel.queue_size(), 0);
    }

    #[test]
    fn test_max_duration_send_waits_until_interrupted() {
        let channel = Arc::new(PriorityChannel::with_capacity("bounded", 1).unwrap());
        channel.send(prioritized(1, MessagePriority::Low)).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let producer = {
            let channel = channel.clone();
            std::thread::spawn(move || {
                tx.send(crate::interrupt::InterruptHandle::current()).unwrap();
                channel
                    .send_timeout(prioritized(2, MessagePriority::High), Timeout::After(Duration::MAX))
                    .unwrap()
            })
        };

        let handle = rx.recv().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        handle.interrupt();
        assert!(!producer.join().unwrap());
        assert_eq!(drain(&channel), vec![1]);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(PriorityChannel::with_capacity("bad", 0).is_err());
    }
}
