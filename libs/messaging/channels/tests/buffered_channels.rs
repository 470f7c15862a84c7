//! Backpressure, ordering and confinement of the buffered channels

mod common;

use common::{init_tracing, numbered, value_of, with_priority, WAIT};
use message_channels::interrupt::{self, InterruptHandle};
use message_channels::{
    MessageChannel, MessagePriority, PollableChannel, PriorityChannel, QueueChannel,
    ThreadLocalChannel, Timeout,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_capacity_one_queue_blocks_until_drained() {
    init_tracing();
    let channel = Arc::new(QueueChannel::with_capacity("bounded", 1).unwrap());

    assert!(channel.send(numbered(1)).unwrap());
    assert!(!channel.send_timeout(numbered(2), Timeout::Immediate).unwrap());

    let producer = {
        let channel = Arc::clone(&channel);
        std::thread::spawn(move || {
            let started = Instant::now();
            let sent = channel.send(numbered(3)).unwrap();
            (sent, started.elapsed())
        })
    };

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(value_of(&channel.receive().unwrap()), 1);

    let (sent, waited) = producer.join().unwrap();
    assert!(sent);
    assert!(waited >= Duration::from_millis(50));
    assert_eq!(value_of(&channel.receive_timeout(Timeout::Immediate).unwrap()), 3);
}

#[test]
fn test_interrupt_unblocks_send_to_full_queue() {
    let channel = Arc::new(QueueChannel::with_capacity("full", 1).unwrap());
    channel.send(numbered(1)).unwrap();

    let (handle_tx, handle_rx) = crossbeam_channel::bounded(1);
    let producer = {
        let channel = Arc::clone(&channel);
        std::thread::spawn(move || {
            handle_tx.send(InterruptHandle::current()).unwrap();
            let sent = channel.send(numbered(2)).unwrap();
            (sent, interrupt::is_interrupted())
        })
    };

    let handle = handle_rx.recv_timeout(WAIT).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    handle.interrupt();

    assert_eq!(producer.join().unwrap(), (false, true));
    assert_eq!(channel.queue_size(), 1);
}

#[test]
fn test_many_producers_many_consumers_deliver_everything_once() {
    let channel = Arc::new(QueueChannel::with_capacity("shared", 8).unwrap());
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let channel = Arc::clone(&channel);
            std::thread::spawn(move || {
                for i in 0..250 {
                    assert!(channel.send(numbered(p * 1000 + i)).unwrap());
                }
            })
        })
        .collect();
    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let channel = Arc::clone(&channel);
            std::thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(message) = channel.receive_timeout(Timeout::After(Duration::from_millis(500))) {
                    seen.push(value_of(&message));
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let mut all: Vec<i64> = consumers
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .collect();
    all.sort_unstable();

    let mut expected: Vec<i64> = (0..4).flat_map(|p| (0..250).map(move |i| p * 1000 + i)).collect();
    expected.sort_unstable();
    assert_eq!(all, expected);
}

#[test]
fn test_priority_channel_high_overtakes_low() {
    let channel = PriorityChannel::new("prio");
    channel.send(with_priority(1, MessagePriority::Low)).unwrap();
    channel.send(with_priority(2, MessagePriority::High)).unwrap();

    assert_eq!(value_of(&channel.receive().unwrap()), 2);
    assert_eq!(value_of(&channel.receive().unwrap()), 1);
}

#[test]
fn test_bounded_priority_channel_wakes_blocked_sender() {
    let channel = Arc::new(PriorityChannel::with_capacity("prio", 1).unwrap());
    channel.send(with_priority(1, MessagePriority::Low)).unwrap();

    let producer = {
        let channel = Arc::clone(&channel);
        std::thread::spawn(move || {
            channel
                .send_timeout(with_priority(2, MessagePriority::Highest), Timeout::After(WAIT))
                .unwrap()
        })
    };
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(value_of(&channel.receive().unwrap()), 1);
    assert!(producer.join().unwrap());
    assert_eq!(value_of(&channel.receive().unwrap()), 2);
}

#[test]
fn test_thread_local_channel_confines_messages() {
    let channel = Arc::new(ThreadLocalChannel::new("local"));
    channel.send(numbered(10)).unwrap();

    let workers: Vec<_> = (0..3)
        .map(|n| {
            let channel = Arc::clone(&channel);
            std::thread::spawn(move || {
                assert!(channel.receive().is_none());
                channel.send(numbered(n)).unwrap();
                value_of(&channel.receive().unwrap())
            })
        })
        .collect();

    let echoed: Vec<i64> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(echoed, vec![0, 1, 2]);
    assert_eq!(value_of(&channel.receive().unwrap()), 10);
    assert!(channel.receive().is_none());
}
