//! Shared helpers for channel integration tests

use message_channels::{Message, MessageBuilder, MessagePriority};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// Install a test subscriber once; output only shows for failing tests
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn numbered(value: i64) -> Message {
    Message::new(value)
}

#[allow(dead_code)]
pub fn with_priority(value: i64, priority: MessagePriority) -> Message {
    MessageBuilder::with_payload(value).priority(priority).build()
}

#[allow(dead_code)]
pub fn value_of(message: &Message) -> i64 {
    *message.payload_as::<i64>().expect("i64 payload")
}
