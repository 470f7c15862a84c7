//! Handlers and interceptors for tests
//!
//! Public so that downstream crates can test their own wiring with them.

use crate::{
    BoxError, ChannelInterceptor, ErrorHandler, HandleOutcome, Message, MessageChannel,
    MessageHandler, MessagingError,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

/// Poll `done` until it holds or `timeout` elapses
fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Error raised by [`FailingHandler`] and a failing [`CollectingHandler`]
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TestFailure(pub String);

/// A handler that records every message it accepts, and the thread it ran on
#[derive(Debug)]
pub struct CollectingHandler {
    name: String,
    messages: Mutex<Vec<Message>>,
    threads: Mutex<Vec<ThreadId>>,
    fail_on_handle: AtomicBool,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::with_name("test-collector")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            fail_on_handle: AtomicBool::new(false),
        }
    }

    /// Get all received messages
    pub fn received_messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    /// Threads the handler ran on, one entry per message
    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().clone()
    }

    pub fn clear_messages(&self) {
        self.messages.lock().clear();
        self.threads.lock().clear();
    }

    /// Make subsequent calls fail instead of recording
    pub fn set_fail_on_handle(&self, fail: bool) {
        self.fail_on_handle.store(fail, Ordering::Relaxed);
    }

    /// Wait until at least `count` messages were received
    pub fn wait_for_messages(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.message_count() >= count)
    }
}

impl Default for CollectingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for CollectingHandler {
    fn handle(&self, message: &Message) -> Result<HandleOutcome, BoxError> {
        if self.fail_on_handle.load(Ordering::Relaxed) {
            return Err(Box::new(TestFailure(format!("{} configured to fail", self.name))));
        }
        self.threads.lock().push(std::thread::current().id());
        self.messages.lock().push(message.clone());
        Ok(HandleOutcome::Accepted)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A handler that rejects everything and counts how often it was asked
#[derive(Debug, Default)]
pub struct RejectingHandler {
    rejections: AtomicUsize,
}

impl RejectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejection_count(&self) -> usize {
        self.rejections.load(Ordering::SeqCst)
    }
}

impl MessageHandler for RejectingHandler {
    fn handle(&self, _message: &Message) -> Result<HandleOutcome, BoxError> {
        self.rejections.fetch_add(1, Ordering::SeqCst);
        Ok(HandleOutcome::Rejected)
    }

    fn name(&self) -> &str {
        "rejecting"
    }
}

/// A handler that always fails with [`TestFailure`]
#[derive(Debug)]
pub struct FailingHandler {
    reason: String,
    failures: AtomicUsize,
}

impl FailingHandler {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl MessageHandler for FailingHandler {
    fn handle(&self, _message: &Message) -> Result<HandleOutcome, BoxError> {
        self.failures.fetch_add(1, Ordering::SeqCst);
        Err(Box::new(TestFailure(self.reason.clone())))
    }

    fn name(&self) -> &str {
        &self.reason
    }
}

/// Error handler that keeps every failure it is given
#[derive(Debug, Default)]
pub struct CollectingErrorHandler {
    errors: Mutex<Vec<MessagingError>>,
}

impl CollectingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<MessagingError> {
        self.errors.lock().clone()
    }

    pub fn wait_for_errors(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.errors.lock().len() >= count)
    }
}

impl ErrorHandler for CollectingErrorHandler {
    fn handle_error(&self, error: MessagingError) {
        self.errors.lock().push(error);
    }
}

/// Interceptor that records which hooks ran, optionally vetoing
#[derive(Debug)]
pub struct RecordingInterceptor {
    name: String,
    veto: bool,
    events: Mutex<Vec<String>>,
    shared_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordingInterceptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            veto: false,
            events: Mutex::new(Vec::new()),
            shared_log: None,
        }
    }

    /// Interceptor that vetoes every send and receive
    pub fn vetoing(name: impl Into<String>) -> Self {
        Self {
            veto: true,
            ..Self::new(name)
        }
    }

    /// Also append `"{name}:{hook}"` to `log`, for ordering across interceptors
    pub fn with_shared_log(name: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            shared_log: Some(log),
            ..Self::new(name)
        }
    }

    /// Hooks that ran, in order. `post_send` is recorded with its outcome, e.g. `post_send:false`.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn record(&self, hook: &str) {
        self.events.lock().push(hook.to_string());
        if let Some(log) = &self.shared_log {
            log.lock().push(format!("{}:{hook}", self.name));
        }
    }
}

impl ChannelInterceptor for RecordingInterceptor {
    fn pre_send(&self, message: Message, _channel: &dyn MessageChannel) -> Option<Message> {
        self.record("pre_send");
        (!self.veto).then_some(message)
    }

    fn post_send(&self, _message: &Message, _channel: &dyn MessageChannel, sent: bool) {
        self.record(&format!("post_send:{sent}"));
    }

    fn pre_receive(&self, _channel: &dyn MessageChannel) -> bool {
        self.record("pre_receive");
        !self.veto
    }

    fn post_receive(&self, message: Message, _channel: &dyn MessageChannel) -> Option<Message> {
        self.record("post_receive");
        Some(message)
    }
}
