use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Chooses where a unicast dispatch starts in the handler snapshot
pub trait LoadBalancingStrategy: Send + Sync + Debug {
    /// Index of the first handler to try, in `0..handler_count`
    fn next_start(&self, handler_count: usize) -> usize;
}

/// Rotates the starting handler on every dispatch
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    cursor: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor position (number of dispatches started)
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

impl LoadBalancingStrategy for RoundRobinStrategy {
    fn next_start(&self, handler_count: usize) -> usize {
        if handler_count == 0 {
            return 0;
        }
        self.cursor.fetch_add(1, Ordering::Relaxed) % handler_count
    }
}

/// Always starts with the first handler; later handlers only see a message
/// when earlier ones reject it
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstAvailableStrategy;

impl LoadBalancingStrategy for FirstAvailableStrategy {
    fn next_start(&self, _handler_count: usize) -> usize {
        0
    }
}
