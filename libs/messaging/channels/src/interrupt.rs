//! Cooperative thread interruption
//!
//! Every blocking wait in this crate (capacity waits, empty-queue waits,
//! rejection retry sleeps) checks the calling thread's interrupt flag at
//! least every [`POLL_INTERVAL`]. An interrupted wait ends with `false` or
//! `None` rather than an error. The flag stays set afterwards so the caller
//! can still observe it; [`clear`] resets it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on how long a blocked thread goes without checking its flag
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

thread_local! {
    static INTERRUPTED: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

/// Handle used to interrupt a specific thread from anywhere
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Handle for the calling thread
    pub fn current() -> Self {
        INTERRUPTED.with(|flag| Self {
            flag: Arc::clone(flag),
        })
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Check the calling thread's flag without clearing it
pub fn is_interrupted() -> bool {
    INTERRUPTED.with(|flag| flag.load(Ordering::Acquire))
}

/// Clear the calling thread's flag, returning its previous value
pub fn clear() -> bool {
    INTERRUPTED.with(|flag| flag.swap(false, Ordering::AcqRel))
}

/// Sleep for `duration` unless interrupted. Returns `false` if interrupted.
///
/// A duration past the range of `Instant` sleeps until interrupted.
pub fn sleep(duration: Duration) -> bool {
    let deadline = Instant::now().checked_add(duration);
    loop {
        if is_interrupted() {
            return false;
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                (deadline - now).min(POLL_INTERVAL)
            }
            None => POLL_INTERVAL,
        };
        std::thread::sleep(slice);
    }
}
