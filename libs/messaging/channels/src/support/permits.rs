use super::wait_while;
use crate::Timeout;
use parking_lot::{Condvar, Mutex};

/// Counting semaphore used for capacity admission
#[derive(Debug)]
pub(crate) struct Permits {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl Permits {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        }
    }

    /// Take one permit, waiting according to `timeout`
    pub(crate) fn acquire(&self, timeout: Timeout) -> bool {
        let mut available = self.available.lock();
        if !wait_while(&self.released, &mut available, timeout, |n| *n == 0) {
            return false;
        }
        *available -= 1;
        true
    }

    pub(crate) fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut available = self.available.lock();
        *available = (*available + count).min(self.capacity);
        drop(available);
        if count == 1 {
            self.released.notify_one();
        } else {
            self.released.notify_all();
        }
    }

    pub(crate) fn available(&self) -> usize {
        *self.available.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_acquire_and_release() {
        let permits = Permits::new(2);
        assert!(permits.acquire(Timeout::Immediate));
        assert!(permits.acquire(Timeout::Immediate));
        assert!(!permits.acquire(Timeout::Immediate));
        assert_eq!(permits.available(), 0);

        permits.release(1);
        assert_eq!(permits.available(), 1);
        assert!(permits.acquire(Timeout::Immediate));
    }

    #[test]
    fn test_release_never_exceeds_capacity() {
        let permits = Permits::new(1);
        permits.release(5);
        assert_eq!(permits.available(), 1);
    }

    #[test]
    fn test_blocked_acquire_wakes_on_release() {
        let permits = Arc::new(Permits::new(1));
        assert!(permits.acquire(Timeout::Immediate));

        let releaser = Arc::clone(&permits);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            releaser.release(1);
        });

        assert!(permits.acquire(Timeout::Indefinite));
        handle.join().unwrap();
    }

    #[test]
    fn test_bounded_acquire_times_out() {
        let permits = Permits::new(1);
        assert!(permits.acquire(Timeout::Immediate));
        assert!(!permits.acquire(Timeout::from_millis(20)));
    }
}
