use crate::interrupt::{self, POLL_INTERVAL};
use crate::Timeout;
use parking_lot::{Condvar, MutexGuard};
use std::time::Instant;

/// Block on `condvar` while `blocked` holds for the guarded state.
///
/// Returns `true` once `blocked` is false (the guard is still held), or
/// `false` when the timeout elapses or the calling thread is interrupted.
/// Waits are sliced by [`POLL_INTERVAL`] so interrupts are noticed promptly.
pub(crate) fn wait_while<T>(
    condvar: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    timeout: Timeout,
    mut blocked: impl FnMut(&mut T) -> bool,
) -> bool {
    let deadline = timeout.deadline();
    loop {
        if !blocked(&mut **guard) {
            return true;
        }
        if !timeout.is_blocking() || interrupt::is_interrupted() {
            return false;
        }

        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                (deadline - now).min(POLL_INTERVAL)
            }
            None => POLL_INTERVAL,
        };
        condvar.wait_for(guard, slice);
    }
}
