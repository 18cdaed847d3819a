//! Coalescing refresh signal.
//!
//! Binary-semaphore semantics over `Mutex<bool>` + `Condvar`: any number
//! of `notify()` calls between two waits collapse into a single wakeup,
//! so a slow strip transmission never builds a queue of stale refreshes.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct RefreshSignal {
    pending: Mutex<bool>,
    cv: Condvar,
}

impl RefreshSignal {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Mark a refresh pending and wake the consumer. Idempotent while a
    /// refresh is already pending.
    pub fn notify(&self) {
        let mut pending = self.pending.lock().unwrap();
        *pending = true;
        self.cv.notify_one();
    }

    /// Wait up to `timeout` for a pending refresh. Returns `true` and
    /// clears the flag if one was pending.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock().unwrap();
        while !*pending {
            let (guard, res) = self.cv.wait_timeout(pending, timeout).unwrap();
            pending = guard;
            if res.timed_out() {
                break;
            }
        }
        let was = *pending;
        *pending = false;
        was
    }
}

impl Default for RefreshSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn notify_before_wait_is_consumed() {
        let s = RefreshSignal::new();
        s.notify();
        assert!(s.wait_timeout(Duration::from_millis(1)));
        assert!(!s.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn notifies_coalesce() {
        let s = RefreshSignal::new();
        s.notify();
        s.notify();
        s.notify();
        assert!(s.wait_timeout(Duration::from_millis(1)));
        assert!(!s.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn wait_times_out_without_notify() {
        let s = RefreshSignal::new();
        assert!(!s.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn cross_thread_wakeup() {
        let s = Arc::new(RefreshSignal::new());
        let s2 = Arc::clone(&s);
        let t = std::thread::spawn(move || s2.wait_timeout(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        s.notify();
        assert!(t.join().unwrap());
    }
}
