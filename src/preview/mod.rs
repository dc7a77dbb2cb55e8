//! Speculative preview execution: a sandboxed worker process that mirrors
//! the shell namespace and evaluates the input line as it is typed, plus
//! the supervisor that keeps it alive.

pub mod protocol;
pub mod supervisor;
pub mod worker;

pub use supervisor::Supervisor;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// One-shot timer that fires an action unless cancelled first. Used for
/// the worker's interrupt tier and the supervisor's restart tier.
pub struct CancelTimer {
    tx: mpsc::Sender<()>,
}

impl CancelTimer {
    pub fn arm<F>(after: Duration, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            // only a real timeout fires; a cancel message or a dropped
            // sender disarms
            if let Err(mpsc::RecvTimeoutError::Timeout) = rx.recv_timeout(after) {
                action();
            }
        });
        Self { tx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(());
    }
}

impl Drop for CancelTimer {
    fn drop(&mut self) {
        let _ = self.tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn timer_fires_after_timeout() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let _timer = CancelTimer::arm(Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(120));
        assert!(fired.load(Ordering::SeqCst), "timer should have fired");
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let timer = CancelTimer::arm(Duration::from_millis(30), move || {
            flag.store(true, Ordering::SeqCst);
        });
        timer.cancel();
        thread::sleep(Duration::from_millis(120));
        assert!(!fired.load(Ordering::SeqCst), "cancelled timer must stay quiet");
    }
}
