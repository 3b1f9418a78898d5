//! Helpers for the background threads owned by the service.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long `stop` waits for a background thread before giving up on it.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Join `handle`, waiting at most `timeout`.
///
/// Returns false when the thread did not finish in time; it is then detached
/// and left to exit on its own.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!("{name} thread did not stop within {timeout:?}, detaching");
            return false;
        }
        std::thread::sleep(JOIN_POLL);
    }

    if handle.join().is_err() {
        tracing::warn!("{name} thread panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_finished_thread() {
        let handle = std::thread::spawn(|| {});
        assert!(join_with_timeout(handle, Duration::from_secs(1), "quick"));
    }

    #[test]
    fn test_join_times_out() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let handle = std::thread::spawn(move || {
            let _ = rx.recv();
        });

        assert!(!join_with_timeout(handle, Duration::from_millis(30), "stuck"));
        drop(tx);
    }
}
