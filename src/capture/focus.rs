//! Periodic check that the target window still has focus.
//!
//! Key-up events are lost when focus moves elsewhere mid-press (the release
//! lands in another window and is filtered out). Clearing on focus loss
//! keeps the overlay from showing stuck keys.

use super::Pipeline;
use crate::worker::{join_with_timeout, DEFAULT_JOIN_TIMEOUT};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const DEFAULT_FOCUS_INTERVAL: Duration = Duration::from_millis(100);

/// Background thread running [`Pipeline::check_focus`] on a fixed interval.
pub struct FocusWatcher {
    stop: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl FocusWatcher {
    pub fn spawn(pipeline: Pipeline, interval: Duration) -> std::io::Result<Self> {
        // Dropping the sender wakes the thread immediately.
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("keyqueue-focus".to_string())
            .spawn(move || {
                tracing::debug!(?interval, "Focus watcher started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            pipeline.check_focus();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("Focus watcher stopped");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            thread_handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.thread_handle.take() {
            join_with_timeout(handle, DEFAULT_JOIN_TIMEOUT, "Focus watcher");
        }
    }
}

impl Drop for FocusWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeWindows;
    use crate::collector::RawKeyEvent;
    use crate::hub::{notifier, PushMessage};
    use crate::keys::PressedKeySet;
    use crate::target::{shared_target, TargetConfig, TargetMode};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_watcher_clears_after_focus_loss() {
        let windows = Arc::new(FakeWindows::focused("notepad.exe"));
        let (notifier, mut rx) = notifier();
        let pipeline = Pipeline {
            keys: Arc::new(PressedKeySet::new()),
            target: shared_target(TargetConfig::new(
                TargetMode::Process,
                Some("notepad.exe".to_string()),
            )),
            windows: windows.clone(),
            notifier,
        };
        let keys = pipeline.keys.clone();

        pipeline.handle_event(&RawKeyEvent::down("b", Some(48)));
        assert_eq!(rx.try_recv().unwrap(), PushMessage::Keys(vec!["B".into()]));

        let mut watcher = FocusWatcher::spawn(pipeline, Duration::from_millis(10)).unwrap();
        windows.focus_process("explorer.exe");

        let deadline = Instant::now() + Duration::from_secs(2);
        while !keys.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        // Give the watcher a few more ticks to prove it stays quiet.
        thread::sleep(Duration::from_millis(50));
        watcher.stop();

        assert!(keys.is_empty());
        assert_eq!(rx.try_recv().unwrap(), PushMessage::cleared());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_is_prompt_with_long_interval() {
        let (notifier, _rx) = notifier();
        let pipeline = Pipeline {
            keys: Arc::new(PressedKeySet::new()),
            target: shared_target(TargetConfig::default()),
            windows: Arc::new(FakeWindows::default()),
            notifier,
        };

        let mut watcher = FocusWatcher::spawn(pipeline, Duration::from_secs(60)).unwrap();
        assert!(watcher.is_running());

        let started = Instant::now();
        watcher.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!watcher.is_running());
    }
}
