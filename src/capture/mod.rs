//! Turning raw hook events into held-key state.
//!
//! ```text
//! collector thread ──▶ [bounded queue] ──▶ CaptureSource thread
//!                                               │ foreground + target match
//!                                               ▼
//!                                        PressedKeySet ──▶ Notifier
//!                                               ▲
//!                       FocusWatcher thread ────┘ (clear on focus loss)
//! ```

pub mod focus;

pub use focus::{FocusWatcher, DEFAULT_FOCUS_INTERVAL};

use crate::collector::{KeyAction, RawKeyEvent};
use crate::hub::{Notifier, PushMessage};
use crate::keys::{KeyChange, KeyIdentity, PressedKeySet};
use crate::target::{current_target, SharedTarget};
use crate::window::WindowQuery;
use crate::worker::{join_with_timeout, DEFAULT_JOIN_TIMEOUT};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the capture thread waits for an event before rechecking its
/// stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the capture and focus threads share.
#[derive(Clone)]
pub struct Pipeline {
    pub keys: Arc<PressedKeySet>,
    pub target: SharedTarget,
    pub windows: Arc<dyn WindowQuery>,
    pub notifier: Notifier,
}

impl Pipeline {
    /// Apply one raw event. Returns whether the held-key state changed.
    ///
    /// Events arriving while the target window is not focused are ignored.
    pub fn handle_event(&self, event: &RawKeyEvent) -> bool {
        let foreground = self.windows.foreground();
        if !current_target(&self.target).matches(&foreground) {
            return false;
        }

        let key = KeyIdentity::from_raw(event.scan_code, &event.name);
        let change = match event.action {
            KeyAction::Down => KeyChange::Press(key.id, key.label),
            KeyAction::Up => KeyChange::Release(key.id),
        };

        self.keys.apply_then(change, |keys| {
            tracing::debug!(?keys, "Key state changed");
            self.notifier.notify(PushMessage::Keys(keys));
        })
    }

    /// Drop held keys if the target window lost focus.
    ///
    /// Returns true only on the tick that actually cleared something, so a
    /// focus loss produces a single push.
    pub fn check_focus(&self) -> bool {
        let foreground = self.windows.foreground();
        if current_target(&self.target).matches(&foreground) {
            return false;
        }

        self.keys.apply_then(KeyChange::Clear, |_| {
            tracing::debug!("Target lost focus, cleared held keys");
            self.notifier.notify(PushMessage::cleared());
        })
    }
}

/// Background thread feeding collector events into a [`Pipeline`].
pub struct CaptureSource {
    stop: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CaptureSource {
    /// Start consuming `events` until stopped or the collector goes away.
    pub fn spawn(pipeline: Pipeline, events: Receiver<RawKeyEvent>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("keyqueue-capture".to_string())
            .spawn(move || run_capture_loop(pipeline, events, stop_flag))?;

        Ok(Self {
            stop,
            thread_handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            join_with_timeout(handle, DEFAULT_JOIN_TIMEOUT, "Capture");
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture_loop(pipeline: Pipeline, events: Receiver<RawKeyEvent>, stop: Arc<AtomicBool>) {
    tracing::debug!("Capture thread started");
    while !stop.load(Ordering::SeqCst) {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                pipeline.handle_event(&event);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("Collector queue closed");
                break;
            }
        }
    }
    tracing::debug!("Capture thread stopped");
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::window::{ForegroundInfo, WindowQuery, WindowSummary};
    use std::sync::RwLock;

    /// Window query whose foreground window can be swapped at runtime.
    #[derive(Default)]
    pub struct FakeWindows {
        foreground: RwLock<ForegroundInfo>,
    }

    impl FakeWindows {
        pub fn focused(process: &str) -> Self {
            let fake = Self::default();
            fake.focus_process(process);
            fake
        }

        pub fn focus_process(&self, process: &str) {
            *self.foreground.write().unwrap() = ForegroundInfo {
                hwnd: Some("100".to_string()),
                title: Some(format!("{process} window")),
                pid: Some("1".to_string()),
                process_name: Some(process.to_string()),
                class: Some("FakeClass".to_string()),
            };
        }
    }

    impl WindowQuery for FakeWindows {
        fn foreground(&self) -> ForegroundInfo {
            self.foreground.read().unwrap().clone()
        }

        fn list_windows(&self) -> Vec<WindowSummary> {
            Vec::new()
        }
    }
}
