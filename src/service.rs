//! Lifecycle of the background capture threads.

use crate::capture::{CaptureSource, FocusWatcher, Pipeline, DEFAULT_FOCUS_INTERVAL};
use crate::collector::{Collector, RawKeyEvent};
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Capture state reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    Running,
    Stopped,
    /// The OS hook could not be installed
    Unavailable,
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaptureStatus::Running => "running",
            CaptureStatus::Stopped => "stopped",
            CaptureStatus::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Install the OS keyboard hook
    pub capture: bool,
    pub focus_interval: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            capture: true,
            focus_interval: DEFAULT_FOCUS_INTERVAL,
        }
    }
}

/// Owns the collector, the capture thread and the focus watcher.
pub struct CaptureService {
    collector: Option<Collector>,
    capture: Option<CaptureSource>,
    focus: Option<FocusWatcher>,
    status: CaptureStatus,
}

impl CaptureService {
    /// A service with nothing running.
    pub fn stopped() -> Self {
        Self {
            collector: None,
            capture: None,
            focus: None,
            status: CaptureStatus::Stopped,
        }
    }

    /// Install the platform hook and start the capture threads.
    ///
    /// Hook failures are logged and reported as [`CaptureStatus::Unavailable`];
    /// they never abort the server.
    pub fn start(pipeline: Pipeline, options: &ServiceOptions) -> Self {
        if !options.capture {
            tracing::info!("Keyboard capture disabled");
            return Self::stopped();
        }

        let mut collector = Collector::new();
        if let Err(e) = collector.start() {
            tracing::warn!("Keyboard capture unavailable: {e}");
            let mut service = Self::stopped();
            service.status = CaptureStatus::Unavailable;
            return service;
        }

        let events = collector.receiver().clone();
        let mut service = Self::from_receiver(pipeline, events, options.focus_interval);
        service.collector = Some(collector);
        service
    }

    /// Start the capture threads on an existing event queue.
    pub fn from_receiver(
        pipeline: Pipeline,
        events: Receiver<RawKeyEvent>,
        focus_interval: Duration,
    ) -> Self {
        let mut service = Self::stopped();

        match CaptureSource::spawn(pipeline.clone(), events) {
            Ok(capture) => service.capture = Some(capture),
            Err(e) => {
                tracing::warn!("Failed to spawn capture thread: {e}");
                service.status = CaptureStatus::Unavailable;
                return service;
            }
        }

        match FocusWatcher::spawn(pipeline, focus_interval) {
            Ok(focus) => service.focus = Some(focus),
            Err(e) => tracing::warn!("Failed to spawn focus watcher: {e}"),
        }

        service.status = CaptureStatus::Running;
        tracing::info!("Keyboard capture running");
        service
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    /// Stop every background thread, waiting a bounded time for each.
    pub fn stop(&mut self) {
        if let Some(mut collector) = self.collector.take() {
            collector.stop();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut focus) = self.focus.take() {
            focus.stop();
        }
        if self.status == CaptureStatus::Running {
            tracing::info!("Keyboard capture stopped");
            self.status = CaptureStatus::Stopped;
        }
    }
}

impl Drop for CaptureService {
    fn drop(&mut self) {
        self.stop();
    }
}
