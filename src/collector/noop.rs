//! Fallback collector for platforms without a supported keyboard hook.
//!
//! Keeps the crate (and binary) compiling on Linux and friends. Starting it
//! always fails, so the server still runs but reports capture as unavailable.

use crate::collector::types::RawKeyEvent;
use crossbeam_channel::{bounded, Receiver};

/// Errors that can occur during event collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    Unsupported,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::Unsupported => {
                write!(f, "Keyboard capture is not supported on this platform")
            }
        }
    }
}

impl std::error::Error for CollectorError {}

/// A collector that never emits events.
pub struct NoopCollector {
    receiver: Receiver<RawKeyEvent>,
}

impl NoopCollector {
    pub fn new() -> Self {
        // The sender is dropped immediately; consumers see a disconnected queue.
        let (_sender, receiver) = bounded(1);
        Self { receiver }
    }

    pub fn start(&mut self) -> Result<(), CollectorError> {
        Err(CollectorError::Unsupported)
    }

    pub fn stop(&mut self) {}

    pub fn is_running(&self) -> bool {
        false
    }

    pub fn receiver(&self) -> &Receiver<RawKeyEvent> {
        &self.receiver
    }
}

impl Default for NoopCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// No permission gate exists when there is nothing to capture.
pub fn check_permission() -> bool {
    true
}
