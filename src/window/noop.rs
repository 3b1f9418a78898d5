//! Noop window query for platforms without a supported window system API.
//!
//! Reports no window at all. Every target mode except `disabled` then
//! evaluates to "no match".

use super::{ForegroundInfo, WindowQuery, WindowSummary};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWindows;

impl NoopWindows {
    pub fn new() -> Self {
        Self
    }
}

impl WindowQuery for NoopWindows {
    fn foreground(&self) -> ForegroundInfo {
        ForegroundInfo::none()
    }

    fn list_windows(&self) -> Vec<WindowSummary> {
        Vec::new()
    }
}
