//! Window-system queries used to decide which window's input is captured.
//!
//! On Windows the foreground window is inspected through Win32 and on macOS
//! through Quartz Window Services. Other platforms get an inert
//! implementation that never reports a window, which makes capture degrade
//! to "nothing matches" instead of failing.

pub mod types;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub mod noop;

pub use types::{sort_windows, ForegroundInfo, WindowSummary};

#[cfg(target_os = "windows")]
pub use self::windows::Win32Windows;

/// Platform-agnostic window query type alias
#[cfg(target_os = "windows")]
pub type SystemWindows = Win32Windows;

#[cfg(target_os = "macos")]
pub use macos::MacWindows;

/// Platform-agnostic window query type alias
#[cfg(target_os = "macos")]
pub type SystemWindows = MacWindows;

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub use noop::NoopWindows;

/// Platform-agnostic window query type alias
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub type SystemWindows = NoopWindows;

/// Access to the window manager.
///
/// Implementations must not fail: any error is reported as "no window" /
/// "no windows".
pub trait WindowQuery: Send + Sync {
    /// Describe the currently focused top-level window.
    fn foreground(&self) -> ForegroundInfo;

    /// Visible, titled top-level windows sorted by process then title.
    fn list_windows(&self) -> Vec<WindowSummary>;

    /// Bring the window with the given handle to the front.
    fn focus(&self, _hwnd: &str) -> bool {
        false
    }
}
