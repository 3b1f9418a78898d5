//! Global keyboard hooks.
//!
//! Each platform collector runs the OS hook on a dedicated thread and hands
//! [`RawKeyEvent`]s to a bounded queue. When the queue is full the event is
//! dropped; the hook never blocks.

pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub mod noop;

pub use types::{KeyAction, RawKeyEvent};

/// Capacity of the queue between the hook thread and the capture thread.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

#[cfg(target_os = "macos")]
pub use macos::{check_permission, CollectorError, MacOSCollector};

/// Platform-agnostic collector type alias
#[cfg(target_os = "macos")]
pub type Collector = MacOSCollector;

#[cfg(target_os = "windows")]
pub use self::windows::{check_permission, CollectorError, WindowsCollector};

/// Platform-agnostic collector type alias
#[cfg(target_os = "windows")]
pub type Collector = WindowsCollector;

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub use noop::{check_permission, CollectorError, NoopCollector};

/// Platform-agnostic collector type alias
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub type Collector = NoopCollector;
