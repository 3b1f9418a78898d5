//! keyqueue - live held-key overlay server for streaming.
//!
//! Captures global key presses while a chosen window has focus, keeps the
//! ordered set of keys currently held down, and pushes every change to
//! browser overlays over WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                              keyqueue                              │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌────────────┐   ┌───────────┐  │
//! │  │ Collector │──▶│  Capture  │──▶│ PressedKey │──▶│ Broadcast │──▶ /ws
//! │  │ (OS hook) │   │ + target  │   │    Set     │   │    Hub    │  │
//! │  └───────────┘   └───────────┘   └────────────┘   └───────────┘  │
//! │                        ▲               ▲                ▲         │
//! │                  ┌───────────┐   ┌───────────┐          │         │
//! │                  │  Window   │   │   Focus   │    ┌───────────┐   │
//! │                  │   Query   │   │  Watcher  │    │ /api/*    │   │
//! │                  └───────────┘   └───────────┘    │ AppState  │   │
//! │                                                   └───────────┘   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use keyqueue::collector::Collector;
//!
//! // Install the OS keyboard hook
//! let mut collector = Collector::new();
//! collector.start().expect("Failed to start collector");
//!
//! // Raw events can be received from collector.receiver()
//! ```

pub mod capture;
pub mod collector;
pub mod config;
pub mod hub;
pub mod keys;
pub mod service;
pub mod state;
pub mod target;
pub mod window;
pub mod worker;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use capture::{CaptureSource, FocusWatcher, Pipeline};
pub use collector::{Collector, CollectorError, KeyAction, RawKeyEvent};
pub use config::{AppConfig, ConfigError, ConfigStore, OverlayConfig};
pub use hub::{BroadcastHub, Notifier, PushMessage};
pub use keys::{KeyChange, KeyId, KeyIdentity, PressedKeySet};
pub use service::{CaptureService, CaptureStatus, ServiceOptions};
pub use state::AppState;
pub use target::{matches, TargetConfig, TargetError, TargetMode};
pub use window::{ForegroundInfo, SystemWindows, WindowQuery, WindowSummary};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
