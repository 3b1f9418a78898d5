//! Raw keyboard events as reported by the OS hook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a key went down or came back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Down,
    Up,
}

/// A single press or release, before any target filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawKeyEvent {
    /// Timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
    pub action: KeyAction,
    /// Key name as reported by the platform (e.g. `a`, `shift`, `caps lock`)
    pub name: String,
    /// Hardware scan code, when the platform exposes one
    pub scan_code: Option<u32>,
}

impl RawKeyEvent {
    pub fn new(action: KeyAction, name: impl Into<String>, scan_code: Option<u32>) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            name: name.into(),
            scan_code,
        }
    }

    pub fn down(name: impl Into<String>, scan_code: Option<u32>) -> Self {
        Self::new(KeyAction::Down, name, scan_code)
    }

    pub fn up(name: impl Into<String>, scan_code: Option<u32>) -> Self {
        Self::new(KeyAction::Up, name, scan_code)
    }

    pub fn is_down(&self) -> bool {
        self.action == KeyAction::Down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = RawKeyEvent::down("a", Some(30));
        assert!(event.is_down());
        assert_eq!(event.name, "a");
        assert_eq!(event.scan_code, Some(30));

        let event = RawKeyEvent::up("shift", None);
        assert!(!event.is_down());
        assert_eq!(event.action, KeyAction::Up);
    }

    #[test]
    fn test_action_serializes_lowercase() {
        let json = serde_json::to_value(KeyAction::Down).unwrap();
        assert_eq!(json, serde_json::json!("down"));
    }
}
