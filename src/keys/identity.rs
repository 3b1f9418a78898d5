//! Stable identity and display label for a physical key.
//!
//! A key is identified by its hardware scan code whenever the collector
//! provides one, so the same physical key maps to the same id regardless of
//! keyboard layout. Without a scan code the raw key name is used instead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier used to track a held key between its press and release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyId {
    /// Hardware scan code
    Scan(u32),
    /// Name-derived fallback, formatted as `NAME:<raw name>`
    Name(String),
}

impl KeyId {
    /// Build an id from an optional scan code, falling back to the raw name.
    pub fn new(scan_code: Option<u32>, name: &str) -> Self {
        match scan_code {
            Some(code) => KeyId::Scan(code),
            None => KeyId::Name(format!("NAME:{name}")),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Scan(code) => write!(f, "{code}"),
            KeyId::Name(name) => f.write_str(name),
        }
    }
}

/// A normalized key: stable id plus the label shown on the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyIdentity {
    pub id: KeyId,
    pub label: String,
}

impl KeyIdentity {
    /// Normalize a raw key event into an identity.
    pub fn from_raw(scan_code: Option<u32>, name: &str) -> Self {
        Self {
            id: KeyId::new(scan_code, name),
            label: normalize_label(name),
        }
    }
}

/// Canonical names for keys whose raw names vary between platforms.
const ALIASES: &[(&str, &str)] = &[
    ("space", "SPACE"),
    ("enter", "ENTER"),
    ("return", "ENTER"),
    ("tab", "TAB"),
    ("ctrl", "CTRL"),
    ("control", "CTRL"),
    ("alt", "ALT"),
    ("shift", "SHIFT"),
    ("caps lock", "CAPS"),
    ("backspace", "BKSP"),
    ("esc", "ESC"),
    ("escape", "ESC"),
    ("left", "LEFT"),
    ("right", "RIGHT"),
    ("up", "UP"),
    ("down", "DOWN"),
];

/// Turn a raw key name into the label displayed by overlays.
///
/// Single characters keep their symbol (`!`, `/`, `1`) and letters are
/// uppercased. Multi-character names go through the alias table and are
/// otherwise uppercased, with underscores read as spaces.
pub fn normalize_label(raw_name: &str) -> String {
    let name = raw_name.replace('_', " ");

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return if c.is_alphabetic() {
            c.to_uppercase().collect()
        } else {
            name
        };
    }

    let lower = name.to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| name.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_code_preferred() {
        let key = KeyIdentity::from_raw(Some(30), "a");
        assert_eq!(key.id, KeyId::Scan(30));
        assert_eq!(key.label, "A");
    }

    #[test]
    fn test_name_fallback_id() {
        let key = KeyIdentity::from_raw(None, "media play");
        assert_eq!(key.id, KeyId::Name("NAME:media play".to_string()));
        assert_eq!(key.label, "MEDIA PLAY");
    }

    #[test]
    fn test_single_symbols_kept_verbatim() {
        assert_eq!(normalize_label("!"), "!");
        assert_eq!(normalize_label("/"), "/");
        assert_eq!(normalize_label("7"), "7");
        assert_eq!(normalize_label("z"), "Z");
    }

    #[test]
    fn test_aliases() {
        assert_eq!(normalize_label("space"), "SPACE");
        assert_eq!(normalize_label("Return"), "ENTER");
        assert_eq!(normalize_label("control"), "CTRL");
        assert_eq!(normalize_label("caps_lock"), "CAPS");
        assert_eq!(normalize_label("Caps Lock"), "CAPS");
        assert_eq!(normalize_label("backspace"), "BKSP");
        assert_eq!(normalize_label("escape"), "ESC");
        assert_eq!(normalize_label("left"), "LEFT");
    }

    #[test]
    fn test_unknown_names_uppercased() {
        assert_eq!(normalize_label("page_down"), "PAGE DOWN");
        assert_eq!(normalize_label("right ctrl"), "RIGHT CTRL");
        assert_eq!(normalize_label("f5"), "F5");
    }

    #[test]
    fn test_key_id_serializes_untagged() {
        assert_eq!(serde_json::to_string(&KeyId::Scan(48)).unwrap(), "48");
        assert_eq!(
            serde_json::to_string(&KeyId::new(None, "x")).unwrap(),
            "\"NAME:x\""
        );
    }
}
