//! Target rules: which foreground window's keystrokes are captured.

use crate::window::ForegroundInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

/// How the foreground window is compared against the target value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// Never capture
    #[default]
    Disabled,
    /// Window title contains the value (case-insensitive)
    Title,
    /// Process image name equals the value (case-insensitive)
    Process,
    /// Window handle equals the value
    Hwnd,
    /// Window class equals the value (case-insensitive)
    Class,
    /// Any foreground window
    All,
}

impl TargetMode {
    pub const ALL_MODES: [TargetMode; 6] = [
        TargetMode::Disabled,
        TargetMode::Title,
        TargetMode::Process,
        TargetMode::Hwnd,
        TargetMode::Class,
        TargetMode::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMode::Disabled => "disabled",
            TargetMode::Title => "title",
            TargetMode::Process => "process",
            TargetMode::Hwnd => "hwnd",
            TargetMode::Class => "class",
            TargetMode::All => "all",
        }
    }
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetMode {
    type Err = TargetError;

    /// Parse a mode name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        TargetMode::ALL_MODES
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| TargetError::InvalidMode(s.to_string()))
    }
}

/// The configured target rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub mode: TargetMode,
    pub value: Option<String>,
}

impl TargetConfig {
    pub fn new(mode: TargetMode, value: Option<String>) -> Self {
        Self { mode, value }
    }

    /// Build a rule from untrusted control input. A missing mode means
    /// `disabled`; an unknown mode is rejected.
    pub fn parse(mode: Option<&str>, value: Option<String>) -> Result<Self, TargetError> {
        let mode = match mode {
            Some(m) => m.parse()?,
            None => TargetMode::Disabled,
        };
        Ok(Self { mode, value })
    }

    /// Whether the given foreground window qualifies for capture.
    pub fn matches(&self, fg: &ForegroundInfo) -> bool {
        matches(fg, self)
    }
}

/// Target rule shared between the control surface and the capture threads.
pub type SharedTarget = Arc<RwLock<TargetConfig>>;

pub fn shared_target(config: TargetConfig) -> SharedTarget {
    Arc::new(RwLock::new(config))
}

/// Read the current rule, tolerating a poisoned lock.
pub fn current_target(target: &SharedTarget) -> TargetConfig {
    target.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Decide whether the foreground window qualifies under `target`.
pub fn matches(fg: &ForegroundInfo, target: &TargetConfig) -> bool {
    let has_window = fg.has_window();
    let value = target.value.as_deref().unwrap_or("");

    match target.mode {
        TargetMode::Disabled => false,
        TargetMode::All => has_window,
        _ if !has_window => false,
        TargetMode::Hwnd => match (&target.value, &fg.hwnd) {
            (Some(wanted), Some(hwnd)) => wanted.trim() == hwnd,
            _ => false,
        },
        TargetMode::Title => {
            let title = fg.title.as_deref().unwrap_or("").to_lowercase();
            title.contains(&value.to_lowercase())
        }
        TargetMode::Process => {
            eq_ignore_case(fg.process_name.as_deref().unwrap_or(""), value)
        }
        TargetMode::Class => eq_ignore_case(fg.class.as_deref().unwrap_or(""), value),
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Errors raised when a target rule is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    InvalidMode(String),
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::InvalidMode(mode) => write!(
                f,
                "Invalid mode '{mode}' (expected one of disabled, title, process, hwnd, class, all)"
            ),
        }
    }
}

impl std::error::Error for TargetError {}
