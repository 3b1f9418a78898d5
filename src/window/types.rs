//! Window descriptions returned by the window-system query.

use serde::{Deserialize, Serialize};

/// The focused top-level window. Every field is optional: a query that fails
/// partially (or not at all supported) leaves the missing parts as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundInfo {
    pub hwnd: Option<String>,
    pub title: Option<String>,
    pub pid: Option<String>,
    pub process_name: Option<String>,
    pub class: Option<String>,
}

impl ForegroundInfo {
    /// The all-null value used when no foreground window can be determined.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether a foreground window handle was found.
    pub fn has_window(&self) -> bool {
        self.hwnd.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// One visible window, as listed for target-selection UIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub hwnd: String,
    pub title: String,
    pub process: String,
    pub class: String,
}

/// Order windows by process name, then title.
pub fn sort_windows(windows: &mut [WindowSummary]) {
    windows.sort_by(|a, b| {
        a.process
            .cmp(&b.process)
            .then_with(|| a.title.cmp(&b.title))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(process: &str, title: &str) -> WindowSummary {
        WindowSummary {
            hwnd: "1".to_string(),
            title: title.to_string(),
            process: process.to_string(),
            class: String::new(),
        }
    }

    #[test]
    fn test_none_has_no_window() {
        assert!(!ForegroundInfo::none().has_window());

        let info = ForegroundInfo {
            hwnd: Some(String::new()),
            ..Default::default()
        };
        assert!(!info.has_window());
    }

    #[test]
    fn test_sort_by_process_then_title() {
        let mut windows = vec![
            summary("obs64.exe", "OBS"),
            summary("chrome.exe", "Zed docs"),
            summary("chrome.exe", "Anime"),
        ];
        sort_windows(&mut windows);
        let titles: Vec<_> = windows.iter().map(|w| w.title.as_str()).collect();
        assert_eq!(titles, vec!["Anime", "Zed docs", "OBS"]);
    }

    #[test]
    fn test_foreground_serializes_nulls() {
        let json = serde_json::to_value(ForegroundInfo::none()).unwrap();
        assert!(json["hwnd"].is_null());
        assert!(json["process_name"].is_null());
        assert!(json["class"].is_null());
    }
}
