//! macOS window query built on `CGWindowListCopyWindowInfo`.
//!
//! The window list comes back front to back, so the first on-screen window
//! in the normal layer belongs to the focused application. Its window number
//! stands in for a handle. Titles are only filled in when the process has
//! Screen Recording permission; window classes do not exist on macOS.

use super::{sort_windows, ForegroundInfo, WindowQuery, WindowSummary};
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::window::{
    copy_window_info, kCGNullWindowID, kCGWindowLayer, kCGWindowListExcludeDesktopElements,
    kCGWindowListOptionOnScreenOnly, kCGWindowName, kCGWindowNumber, kCGWindowOwnerName,
    kCGWindowOwnerPID,
};

/// Layer of ordinary application windows.
const NORMAL_LAYER: i64 = 0;

/// One entry of the on-screen window list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ListedWindow {
    number: i64,
    layer: i64,
    pid: Option<i64>,
    owner: Option<String>,
    title: Option<String>,
}

impl ListedWindow {
    fn is_app_window(&self) -> bool {
        self.layer == NORMAL_LAYER && self.number > 0
    }

    fn into_foreground(self) -> ForegroundInfo {
        ForegroundInfo {
            hwnd: Some(self.number.to_string()),
            title: self.title,
            pid: self.pid.map(|pid| pid.to_string()),
            process_name: self.owner,
            class: None,
        }
    }
}

/// Pick the focused window out of a front-to-back list.
fn frontmost(windows: Vec<ListedWindow>) -> ForegroundInfo {
    windows
        .into_iter()
        .find(ListedWindow::is_app_window)
        .map(ListedWindow::into_foreground)
        .unwrap_or_else(ForegroundInfo::none)
}

/// Application windows that have an owner, sorted for display.
fn summaries(windows: Vec<ListedWindow>) -> Vec<WindowSummary> {
    let mut summaries: Vec<WindowSummary> = windows
        .into_iter()
        .filter(ListedWindow::is_app_window)
        .filter_map(|window| {
            let process = window.owner.filter(|owner| !owner.is_empty())?;
            Some(WindowSummary {
                hwnd: window.number.to_string(),
                title: window.title.unwrap_or_default(),
                process,
                class: String::new(),
            })
        })
        .collect();
    sort_windows(&mut summaries);
    summaries
}

/// Window query backed by Quartz Window Services.
#[derive(Debug, Default, Clone, Copy)]
pub struct MacWindows;

impl MacWindows {
    pub fn new() -> Self {
        Self
    }
}

impl WindowQuery for MacWindows {
    fn foreground(&self) -> ForegroundInfo {
        frontmost(on_screen_windows())
    }

    fn list_windows(&self) -> Vec<WindowSummary> {
        summaries(on_screen_windows())
    }
}

fn on_screen_windows() -> Vec<ListedWindow> {
    let Some(list) = copy_window_info(
        kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
        kCGNullWindowID,
    ) else {
        tracing::debug!("CGWindowListCopyWindowInfo returned nothing");
        return Vec::new();
    };

    list.get_all_values()
        .into_iter()
        .filter(|item| !item.is_null())
        .map(|item| {
            // The array owns its dictionaries; take our own reference.
            let info: CFDictionary<CFString, CFType> =
                unsafe { CFDictionary::wrap_under_get_rule(item as CFDictionaryRef) };
            listed_window(&info)
        })
        .collect()
}

fn listed_window(info: &CFDictionary<CFString, CFType>) -> ListedWindow {
    unsafe {
        ListedWindow {
            number: number_value(info, kCGWindowNumber).unwrap_or(0),
            layer: number_value(info, kCGWindowLayer).unwrap_or(NORMAL_LAYER),
            pid: number_value(info, kCGWindowOwnerPID),
            owner: string_value(info, kCGWindowOwnerName),
            title: string_value(info, kCGWindowName),
        }
    }
}

fn number_value(info: &CFDictionary<CFString, CFType>, key: CFStringRef) -> Option<i64> {
    let key = unsafe { CFString::wrap_under_get_rule(key) };
    info.find(&key)?.downcast::<CFNumber>()?.to_i64()
}

fn string_value(info: &CFDictionary<CFString, CFType>, key: CFStringRef) -> Option<String> {
    let key = unsafe { CFString::wrap_under_get_rule(key) };
    let value = info.find(&key)?.downcast::<CFString>()?.to_string();
    (!value.is_empty()).then_some(value)
}
