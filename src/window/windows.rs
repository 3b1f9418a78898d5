//! Win32 window queries.
//!
//! Window handles are rendered as decimal integers so they survive a round
//! trip through JSON and the target configuration.

use super::{sort_windows, ForegroundInfo, WindowQuery, WindowSummary};
use std::ffi::c_void;
use std::path::Path;
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
    IsWindowVisible, SetForegroundWindow, ShowWindow, SW_RESTORE,
};

/// Window query backed by the Win32 API.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Windows;

impl Win32Windows {
    pub fn new() -> Self {
        Self
    }
}

impl WindowQuery for Win32Windows {
    fn foreground(&self) -> ForegroundInfo {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.0.is_null() {
            return ForegroundInfo::none();
        }

        let pid = process_id(hwnd);
        ForegroundInfo {
            hwnd: Some(handle_to_string(hwnd)),
            title: Some(window_title(hwnd)),
            pid: pid.map(|p| p.to_string()),
            process_name: pid.and_then(process_name),
            class: window_class(hwnd),
        }
    }

    fn list_windows(&self) -> Vec<WindowSummary> {
        let mut windows: Vec<WindowSummary> = Vec::new();

        unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
            let windows = &mut *(lparam.0 as *mut Vec<WindowSummary>);
            if IsWindowVisible(hwnd).as_bool() {
                let title = window_title(hwnd);
                if !title.is_empty() {
                    windows.push(WindowSummary {
                        hwnd: handle_to_string(hwnd),
                        title,
                        process: process_id(hwnd).and_then(process_name).unwrap_or_default(),
                        class: window_class(hwnd).unwrap_or_default(),
                    });
                }
            }
            BOOL::from(true)
        }

        unsafe {
            if let Err(e) = EnumWindows(
                Some(enum_proc),
                LPARAM(&mut windows as *mut Vec<WindowSummary> as isize),
            ) {
                tracing::debug!("EnumWindows failed: {e}");
            }
        }

        sort_windows(&mut windows);
        windows
    }

    fn focus(&self, hwnd: &str) -> bool {
        let Some(hwnd) = parse_handle(hwnd) else {
            return false;
        };
        unsafe {
            let _ = ShowWindow(hwnd, SW_RESTORE);
            SetForegroundWindow(hwnd).as_bool()
        }
    }
}

fn handle_to_string(hwnd: HWND) -> String {
    (hwnd.0 as usize).to_string()
}

fn parse_handle(hwnd: &str) -> Option<HWND> {
    match hwnd.trim().parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(raw) => Some(HWND(raw as *mut c_void)),
    }
}

fn window_title(hwnd: HWND) -> String {
    let mut buffer = [0u16; 512];
    let len = unsafe { GetWindowTextW(hwnd, &mut buffer) };
    if len <= 0 {
        return String::new();
    }
    String::from_utf16_lossy(&buffer[..len as usize])
}

fn window_class(hwnd: HWND) -> Option<String> {
    let mut buffer = [0u16; 256];
    let len = unsafe { GetClassNameW(hwnd, &mut buffer) };
    if len <= 0 {
        return None;
    }
    Some(String::from_utf16_lossy(&buffer[..len as usize]))
}

fn process_id(hwnd: HWND) -> Option<u32> {
    let mut pid = 0u32;
    unsafe {
        GetWindowThreadProcessId(hwnd, Some(&mut pid));
    }
    (pid != 0).then_some(pid)
}

/// Executable file name (e.g. `notepad.exe`) of a process.
fn process_name(pid: u32) -> Option<String> {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
        let mut buffer = [0u16; 1024];
        let mut size = buffer.len() as u32;
        let result = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            PWSTR(buffer.as_mut_ptr()),
            &mut size,
        );
        let _ = CloseHandle(handle);
        result.ok()?;

        let full_path = String::from_utf16_lossy(&buffer[..size as usize]);
        Path::new(&full_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handle() {
        assert!(parse_handle("0").is_none());
        assert!(parse_handle("abc").is_none());
        assert_eq!(parse_handle("4242").map(|h| h.0 as usize), Some(4242));
    }

    #[test]
    fn test_handle_round_trip() {
        let hwnd = HWND(1234usize as *mut c_void);
        let text = handle_to_string(hwnd);
        assert_eq!(text, "1234");
        assert_eq!(parse_handle(&text).map(|h| h.0 as usize), Some(1234));
    }
}
