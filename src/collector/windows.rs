//! Windows keyboard collector using a low-level keyboard hook.
//!
//! `WH_KEYBOARD_LL` callbacks run on the thread that installed the hook, and
//! only while that thread pumps messages. The collector therefore owns a
//! thread that installs the hook, runs `GetMessageW` until it receives
//! `WM_QUIT`, then unhooks.
//!
//! The thread publishes its id before installing the hook, so `stop` can
//! always reach it, even after `start` gave up waiting for the install.

use crate::collector::types::{KeyAction, RawKeyEvent};
use crate::collector::EVENT_QUEUE_CAPACITY;
use crate::worker::{join_with_timeout, DEFAULT_JOIN_TIMEOUT};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::GetKeyNameTextW;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, PeekMessageW, PostThreadMessageW, SetWindowsHookExW,
    UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT, LLKHF_EXTENDED, MSG, PM_NOREMOVE,
    WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN, WM_SYSKEYUP,
};

/// Extended keys (right Ctrl, arrows, Insert, ...) share scan codes with
/// their numpad twins; this prefix keeps their ids distinct.
const EXTENDED_SCAN_PREFIX: u32 = 0xE000;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

/// The Windows keyboard collector.
pub struct WindowsCollector {
    sender: Sender<RawKeyEvent>,
    receiver: Receiver<RawKeyEvent>,
    running: Arc<AtomicBool>,
    /// Id of the hook thread, 0 when there is none
    hook_thread_id: Arc<AtomicU32>,
    thread_handle: Option<JoinHandle<()>>,
}

impl WindowsCollector {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(EVENT_QUEUE_CAPACITY);

        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            hook_thread_id: Arc::new(AtomicU32::new(0)),
            thread_handle: None,
        }
    }

    /// Install the hook on a background thread.
    ///
    /// Blocks until the hook is installed (or failed to install) so callers
    /// learn about hook unavailability immediately.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();
        let thread_id = self.hook_thread_id.clone();
        let (startup_tx, startup_rx) = bounded::<Result<(), CollectorError>>(1);

        let handle = thread::Builder::new()
            .name("keyqueue-hook".to_string())
            .spawn(move || {
                run_hook_loop(sender, startup_tx, &running, &thread_id);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|_| {
                self.running.store(false, Ordering::SeqCst);
                CollectorError::HookInstallationFailed
            })?;

        match startup_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(())) => {
                tracing::info!("Keyboard hook installed");
                self.thread_handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.hook_thread_id.store(0, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                tracing::warn!("Timed out waiting for the keyboard hook");
                // A hook installed from now on is removed by the thread itself
                self.thread_handle = Some(handle);
                self.stop();
                Err(CollectorError::HookInstallationFailed)
            }
        }
    }

    /// Unhook and stop the hook thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        let thread_id = self.hook_thread_id.swap(0, Ordering::SeqCst);
        if thread_id != 0 {
            unsafe {
                if let Err(e) = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) {
                    tracing::debug!("Failed to post WM_QUIT to hook thread: {e}");
                }
            }
        }

        if let Some(handle) = self.thread_handle.take() {
            join_with_timeout(handle, DEFAULT_JOIN_TIMEOUT, "Keyboard hook");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn receiver(&self) -> &Receiver<RawKeyEvent> {
        &self.receiver
    }
}

impl Default for WindowsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WindowsCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Errors that can occur during event collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    HookInstallationFailed,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::HookInstallationFailed => {
                write!(f, "Failed to install Windows keyboard hook")
            }
        }
    }
}

impl std::error::Error for CollectorError {}

thread_local! {
    static EVENT_SENDER: RefCell<Option<Sender<RawKeyEvent>>> = const { RefCell::new(None) };
}

/// Low-level keyboard hook callback.
unsafe extern "system" fn keyboard_hook_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code >= 0 {
        let action = match w_param.0 as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(KeyAction::Down),
            WM_KEYUP | WM_SYSKEYUP => Some(KeyAction::Up),
            _ => None,
        };

        if let Some(action) = action {
            let kb = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
            let extended = (kb.flags.0 & LLKHF_EXTENDED.0) != 0;
            let event = RawKeyEvent::new(
                action,
                key_name(kb.vkCode, kb.scanCode, extended),
                scan_code_id(kb.scanCode, extended),
            );

            EVENT_SENDER.with(|sender| {
                if let Some(ref s) = *sender.borrow() {
                    let _ = s.try_send(event);
                }
            });
        }
    }

    // Pass the event to the next hook
    CallNextHookEx(HHOOK::default(), n_code, w_param, l_param)
}

fn scan_code_id(scan_code: u32, extended: bool) -> Option<u32> {
    match scan_code {
        0 => None,
        code if extended => Some(code | EXTENDED_SCAN_PREFIX),
        code => Some(code),
    }
}

/// Key name for the current keyboard layout, e.g. `Shift` or `Caps Lock`.
fn key_name(vk_code: u32, scan_code: u32, extended: bool) -> String {
    let mut lparam = (scan_code as i32) << 16;
    if extended {
        lparam |= 1 << 24;
    }

    let mut buffer = [0u16; 64];
    let len = unsafe { GetKeyNameTextW(lparam, &mut buffer) };
    if len > 0 {
        String::from_utf16_lossy(&buffer[..len as usize])
    } else {
        format!("vk_{vk_code}")
    }
}

/// Install the hook and pump messages until `WM_QUIT`.
///
/// Returns right after installing if `running` was cleared in the meantime.
fn run_hook_loop(
    sender: Sender<RawKeyEvent>,
    startup: Sender<Result<(), CollectorError>>,
    running: &AtomicBool,
    thread_id: &AtomicU32,
) {
    EVENT_SENDER.with(|s| {
        *s.borrow_mut() = Some(sender);
    });

    unsafe {
        let mut msg = MSG::default();
        // Create this thread's message queue so WM_QUIT can be posted to it
        let _ = PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_NOREMOVE);
        thread_id.store(GetCurrentThreadId(), Ordering::SeqCst);

        let hook = match SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0) {
            Ok(hook) => hook,
            Err(e) => {
                tracing::warn!("SetWindowsHookExW failed: {e}");
                let _ = startup.send(Err(CollectorError::HookInstallationFailed));
                return;
            }
        };

        if running.load(Ordering::SeqCst) {
            let _ = startup.send(Ok(()));
        } else {
            tracing::debug!("Collector stopped during hook installation");
            let _ = PostThreadMessageW(GetCurrentThreadId(), WM_QUIT, WPARAM(0), LPARAM(0));
        }

        loop {
            // 0 is WM_QUIT, -1 is an error; both end the loop.
            let result = GetMessageW(&mut msg, HWND::default(), 0, 0);
            if result.0 <= 0 {
                break;
            }
        }

        if let Err(e) = UnhookWindowsHookEx(hook) {
            tracing::debug!("UnhookWindowsHookEx failed: {e}");
        }
    }

    EVENT_SENDER.with(|s| {
        s.borrow_mut().take();
    });
}

/// Check whether a low-level keyboard hook can be installed.
pub fn check_permission() -> bool {
    unsafe {
        match SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0) {
            Ok(hook) => {
                let _ = UnhookWindowsHookEx(hook);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_creation() {
        let collector = WindowsCollector::new();
        assert!(!collector.is_running());
    }

    #[test]
    fn test_hook_thread_exits_when_stopped_during_install() {
        let (sender, _events) = bounded(8);
        let (startup_tx, startup_rx) = bounded(1);
        let running = Arc::new(AtomicBool::new(false));
        let thread_id = Arc::new(AtomicU32::new(0));

        let (flag, id) = (running.clone(), thread_id.clone());
        let handle = thread::spawn(move || run_hook_loop(sender, startup_tx, &flag, &id));

        assert!(join_with_timeout(handle, Duration::from_secs(2), "Test hook"));
        assert_ne!(thread_id.load(Ordering::SeqCst), 0);
        assert!(!matches!(startup_rx.try_recv(), Ok(Ok(()))));
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut collector = WindowsCollector::new();
        collector.stop();
        assert!(!collector.is_running());
        assert_eq!(collector.hook_thread_id.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_extended_scan_codes_distinct() {
        assert_eq!(scan_code_id(0x1D, false), Some(0x1D));
        assert_eq!(scan_code_id(0x1D, true), Some(0xE01D));
        assert_eq!(scan_code_id(0, false), None);
    }
}
