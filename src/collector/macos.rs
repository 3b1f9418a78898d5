//! macOS keyboard collector using a CGEvent tap.
//!
//! Requires the Input Monitoring permission. Modifier keys arrive as
//! `FlagsChanged` events that only say "something changed", so each physical
//! modifier key is tracked here. Caps Lock is a toggle, not a held key; every
//! change is reported as a tap.

use crate::collector::types::{KeyAction, RawKeyEvent};
use crate::collector::EVENT_QUEUE_CAPACITY;
use crate::worker::{join_with_timeout, DEFAULT_JOIN_TIMEOUT};
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventType, CallbackResult, EventField,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

/// The macOS keyboard collector.
pub struct MacOSCollector {
    sender: Sender<RawKeyEvent>,
    receiver: Receiver<RawKeyEvent>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MacOSCollector {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(EVENT_QUEUE_CAPACITY);

        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Create the event tap on a background thread.
    ///
    /// Fails with [`CollectorError::TapCreationFailed`] when Input Monitoring
    /// permission has not been granted.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();
        let (startup_tx, startup_rx) = bounded::<Result<(), CollectorError>>(1);

        let handle = thread::Builder::new()
            .name("keyqueue-tap".to_string())
            .spawn(move || {
                run_event_loop(sender, running.clone(), startup_tx);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|_| {
                self.running.store(false, Ordering::SeqCst);
                CollectorError::TapCreationFailed
            })?;

        match startup_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(())) => {
                tracing::info!("Keyboard event tap enabled");
                self.thread_handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CollectorError::TapCreationFailed)
            }
        }
    }

    /// Stop the run loop thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            join_with_timeout(handle, DEFAULT_JOIN_TIMEOUT, "Event tap");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn receiver(&self) -> &Receiver<RawKeyEvent> {
        &self.receiver
    }
}

impl Default for MacOSCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MacOSCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Errors that can occur during event collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    TapCreationFailed,
    RunLoopSourceFailed,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::TapCreationFailed => write!(
                f,
                "Failed to create CGEvent tap (is Input Monitoring permission granted?)"
            ),
            CollectorError::RunLoopSourceFailed => {
                write!(f, "Failed to create run loop source")
            }
        }
    }
}

impl std::error::Error for CollectorError {}

fn run_event_loop(
    sender: Sender<RawKeyEvent>,
    running: Arc<AtomicBool>,
    startup: Sender<Result<(), CollectorError>>,
) {
    let event_types = vec![
        CGEventType::KeyDown,
        CGEventType::KeyUp,
        CGEventType::FlagsChanged,
    ];

    let modifiers = Mutex::new(ModifierState::default());

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        event_types,
        move |_proxy, event_type, event: &CGEvent| {
            let mut modifiers = modifiers.lock().unwrap_or_else(|e| e.into_inner());
            for raw in process_cg_event(event_type, event, &mut modifiers) {
                // Don't block if the channel is full - just drop the event
                let _ = sender.try_send(raw);
            }
            CallbackResult::Keep
        },
    ) {
        Ok(tap) => tap,
        Err(_) => {
            let _ = startup.send(Err(CollectorError::TapCreationFailed));
            return;
        }
    };

    let source = match tap.mach_port().create_runloop_source(0) {
        Ok(source) => source,
        Err(_) => {
            let _ = startup.send(Err(CollectorError::RunLoopSourceFailed));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();
    let _ = startup.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        // Run the loop for a short interval, then check if we should stop
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopCommonModes },
            Duration::from_millis(100),
            false,
        );
    }
}

fn process_cg_event(
    event_type: CGEventType,
    event: &CGEvent,
    modifiers: &mut ModifierState,
) -> Vec<RawKeyEvent> {
    let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;

    let actions = match event_type {
        CGEventType::KeyDown => vec![KeyAction::Down],
        CGEventType::KeyUp => vec![KeyAction::Up],
        CGEventType::FlagsChanged => modifiers.update(keycode, event.get_flags()),
        _ => Vec::new(),
    };

    actions
        .into_iter()
        .map(|action| RawKeyEvent::new(action, key_name(keycode), Some(u32::from(keycode))))
        .collect()
}

const CAPS_LOCK: u16 = 57;

/// Which modifier keys are physically held, by keycode.
///
/// Left and right keys share one flag bit, so the flag alone cannot say
/// which key moved. A `FlagsChanged` event for a key toggles it; a cleared
/// flag forces every key of that kind up.
#[derive(Debug, Default)]
struct ModifierState {
    held: HashSet<u16>,
}

impl ModifierState {
    fn update(&mut self, keycode: u16, flags: CGEventFlags) -> Vec<KeyAction> {
        if keycode == CAPS_LOCK {
            return vec![KeyAction::Down, KeyAction::Up];
        }
        let Some(flag) = modifier_flag(keycode) else {
            return Vec::new();
        };

        if !flags.contains(flag) {
            // Resync the twin key too, in case its release was missed
            self.held.retain(|&held| modifier_flag(held) != Some(flag));
            return vec![KeyAction::Up];
        }

        if self.held.insert(keycode) {
            vec![KeyAction::Down]
        } else {
            self.held.remove(&keycode);
            vec![KeyAction::Up]
        }
    }
}

/// Flag bit that is set while either key of a modifier pair is held.
fn modifier_flag(keycode: u16) -> Option<CGEventFlags> {
    match keycode {
        56 | 60 => Some(CGEventFlags::CGEventFlagShift),
        59 | 62 => Some(CGEventFlags::CGEventFlagControl),
        58 | 61 => Some(CGEventFlags::CGEventFlagAlternate),
        55 | 54 => Some(CGEventFlags::CGEventFlagCommand),
        63 => Some(CGEventFlags::CGEventFlagSecondaryFn),
        _ => None,
    }
}

/// Name for a virtual keycode on the ANSI layout.
fn key_name(keycode: u16) -> String {
    let name = match keycode {
        0 => "a",
        1 => "s",
        2 => "d",
        3 => "f",
        4 => "h",
        5 => "g",
        6 => "z",
        7 => "x",
        8 => "c",
        9 => "v",
        11 => "b",
        12 => "q",
        13 => "w",
        14 => "e",
        15 => "r",
        16 => "y",
        17 => "t",
        18 => "1",
        19 => "2",
        20 => "3",
        21 => "4",
        22 => "6",
        23 => "5",
        24 => "=",
        25 => "9",
        26 => "7",
        27 => "-",
        28 => "8",
        29 => "0",
        30 => "]",
        31 => "o",
        32 => "u",
        33 => "[",
        34 => "i",
        35 => "p",
        36 => "enter",
        37 => "l",
        38 => "j",
        39 => "'",
        40 => "k",
        41 => ";",
        42 => "\\",
        43 => ",",
        44 => "/",
        45 => "n",
        46 => "m",
        47 => ".",
        48 => "tab",
        49 => "space",
        50 => "`",
        51 => "backspace",
        53 => "esc",
        54 | 55 => "cmd",
        56 | 60 => "shift",
        57 => "caps lock",
        58 | 61 => "alt",
        59 | 62 => "ctrl",
        63 => "fn",
        96 => "f5",
        97 => "f6",
        98 => "f7",
        99 => "f3",
        100 => "f8",
        101 => "f9",
        103 => "f11",
        109 => "f10",
        111 => "f12",
        114 => "help",
        115 => "home",
        116 => "page_up",
        117 => "delete",
        118 => "f4",
        119 => "end",
        120 => "f2",
        121 => "page_down",
        122 => "f1",
        123 => "left",
        124 => "right",
        125 => "down",
        126 => "up",
        other => return format!("key_{other}"),
    };
    name.to_string()
}

/// Check if the application has Input Monitoring permission.
///
/// macOS has no direct query; creating a passive tap fails without it.
pub fn check_permission() -> bool {
    CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown],
        |_proxy, _type, _event| CallbackResult::Keep,
    )
    .is_ok()
}
