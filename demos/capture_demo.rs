//! Print held keys as you type, without starting the server.
//!
//! This demo shows how to:
//! 1. Check that the keyboard hook can be installed
//! 2. Start a collector and feed it through a capture pipeline
//! 3. Watch the held-key snapshots the overlay would receive
//!
//! Run with: cargo run --example capture_demo
//!
//! Note: Requires Input Monitoring permission on macOS.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use keyqueue::{
    collector::{check_permission, Collector},
    hub::{notifier, PushMessage},
    target::{shared_target, TargetConfig, TargetMode},
    CaptureSource, PressedKeySet, Pipeline, SystemWindows,
};

fn main() {
    println!("keyqueue - Capture Demo");
    println!("=======================");
    println!();

    print!("Checking keyboard hook permission... ");
    if check_permission() {
        println!("OK");
    } else {
        println!("FAILED");
        println!("On macOS, add this application under Privacy > Input Monitoring.");
        return;
    }
    println!();

    let mut collector = Collector::new();
    if let Err(e) = collector.start() {
        eprintln!("Error starting collector: {e}");
        return;
    }

    // Capture everything, whichever window is focused
    let (notifier, mut pushes) = notifier();
    let pipeline = Pipeline {
        keys: Arc::new(PressedKeySet::new()),
        target: shared_target(TargetConfig::new(TargetMode::All, None)),
        windows: Arc::new(SystemWindows::new()),
        notifier,
    };
    let mut capture = match CaptureSource::spawn(pipeline, collector.receiver().clone()) {
        Ok(capture) => capture,
        Err(e) => {
            eprintln!("Error starting capture thread: {e}");
            return;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    println!("Capturing for 30 seconds. Hold some keys!");
    println!();

    let deadline = Instant::now() + Duration::from_secs(30);
    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        while let Ok(message) = pushes.try_recv() {
            if let PushMessage::Keys(keys) | PushMessage::Snapshot(keys) = message {
                println!("held: [{}]", keys.join(" + "));
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    capture.stop();
    collector.stop();
    println!();
    println!("Done.");
}
