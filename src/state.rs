//! Shared application state and the control operations behind the HTTP API.

use crate::capture::Pipeline;
use crate::config::{validate_port, AppConfig, ConfigError, ConfigStore, OverlayConfig};
use crate::hub::{BroadcastHub, Notifier, PushMessage};
use crate::keys::{KeyChange, PressedKeySet};
use crate::service::CaptureStatus;
use crate::target::{current_target, shared_target, SharedTarget, TargetConfig, TargetError};
use crate::window::{ForegroundInfo, WindowQuery, WindowSummary};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

/// State owned by the server process, shared by `Arc` between request
/// handlers and the capture threads.
pub struct AppState {
    keys: Arc<PressedKeySet>,
    target: SharedTarget,
    config: RwLock<AppConfig>,
    store: ConfigStore,
    windows: Arc<dyn WindowQuery>,
    notifier: Notifier,
    hub: Arc<BroadcastHub>,
    capture: Mutex<CaptureStatus>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: ConfigStore,
        windows: Arc<dyn WindowQuery>,
        notifier: Notifier,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            keys: Arc::new(PressedKeySet::new()),
            target: shared_target(config.target.clone()),
            config: RwLock::new(config),
            store,
            windows,
            notifier,
            hub,
            capture: Mutex::new(CaptureStatus::Stopped),
        }
    }

    /// Handles for the capture and focus threads.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline {
            keys: self.keys.clone(),
            target: self.target.clone(),
            windows: self.windows.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Labels of the currently held keys, in press order.
    pub fn keys(&self) -> Vec<String> {
        self.keys.snapshot()
    }

    /// The bare snapshot sent to a subscriber right after it connects.
    pub fn snapshot_message(&self) -> PushMessage {
        PushMessage::Snapshot(self.keys.snapshot())
    }

    /// Register an overlay subscriber and return its id together with the
    /// snapshot to send it first.
    ///
    /// The subscriber joins the hub before the snapshot is taken. Any change
    /// the snapshot misses is still queued for it, and later pushes only carry
    /// newer state.
    pub fn subscribe(&self, sender: mpsc::Sender<Arc<str>>) -> (Uuid, PushMessage) {
        let id = self.hub.connect(sender);
        (id, self.snapshot_message())
    }

    pub fn capture_status(&self) -> CaptureStatus {
        *self.capture.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_capture_status(&self, status: CaptureStatus) {
        *self.capture.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn target(&self) -> TargetConfig {
        current_target(&self.target)
    }

    /// Replace the target rule.
    ///
    /// Held keys are always dropped, even when the new rule still matches the
    /// focused window. An unknown mode is rejected before anything changes.
    pub fn set_target(
        &self,
        mode: Option<&str>,
        value: Option<String>,
    ) -> Result<TargetConfig, TargetError> {
        let target = TargetConfig::parse(mode, value)?;

        *self.target.write().unwrap_or_else(|e| e.into_inner()) = target.clone();
        self.keys.apply_then(KeyChange::Clear, |_| {
            self.notifier.notify(PushMessage::cleared());
        });
        tracing::info!(mode = %target.mode, value = ?target.value, "Target changed");

        let mut config = self.write_config();
        config.target = target.clone();
        if let Err(e) = self.store.save(&config) {
            tracing::warn!("Failed to persist target: {e}");
        }

        Ok(target)
    }

    pub fn port(&self) -> u16 {
        self.read_config().port
    }

    /// Persist a new port. Takes effect on the next server start.
    pub fn set_port(&self, port: i64) -> Result<u16, ConfigError> {
        let port = validate_port(port)?;

        let mut config = self.write_config();
        let mut next = config.clone();
        next.port = port;
        self.store.save(&next)?;
        *config = next;

        tracing::info!(port, "Port saved");
        Ok(port)
    }

    pub fn overlay(&self) -> OverlayConfig {
        self.read_config().overlay.clone()
    }

    /// Apply a partial overlay update, persist it and push it to overlays.
    ///
    /// Nothing changes when validation or saving fails.
    pub fn set_overlay(&self, update: &Map<String, Value>) -> Result<OverlayConfig, ConfigError> {
        let mut config = self.write_config();
        let overlay = config.overlay.merged(update)?;

        let mut next = config.clone();
        next.overlay = overlay.clone();
        self.store.save(&next)?;
        *config = next;

        // Still under the write guard: pushes follow commit order
        self.notifier.notify(PushMessage::Config(overlay.clone()));
        Ok(overlay)
    }

    pub fn foreground(&self) -> ForegroundInfo {
        self.windows.foreground()
    }

    pub fn windows(&self) -> Vec<WindowSummary> {
        self.windows.list_windows()
    }

    pub fn focus_window(&self, hwnd: &str) -> bool {
        self.windows.focus(hwnd)
    }

    fn read_config(&self) -> std::sync::RwLockReadGuard<'_, AppConfig> {
        self.config.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_config(&self) -> std::sync::RwLockWriteGuard<'_, AppConfig> {
        self.config.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeWindows;
    use crate::collector::RawKeyEvent;
    use crate::hub::{notifier, SUBSCRIBER_QUEUE_CAPACITY};
    use crate::target::TargetMode;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn state(dir: &tempfile::TempDir) -> (AppState, UnboundedReceiver<PushMessage>) {
        let (notifier, rx) = notifier();
        let state = AppState::new(
            AppConfig::default(),
            ConfigStore::at(dir.path().join("config.json")),
            Arc::new(FakeWindows::focused("notepad.exe")),
            notifier,
            Arc::new(BroadcastHub::new()),
        );
        (state, rx)
    }

    #[test]
    fn test_retarget_clears_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (state, mut rx) = state(&dir);
        state.set_target(Some("all"), None).unwrap();
        state.pipeline().handle_event(&RawKeyEvent::down("a", Some(30)));
        let _ = rx.try_recv();

        let target = state
            .set_target(Some("Process"), Some("notepad.exe".to_string()))
            .unwrap();
        assert_eq!(target.mode, TargetMode::Process);
        assert!(state.keys().is_empty());
        assert_eq!(rx.try_recv().unwrap(), PushMessage::cleared());

        let saved = ConfigStore::at(dir.path().join("config.json")).load();
        assert_eq!(saved.target, target);
    }

    #[test]
    fn test_invalid_mode_leaves_state() {
        let dir = tempfile::tempdir().unwrap();
        let (state, mut rx) = state(&dir);
        state.set_target(Some("all"), None).unwrap();
        state.pipeline().handle_event(&RawKeyEvent::down("a", Some(30)));
        let _ = rx.try_recv();

        assert!(state.set_target(Some("window"), None).is_err());
        assert_eq!(state.target().mode, TargetMode::All);
        assert_eq!(state.keys(), vec!["A"]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_set_port() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _rx) = state(&dir);

        assert_eq!(state.set_port(9001), Ok(9001));
        assert_eq!(state.port(), 9001);
        assert!(state.set_port(80).is_err());
        assert_eq!(state.port(), 9001);
    }

    #[test]
    fn test_set_overlay_broadcasts_config() {
        let dir = tempfile::tempdir().unwrap();
        let (state, mut rx) = state(&dir);

        let update = json!({"single_line_scale": 200, "align": "top"});
        let overlay = state.set_overlay(update.as_object().unwrap()).unwrap();
        assert_eq!(overlay.single_line_scale, 120);
        assert_eq!(overlay.align, "center");
        assert_eq!(rx.try_recv().unwrap(), PushMessage::Config(overlay.clone()));
        assert_eq!(state.overlay(), overlay);
    }

    #[test]
    fn test_concurrent_overlay_updates_push_in_commit_order() {
        let dir = tempfile::tempdir().unwrap();
        let (state, mut rx) = state(&dir);
        let state = Arc::new(state);

        let writers: Vec<_> = [1i64, 2]
            .into_iter()
            .map(|cols| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let update = json!({ "cols": cols });
                        state.set_overlay(update.as_object().unwrap()).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let mut last = None;
        while let Ok(message) = rx.try_recv() {
            last = Some(message);
        }
        assert_eq!(last, Some(PushMessage::Config(state.overlay())));
    }

    #[test]
    fn test_subscriber_sees_changes_after_its_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (state, mut pushes) = state(&dir);
        state.set_target(Some("all"), None).unwrap();

        let (tx, mut rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let (_id, initial) = state.subscribe(tx);
        assert_eq!(initial, PushMessage::Snapshot(Vec::new()));
        assert_eq!(state.hub().len(), 1);

        // A change racing the connect is broadcast after the snapshot
        state.pipeline().handle_event(&RawKeyEvent::down("a", Some(30)));
        while let Ok(message) = pushes.try_recv() {
            state.hub().broadcast(&message);
        }

        let pushed: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(pushed, json!({"type": "keys", "keys": ["A"]}));
        assert_eq!(state.keys(), vec!["A"]);
    }

    #[test]
    fn test_snapshot_reflects_keys_held_before_subscribe() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _pushes) = state(&dir);
        state.set_target(Some("all"), None).unwrap();
        state.pipeline().handle_event(&RawKeyEvent::down("shift", Some(42)));

        let (tx, _rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let (id, initial) = state.subscribe(tx);
        assert_eq!(initial.to_json(), r#"{"keys":["SHIFT"]}"#);
        assert!(state.hub().disconnect(&id));
    }

    #[test]
    fn test_rejected_overlay_keeps_config() {
        let dir = tempfile::tempdir().unwrap();
        let (state, mut rx) = state(&dir);

        let update = json!({"cols": 3, "single_line": "yes"});
        assert!(state.set_overlay(update.as_object().unwrap()).is_err());
        assert_eq!(state.overlay(), OverlayConfig::default());
        assert!(rx.try_recv().is_err());
    }
}
