//! Fan-out of state changes to connected overlays.
//!
//! Capture and focus threads never touch subscriber channels. They push
//! [`PushMessage`]s into a [`Notifier`]; a dispatcher task on the server
//! runtime drains it and calls [`BroadcastHub::broadcast`], so every push
//! goes out in the order it was produced.

use crate::config::OverlayConfig;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-subscriber queue depth. A subscriber that falls this far behind is
/// dropped.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

/// A message pushed to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// Key state after a press or release: `{"type":"keys","keys":[..]}`
    Keys(Vec<String>),
    /// Bare key state, `{"keys":[..]}`. Sent as the initial snapshot and
    /// whenever the state is force-cleared.
    Snapshot(Vec<String>),
    /// New overlay styling: `{"type":"config","overlay":{..}}`
    Config(OverlayConfig),
}

impl PushMessage {
    /// The empty bare snapshot sent when held keys are dropped.
    pub fn cleared() -> Self {
        PushMessage::Snapshot(Vec::new())
    }

    pub fn to_json(&self) -> String {
        let value = match self {
            PushMessage::Keys(keys) => json!({ "type": "keys", "keys": keys }),
            PushMessage::Snapshot(keys) => json!({ "keys": keys }),
            PushMessage::Config(overlay) => json!({ "type": "config", "overlay": overlay }),
        };
        value.to_string()
    }
}

/// Registry of live subscribers.
#[derive(Debug, Default)]
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<Arc<str>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, mpsc::Sender<Arc<str>>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a subscriber queue and return its id.
    pub fn connect(&self, sender: mpsc::Sender<Arc<str>>) -> Uuid {
        let id = Uuid::new_v4();
        let count = {
            let mut subscribers = self.lock();
            subscribers.insert(id, sender);
            subscribers.len()
        };
        tracing::debug!(%id, count, "Subscriber connected");
        id
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn disconnect(&self, id: &Uuid) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            tracing::debug!(%id, "Subscriber disconnected");
        }
        removed
    }

    /// Deliver `message` to every subscriber without waiting.
    ///
    /// Subscribers whose queue is closed or full are removed. Returns the
    /// number of subscribers the message was queued for.
    pub fn broadcast(&self, message: &PushMessage) -> usize {
        let payload: Arc<str> = Arc::from(message.to_json());

        let mut subscribers = self.lock();
        let mut dead = Vec::new();
        for (id, sender) in subscribers.iter() {
            if sender.try_send(payload.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in &dead {
            subscribers.remove(id);
            tracing::debug!(%id, "Dropped unresponsive subscriber");
        }
        subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Thread-safe handle for queueing pushes from any context.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<PushMessage>,
}

impl Notifier {
    /// Queue a message. Dropped silently once the dispatcher has shut down.
    pub fn notify(&self, message: PushMessage) {
        if self.sender.send(message).is_err() {
            tracing::debug!("Dispatcher gone, dropping push");
        }
    }
}

/// Create a notifier and the receiving end for [`spawn_dispatcher`].
pub fn notifier() -> (Notifier, mpsc::UnboundedReceiver<PushMessage>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Notifier { sender }, receiver)
}

/// Drain queued pushes into the hub until every [`Notifier`] is dropped.
pub fn spawn_dispatcher(
    hub: Arc<BroadcastHub>,
    mut receiver: mpsc::UnboundedReceiver<PushMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            hub.broadcast(&message);
        }
        tracing::debug!("Dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(hub: &BroadcastHub) -> (Uuid, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        (hub.connect(tx), rx)
    }

    fn parse(payload: &str) -> serde_json::Value {
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn test_message_shapes() {
        let keys = parse(&PushMessage::Keys(vec!["A".to_string()]).to_json());
        assert_eq!(keys, json!({"type": "keys", "keys": ["A"]}));

        assert_eq!(PushMessage::cleared().to_json(), r#"{"keys":[]}"#);

        let config = parse(&PushMessage::Config(OverlayConfig::default()).to_json());
        assert_eq!(config["type"], "config");
        assert_eq!(config["overlay"]["cols"], 8);
    }

    #[test]
    fn test_broadcast_reaches_all() {
        let hub = BroadcastHub::new();
        let (_, mut a) = subscriber(&hub);
        let (_, mut b) = subscriber(&hub);

        assert_eq!(hub.broadcast(&PushMessage::Keys(vec!["B".to_string()])), 2);
        let expected = json!({"type": "keys", "keys": ["B"]});
        assert_eq!(parse(&a.try_recv().unwrap()), expected);
        assert_eq!(parse(&b.try_recv().unwrap()), expected);
    }

    #[test]
    fn test_closed_subscriber_pruned() {
        let hub = BroadcastHub::new();
        let (_, mut alive) = subscriber(&hub);
        let (_, dead) = subscriber(&hub);
        drop(dead);

        assert_eq!(hub.broadcast(&PushMessage::cleared()), 1);
        assert_eq!(hub.len(), 1);
        assert_eq!(&*alive.try_recv().unwrap(), r#"{"keys":[]}"#);
    }

    #[test]
    fn test_full_subscriber_pruned() {
        let hub = BroadcastHub::new();
        let (tx, _slow) = mpsc::channel(1);
        hub.connect(tx);
        let (_, mut fast) = subscriber(&hub);

        hub.broadcast(&PushMessage::cleared());
        hub.broadcast(&PushMessage::cleared());

        assert_eq!(hub.len(), 1);
        assert!(fast.try_recv().is_ok());
        assert!(fast.try_recv().is_ok());
    }

    #[test]
    fn test_disconnect() {
        let hub = BroadcastHub::new();
        let (id, _rx) = subscriber(&hub);
        assert!(hub.disconnect(&id));
        assert!(!hub.disconnect(&id));
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_dispatcher_forwards_in_order() {
        let hub = Arc::new(BroadcastHub::new());
        let (_, mut rx) = subscriber(&hub);
        let (notifier, receiver) = notifier();
        let dispatcher = spawn_dispatcher(hub.clone(), receiver);

        notifier.notify(PushMessage::Keys(vec!["A".to_string()]));
        notifier.notify(PushMessage::cleared());
        drop(notifier);
        dispatcher.await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(parse(&first), json!({"type": "keys", "keys": ["A"]}));
        assert_eq!(&*rx.recv().await.unwrap(), r#"{"keys":[]}"#);
    }
}
