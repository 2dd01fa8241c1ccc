//! Notification Bus: a process-wide publisher fed by the out-of-band hook
//! (`POST /api/notify/{sessionId}/{kind}`) and consumed by every open
//! Connection Handler. Keyed by arbitrary subscriber id rather than one
//! receiver per session, since subscribers here filter by per-user
//! preference rather than by session alone.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::store::now_unix;
use crate::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    NeedsInput,
    Completed,
}

impl NotificationKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "needs-input" => Some(Self::NeedsInput),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeedsInput => "needs-input",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub session_id: String,
    pub kind: NotificationKind,
    pub timestamp: i64,
}

type Subscriber = Box<dyn Fn(&Notification) + Send + Sync>;

/// Shared singleton: constructed once in `AppServer`, never a
/// module-scoped global.
pub struct NotificationBus {
    subscribers: DashMap<u64, Subscriber>,
    latest: DashMap<String, Notification>,
    next_id: AtomicU64,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            latest: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a callback invoked on every publish, regardless of session
    /// or preference — the Connection Handler is responsible for filtering
    /// by resolved principal and per-user preference before emitting a
    /// `notification` frame. Takes `self` as an `Arc` so the returned
    /// `Subscription` can hold a `Weak` back-reference instead of a raw
    /// pointer.
    pub fn subscribe(self: &Arc<Self>, callback: Subscriber) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, callback);
        let weak: Weak<NotificationBus> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(bus) = weak.upgrade() {
                bus.subscribers.remove(&id);
            }
        })
    }

    pub fn publish(&self, session_id: &str, kind: NotificationKind) {
        let note = Notification {
            session_id: session_id.to_string(),
            kind,
            timestamp: now_unix(),
        };
        self.latest.insert(session_id.to_string(), note.clone());
        for entry in self.subscribers.iter() {
            let callback = entry.value();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&note);
            }));
            if result.is_err() {
                tracing::warn!(event = "notify.subscriber.panicked");
            }
        }
    }

    pub fn clear_for_session(&self, session_id: &str) {
        self.latest.remove(session_id);
    }

    pub fn latest_for(&self, session_id: &str) -> Option<Notification> {
        self.latest.get(session_id).map(|r| r.value().clone())
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn publish_invokes_every_subscriber() {
        let bus = Arc::new(NotificationBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let _sub = bus.subscribe(Box::new(move |n| seen2.lock().unwrap().push(n.clone())));
        bus.publish("s1", NotificationKind::NeedsInput);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0].session_id, "s1");
    }

    #[test]
    fn cancelled_subscription_stops_receiving() {
        let bus = Arc::new(NotificationBus::new());
        let count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let count2 = Arc::clone(&count);
        let sub = bus.subscribe(Box::new(move |_| {
            count2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));
        bus.publish("s1", NotificationKind::Completed);
        sub.cancel();
        bus.publish("s1", NotificationKind::Completed);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn latest_is_cleared_on_attach() {
        let bus = NotificationBus::new();
        bus.publish("s1", NotificationKind::NeedsInput);
        assert!(bus.latest_for("s1").is_some());
        bus.clear_for_session("s1");
        assert!(bus.latest_for("s1").is_none());
    }

    #[test]
    fn kind_round_trips_through_str() {
        assert_eq!(NotificationKind::parse("needs-input"), Some(NotificationKind::NeedsInput));
        assert_eq!(NotificationKind::parse("completed"), Some(NotificationKind::Completed));
        assert_eq!(NotificationKind::parse("bogus"), None);
        assert_eq!(NotificationKind::NeedsInput.as_str(), "needs-input");
    }
}
