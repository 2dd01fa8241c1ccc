//! A cancel-on-drop handle returned by every `subscribe_*` call in this crate
//! (Session Manager data/exit subscriptions, Notification Bus subscriptions).
//! Holding it keeps the registration alive; dropping it — explicitly via
//! [`Subscription::cancel`] or implicitly when it goes out of scope — removes
//! the registration.

/// Cancels a registration when dropped or when [`cancel`](Subscription::cancel)
/// is called explicitly. The two are equivalent; `cancel` just makes the
/// intent visible at the call site instead of relying on scope exit.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// No-op subscription; useful where a call site needs a `Subscription`
    /// value but nothing to tear down.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(f) = self.cancel.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.cancel.take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn drop_runs_cancel_exactly_once() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        {
            let _sub = Subscription::new(move || flag.store(true, Ordering::SeqCst));
        }
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn explicit_cancel_runs_once_and_drop_is_then_a_noop() {
        let count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let c = Arc::clone(&count);
        let sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
