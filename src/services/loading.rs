use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// Counted loading state for spinner-style consumers. Every start is
/// paired with a finish through the returned guard, so the counter
/// drains on error paths too and the indicator can never stick.
pub struct LoadingTracker {
    count: Mutex<usize>,
    tx: watch::Sender<bool>,
}

impl LoadingTracker {
    pub fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(false);
        Arc::new(Self {
            count: Mutex::new(0),
            tx,
        })
    }

    pub fn start(self: &Arc<Self>) -> LoadingGuard {
        {
            let mut count = self.count.lock().unwrap();
            if *count == 0 {
                self.tx.send_replace(true);
            }
            *count += 1;
        }
        LoadingGuard {
            tracker: Arc::clone(self),
        }
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            if *count == 0 {
                self.tx.send_replace(false);
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        *self.count.lock().unwrap() > 0
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

pub struct LoadingGuard {
    tracker: Arc<LoadingTracker>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.tracker.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_guards_drain_to_zero() {
        let tracker = LoadingTracker::new();
        assert!(!tracker.is_loading());

        let first = tracker.start();
        let second = tracker.start();
        assert!(tracker.is_loading());

        drop(first);
        assert!(tracker.is_loading());
        drop(second);
        assert!(!tracker.is_loading());
    }

    #[test]
    fn watchers_see_edge_transitions_only() {
        let tracker = LoadingTracker::new();
        let rx = tracker.watch();

        let guard = tracker.start();
        assert!(*rx.borrow());
        // A second guard doesn't re-signal.
        let inner = tracker.start();
        drop(inner);
        assert!(*rx.borrow());

        drop(guard);
        assert!(!*rx.borrow());
    }

    #[test]
    fn guard_drains_even_when_work_fails() {
        let tracker = LoadingTracker::new();
        let result: Result<(), &str> = (|| {
            let _guard = tracker.start();
            Err("network down")
        })();
        assert!(result.is_err());
        assert!(!tracker.is_loading());
    }
}
