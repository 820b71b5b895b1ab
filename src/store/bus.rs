use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::models::{Data, Updates};

/// How far a slow consumer may fall behind before it starts lagging.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// The single stream through which consumers learn about changes, both
/// server-pushed and locally originated.
///
/// Two channels back it: a watch channel carrying the latest full `Data`
/// snapshot (so a late subscriber always sees one consistent full-entity
/// view before any delta), and a broadcast channel carrying coalesced
/// `Updates`. All derived streams share the one broadcast sender; nothing
/// is re-executed per subscriber.
pub struct UpdateBus {
    data_tx: watch::Sender<Arc<Data>>,
    updates_tx: broadcast::Sender<Updates>,
}

impl UpdateBus {
    pub fn new() -> Self {
        let (data_tx, _) = watch::channel(Arc::new(Data::default()));
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            data_tx,
            updates_tx,
        }
    }

    /// The most recent full snapshot.
    pub fn snapshot(&self) -> Arc<Data> {
        self.data_tx.borrow().clone()
    }

    /// A receiver that yields the current snapshot immediately and every
    /// replacement after it.
    pub fn watch_data(&self) -> watch::Receiver<Arc<Data>> {
        self.data_tx.subscribe()
    }

    /// A delta receiver plus the snapshot current at subscription time.
    /// The receiver is created first so no update published after the
    /// snapshot can be missed.
    pub fn subscribe(&self) -> (Arc<Data>, broadcast::Receiver<Updates>) {
        let rx = self.updates_tx.subscribe();
        (self.snapshot(), rx)
    }

    pub fn updates(&self) -> broadcast::Receiver<Updates> {
        self.updates_tx.subscribe()
    }

    /// Updates whose feed component is non-empty.
    pub fn feed_updates(&self) -> FilteredUpdates {
        FilteredUpdates {
            rx: self.updates_tx.subscribe(),
            accept: |u| !u.feeds.is_empty(),
        }
    }

    /// Updates whose category component is non-empty.
    pub fn category_updates(&self) -> FilteredUpdates {
        FilteredUpdates {
            rx: self.updates_tx.subscribe(),
            accept: |u| !u.categories.is_empty(),
        }
    }

    pub(crate) fn publish_data(&self, data: Arc<Data>) {
        self.data_tx.send_replace(data);
    }

    /// Broadcasts a delta. Empty updates are suppressed; use
    /// `publish_forced` when consumers must re-evaluate derived state
    /// with no entity delta to carry.
    pub(crate) fn publish(&self, u: Updates) {
        if u.is_empty() {
            return;
        }
        // Send only fails when there are no subscribers, which is fine.
        let _ = self.updates_tx.send(u);
    }

    pub(crate) fn publish_forced(&self, u: Updates) {
        let _ = self.updates_tx.send(u);
    }
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A delta receiver that skips updates its predicate rejects. Lagged
/// consumers skip ahead rather than erroring; `None` means the bus is
/// gone.
pub struct FilteredUpdates {
    rx: broadcast::Receiver<Updates>,
    accept: fn(&Updates) -> bool,
}

impl FilteredUpdates {
    pub async fn recv(&mut self) -> Option<Updates> {
        loop {
            match self.rx.recv().await {
                Ok(u) if (self.accept)(&u) => return Some(u),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testutil::{category, feed, item};

    #[test]
    fn late_subscriber_gets_the_latest_snapshot() {
        let bus = UpdateBus::new();
        let data = Arc::new(Data {
            categories: vec![],
            feeds: vec![feed(1, None)],
            items: vec![item(10, 1, false)],
        });
        bus.publish_data(Arc::clone(&data));

        let (snapshot, _rx) = bus.subscribe();
        assert!(Arc::ptr_eq(&snapshot, &data));
    }

    #[tokio::test]
    async fn empty_updates_are_suppressed_unless_forced() {
        let bus = UpdateBus::new();
        let mut rx = bus.updates();

        bus.publish(Updates::empty(false));
        assert!(rx.try_recv().is_err());

        bus.publish_forced(Updates::empty(false));
        let u = rx.try_recv().unwrap();
        assert!(u.is_empty());
    }

    #[tokio::test]
    async fn refresh_marker_counts_as_non_empty() {
        let bus = UpdateBus::new();
        let mut rx = bus.updates();

        bus.publish(Updates::empty(true));
        let u = rx.try_recv().unwrap();
        assert!(u.refresh);
    }

    #[tokio::test]
    async fn derived_streams_filter_but_share_the_bus() {
        let bus = UpdateBus::new();
        let mut feeds_rx = bus.feed_updates();
        let mut categories_rx = bus.category_updates();

        bus.publish(Updates::item(item(1, 1, false)));
        bus.publish(Updates::feed(feed(2, None)));
        bus.publish(Updates::category(category(3, "news")));

        let u = feeds_rx.recv().await.unwrap();
        assert_eq!(u.feeds.len(), 1);
        let u = categories_rx.recv().await.unwrap();
        assert_eq!(u.categories.len(), 1);
    }
}
