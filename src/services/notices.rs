use tokio::sync::broadcast;

const NOTICE_CAPACITY: usize = 16;

/// Sink for user-facing messages. Fetch and mutation failures land here
/// instead of propagating; whatever front end is attached decides how to
/// show them.
pub struct Notices {
    tx: broadcast::Sender<String>,
}

impl Notices {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        // No subscribers is fine, the log line above still lands.
        let _ = self.tx.send(message);
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_errors() {
        let notices = Notices::new();
        let mut rx = notices.subscribe();
        notices.error("feed fetch failed");
        assert_eq!(rx.try_recv().unwrap(), "feed fetch failed");
    }
}
