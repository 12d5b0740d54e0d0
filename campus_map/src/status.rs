use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::watch;

/// Single-slot status line. Publishing replaces whatever was shown.
#[derive(Debug, Clone)]
pub struct StatusChannel {
    tx: watch::Sender<Option<String>>,
    /// Bumped on every publish or clear, always under the channel lock.
    generation: Arc<AtomicU64>,
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusChannel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publish(&self, message: impl Into<String>) {
        self.replace(Some(message.into()));
    }

    pub fn clear(&self) {
        self.replace(None);
    }

    /// Swap the slot and return the generation of the new value.
    fn replace(&self, value: Option<String>) -> u64 {
        if let Some(message) = &value {
            tracing::debug!("status: {message}");
        }
        let mut generation = 0;
        self.tx.send_modify(|current| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = value;
        });
        generation
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }

    /// Publish `message` and clear it after `ttl`, unless something newer
    /// replaced it meanwhile. Requires a running tokio runtime.
    pub fn publish_for(&self, message: impl Into<String>, ttl: Duration) {
        let published = self.replace(Some(message.into()));
        let tx = self.tx.clone();
        let generation = self.generation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            tx.send_if_modified(|current| {
                if generation.load(Ordering::SeqCst) != published {
                    return false;
                }
                generation.fetch_add(1, Ordering::SeqCst);
                current.take().is_some()
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_replaces_and_clear_empties() {
        let status = StatusChannel::new();
        status.publish("Locating...");
        status.publish("Planning route...");
        assert_eq!(status.current().as_deref(), Some("Planning route..."));
        status.clear();
        assert_eq!(status.current(), None);
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let status = StatusChannel::new();
        let mut rx = status.subscribe();
        status.publish("Locating...");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref(), Some("Locating..."));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_message_clears_itself() {
        let status = StatusChannel::new();
        status.publish_for("Location denied", Duration::from_secs(4));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(status.current().as_deref(), Some("Location denied"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(status.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_clear_leaves_newer_message() {
        let status = StatusChannel::new();
        status.publish_for("Location denied", Duration::from_secs(4));
        status.publish("Planning route...");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(status.current().as_deref(), Some("Planning route..."));
    }

    #[tokio::test(start_paused = true)]
    async fn republished_message_gets_a_fresh_lifetime() {
        let status = StatusChannel::new();
        status.publish_for("Location denied", Duration::from_secs(4));
        tokio::time::sleep(Duration::from_secs(2)).await;
        status.publish_for("Location denied", Duration::from_secs(4));

        // the first timer fires at 4 s and must leave the second copy alone
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(status.current().as_deref(), Some("Location denied"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(status.current(), None);
    }
}
