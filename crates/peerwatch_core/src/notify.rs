use crate::{Notification, NotificationKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

struct Inner {
    tx: watch::Sender<Option<Notification>>,
    generation: AtomicU64,
    ttl: Duration,
}

/// Single-slot, self-expiring user feedback. A new notification replaces the
/// current one and restarts the expiry window.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl NotificationCenter {
    pub fn new(ttl: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                tx,
                generation: AtomicU64::new(0),
                ttl,
            }),
        }
    }

    /// Must be called from within a tokio runtime; expiry runs as a task.
    pub fn show(&self, message: impl Into<String>, kind: NotificationKind) {
        let message = message.into();
        debug!("Notification: {}", message);

        let expires_at = Instant::now() + self.inner.ttl;
        let mut generation = 0;
        self.inner.tx.send_modify(|slot| {
            generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *slot = Some(Notification {
                message,
                kind,
                expires_at,
            });
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            inner.tx.send_if_modified(|slot| {
                if inner.generation.load(Ordering::SeqCst) != generation {
                    return false;
                }
                slot.take().is_some()
            });
        });
    }

    pub fn dismiss(&self) {
        self.inner.tx.send_if_modified(|slot| {
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            slot.take().is_some()
        });
    }

    pub fn current(&self) -> Option<Notification> {
        self.inner.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Notification>> {
        self.inner.tx.subscribe()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(NOTIFICATION_TTL)
    }
}
