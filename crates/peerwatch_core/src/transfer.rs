use crate::{
    Action, BackendLocation, Fault, Guard, NodeApi, NotificationCenter, NotificationKind,
    PeerwatchError, Rejection, StateReconciler, UploadCandidate,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

pub const COMPLETION_GRACE: Duration = Duration::from_secs(1);

/// One outbound upload, keyed by the receiving peer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundSend {
    pub file_name: String,
    pub percent: f64,
    ticket: u64,
}

pub type SendProgressMap = BTreeMap<String, OutboundSend>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Completed,
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendRejected {
    #[error("{0}")]
    TooLarge(Rejection),
    #[error("A file is already being sent to {0}")]
    Busy(String),
}

/// Details of a successful upload, passed to the success hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFile {
    pub peer_id: String,
    pub file_name: String,
}

type SuccessHook = Arc<dyn Fn(SentFile) + Send + Sync>;

pub struct SendHandle {
    pub peer_id: String,
    outcome: oneshot::Receiver<SendOutcome>,
}

impl SendHandle {
    pub async fn finished(self) -> SendOutcome {
        self.outcome
            .await
            .unwrap_or_else(|_| SendOutcome::Failed("Upload task ended unexpectedly".to_string()))
    }
}

struct Inner {
    api: Arc<dyn NodeApi>,
    guard: Guard,
    grace: Duration,
    notifications: NotificationCenter,
    reconciler: Arc<StateReconciler>,
    progress: watch::Sender<SendProgressMap>,
    next_ticket: AtomicU64,
    on_success: Option<SuccessHook>,
}

/// Tracks our own upload bytes per peer. The node's echoed progress reports
/// describe the receiver's side and are handled by the reconciler instead.
#[derive(Clone)]
pub struct TransferTracker {
    inner: Arc<Inner>,
}

impl TransferTracker {
    pub fn new(
        api: Arc<dyn NodeApi>,
        guard: Guard,
        grace: Duration,
        notifications: NotificationCenter,
        reconciler: Arc<StateReconciler>,
    ) -> Self {
        Self::build(api, guard, grace, notifications, reconciler, None)
    }

    /// Like [`TransferTracker::new`], calling `hook` after each successful upload.
    pub fn with_success_hook<F>(
        api: Arc<dyn NodeApi>,
        guard: Guard,
        grace: Duration,
        notifications: NotificationCenter,
        reconciler: Arc<StateReconciler>,
        hook: F,
    ) -> Self
    where
        F: Fn(SentFile) + Send + Sync + 'static,
    {
        Self::build(api, guard, grace, notifications, reconciler, Some(Arc::new(hook)))
    }

    fn build(
        api: Arc<dyn NodeApi>,
        guard: Guard,
        grace: Duration,
        notifications: NotificationCenter,
        reconciler: Arc<StateReconciler>,
        on_success: Option<SuccessHook>,
    ) -> Self {
        let (progress, _rx) = watch::channel(SendProgressMap::new());
        Self {
            inner: Arc::new(Inner {
                api,
                guard,
                grace,
                notifications,
                reconciler,
                progress,
                next_ticket: AtomicU64::new(1),
                on_success,
            }),
        }
    }

    pub fn progress(&self) -> SendProgressMap {
        self.inner.progress.borrow().clone()
    }

    pub fn percent(&self, peer_id: &str) -> Option<f64> {
        self.inner.progress.borrow().get(peer_id).map(|s| s.percent)
    }

    pub fn subscribe(&self) -> watch::Receiver<SendProgressMap> {
        self.inner.progress.subscribe()
    }

    /// A peer accepts a new upload unless one is defined and below 100%.
    pub fn can_send(&self, peer_id: &str) -> bool {
        self.percent(peer_id).map_or(true, |p| p >= 100.0)
    }

    /// Validate and start an upload to `peer_id`. Rejections make no request
    /// and leave the progress map untouched.
    pub fn begin_send(
        &self,
        base: &BackendLocation,
        peer_id: &str,
        candidate: UploadCandidate,
    ) -> Result<SendHandle, SendRejected> {
        if let Err(rejection) = self.inner.guard.validate(&candidate) {
            warn!("Rejected upload of {}: {}", candidate.name, rejection);
            self.inner
                .reconciler
                .record_fault(Fault::Validation(rejection.to_string()));
            return Err(SendRejected::TooLarge(rejection));
        }

        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::SeqCst);
        let file_name = candidate.name.clone();
        let mut busy = false;
        self.inner.progress.send_if_modified(|map| {
            if map.get(peer_id).is_some_and(|s| s.percent < 100.0) {
                busy = true;
                return false;
            }
            map.insert(
                peer_id.to_string(),
                OutboundSend {
                    file_name: file_name.clone(),
                    percent: 0.0,
                    ticket,
                },
            );
            true
        });
        if busy {
            return Err(SendRejected::Busy(peer_id.to_string()));
        }

        self.inner.reconciler.clear_action_fault();
        info!(
            "Sending {} ({} bytes) to {}",
            candidate.name,
            candidate.size(),
            peer_id
        );

        let (done_tx, done_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let base = base.clone();
        let peer = peer_id.to_string();
        tokio::spawn(async move {
            let outcome = run_upload(&inner, &base, &peer, ticket, candidate).await;
            let _ = done_tx.send(outcome);
        });

        Ok(SendHandle {
            peer_id: peer_id.to_string(),
            outcome: done_rx,
        })
    }
}

async fn run_upload(
    inner: &Arc<Inner>,
    base: &BackendLocation,
    peer_id: &str,
    ticket: u64,
    candidate: UploadCandidate,
) -> SendOutcome {
    let file_name = candidate.name.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let upload = inner.api.send_file(base, peer_id, candidate, tx);
    tokio::pin!(upload);

    let result = loop {
        tokio::select! {
            result = &mut upload => break result,
            Some(progress) = rx.recv() => {
                set_percent(inner, peer_id, ticket, progress.percent());
            }
        }
    };

    match result {
        Ok(()) => {
            set_percent(inner, peer_id, ticket, 100.0);
            info!("Sent {} to {}", file_name, peer_id);
            inner.notifications.show(
                format!("File \"{}\" sent successfully", file_name),
                NotificationKind::Success,
            );
            if let Some(hook) = &inner.on_success {
                hook(SentFile {
                    peer_id: peer_id.to_string(),
                    file_name,
                });
            }

            let inner = Arc::clone(inner);
            let peer = peer_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(inner.grace).await;
                remove_entry(&inner, &peer, ticket);
            });
            SendOutcome::Completed
        }
        Err(e) => {
            let message = failure_message(&e);
            warn!("Sending {} to {} failed: {}", file_name, peer_id, e);
            inner.reconciler.record_fault(Fault::Action {
                action: Action::SendFile,
                message: message.clone(),
            });
            remove_entry(inner, peer_id, ticket);
            SendOutcome::Failed(message)
        }
    }
}

fn failure_message(error: &PeerwatchError) -> String {
    match error {
        PeerwatchError::Http { body, .. } if !body.is_empty() => body.clone(),
        PeerwatchError::Http { .. } => "Failed to send file".to_string(),
        PeerwatchError::Network(_) => "Network error occurred".to_string(),
        other => format!("Failed to send file: {}", other),
    }
}

fn set_percent(inner: &Inner, peer_id: &str, ticket: u64, percent: f64) {
    inner.progress.send_if_modified(|map| match map.get_mut(peer_id) {
        Some(entry) if entry.ticket == ticket && entry.percent != percent => {
            entry.percent = percent.clamp(0.0, 100.0);
            true
        }
        _ => false,
    });
}

// Only the upload that created an entry may remove it.
fn remove_entry(inner: &Inner, peer_id: &str, ticket: u64) {
    inner.progress.send_if_modified(|map| {
        if map.get(peer_id).is_some_and(|e| e.ticket == ticket) {
            map.remove(peer_id);
            debug!("Cleared send progress for {}", peer_id);
            return true;
        }
        false
    });
}
