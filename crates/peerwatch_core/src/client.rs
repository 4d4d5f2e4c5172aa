use crate::{
    poll_endpoint, poll_once, Action, BackendLocation, Clipboard, Endpoint, Fault, Guard, HttpNodeApi,
    NodeApi, NotificationCenter, NotificationKind, PeerwatchConfig, PeerwatchError, Poller,
    PollerHandle, Result, SendHandle, SentFile, Snapshot, StateReconciler,
    TransferTracker, UploadCandidate,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};

/// Entry point for everything the user can do against the node. Owns the
/// reconciler, the upload tracker and the notification slot.
pub struct PeerClient {
    api: Arc<dyn NodeApi>,
    config: PeerwatchConfig,
    guard: Guard,
    reconciler: Arc<StateReconciler>,
    notifications: NotificationCenter,
    tracker: TransferTracker,
    location: watch::Sender<Option<BackendLocation>>,
    selected_file: Arc<Mutex<Option<PathBuf>>>,
}

impl PeerClient {
    pub fn new(config: PeerwatchConfig, api: Arc<dyn NodeApi>) -> Self {
        let guard = Guard::new(config.transfer.max_upload_bytes);
        let reconciler = Arc::new(StateReconciler::new(config.poll.discard_stale));
        let notifications = NotificationCenter::new(config.ui.notification_ttl());
        let (location, location_rx) = watch::channel(None);
        let selected_file = Arc::new(Mutex::new(None));

        let hook = {
            let api = Arc::clone(&api);
            let reconciler = Arc::clone(&reconciler);
            let selected_file = Arc::clone(&selected_file);
            move |sent: SentFile| {
                *selected_file.lock().unwrap_or_else(|e| e.into_inner()) = None;
                let Some(base) = location_rx.borrow().clone() else {
                    return;
                };
                let api = Arc::clone(&api);
                let reconciler = Arc::clone(&reconciler);
                tokio::spawn(async move {
                    let _ = poll_endpoint(api.as_ref(), &reconciler, &base, Endpoint::Files, None)
                        .await;
                });
                info!("Refreshing files after sending {} to {}", sent.file_name, sent.peer_id);
            }
        };

        let tracker = TransferTracker::with_success_hook(
            Arc::clone(&api),
            guard,
            config.transfer.completion_grace(),
            notifications.clone(),
            Arc::clone(&reconciler),
            hook,
        );

        Self {
            api,
            config,
            guard,
            reconciler,
            notifications,
            tracker,
            location,
            selected_file,
        }
    }

    /// Client talking HTTP to the node at `location`.
    pub fn with_http(config: PeerwatchConfig, location: BackendLocation) -> Self {
        let api = Arc::new(HttpNodeApi::new(config.backend.request_timeout()));
        let client = Self::new(config, api);
        client.set_location(Some(location));
        client
    }

    pub fn config(&self) -> &PeerwatchConfig {
        &self.config
    }

    pub fn set_location(&self, location: Option<BackendLocation>) {
        if let Some(location) = &location {
            info!("Backend location: {}", location);
        }
        self.location.send_replace(location);
    }

    pub fn location(&self) -> Option<BackendLocation> {
        self.location.borrow().clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.reconciler.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.reconciler.subscribe()
    }

    pub fn reconciler(&self) -> &Arc<StateReconciler> {
        &self.reconciler
    }

    pub fn tracker(&self) -> &TransferTracker {
        &self.tracker
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    /// Start the repeating refresh. Dropping the handle stops it.
    pub fn start_polling(&self) -> PollerHandle {
        Poller::new(
            Arc::clone(&self.api),
            Arc::clone(&self.reconciler),
            self.location.subscribe(),
            self.config.poll.interval(),
        )
        .start()
    }

    /// One full poll cycle, awaited.
    pub async fn refresh_all(&self) -> Result<()> {
        let base = self.require_location()?;
        poll_once(self.api.as_ref(), &self.reconciler, &base).await
    }

    pub async fn refresh(&self, endpoint: Endpoint) -> Result<()> {
        let base = self.require_location()?;
        poll_endpoint(self.api.as_ref(), &self.reconciler, &base, endpoint, None).await
    }

    pub async fn connect(&self, addr: &str) -> Result<()> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(self.reject("Peer address is required"));
        }
        let base = self.begin_action()?;

        info!("Connecting to {}", addr);
        if let Err(e) = self.api.connect(&base, addr).await {
            return Err(self.action_failed(Action::Connect, e, "Failed to connect to peer"));
        }

        let _ = self.refresh(Endpoint::Peers).await;
        self.notifications
            .show("Successfully connected to peer", NotificationKind::Success);
        Ok(())
    }

    pub async fn broadcast(&self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(self.reject("Message is empty"));
        }
        let base = self.begin_action()?;

        if let Err(e) = self.api.broadcast(&base, message).await {
            return Err(self.action_failed(Action::Broadcast, e, "Failed to send message"));
        }

        let _ = self.refresh(Endpoint::Messages).await;
        self.notifications.show("Message sent", NotificationKind::Success);
        Ok(())
    }

    pub fn select_file(&self, path: Option<PathBuf>) {
        *self.selected_file.lock().unwrap_or_else(|e| e.into_inner()) = path;
    }

    pub fn selected_file(&self) -> Option<PathBuf> {
        self.selected_file
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Send the selected file to `peer_id`.
    pub async fn send_selected(&self, peer_id: &str) -> Result<SendHandle> {
        let Some(path) = self.selected_file() else {
            return Err(self.reject("No file selected"));
        };
        self.send_file(peer_id, &path).await
    }

    /// Upload `path` to `peer_id`. The size is checked against the file's
    /// metadata before anything is read or sent.
    pub async fn send_file(&self, peer_id: &str, path: &Path) -> Result<SendHandle> {
        let base = self.require_location()?;

        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                return Err(self.action_failed(Action::SendFile, e.into(), "Failed to send file"))
            }
        };
        if let Err(rejection) = self.guard.validate_size(size) {
            return Err(self.reject(&rejection.to_string()));
        }

        let candidate = match UploadCandidate::from_path(path).await {
            Ok(candidate) => candidate,
            Err(e) => return Err(self.action_failed(Action::SendFile, e, "Failed to send file")),
        };

        self.tracker
            .begin_send(&base, peer_id, candidate)
            .map_err(|rejected| PeerwatchError::Validation(rejected.to_string()))
    }

    /// Fetch a received file and write it into `dir` (or the configured
    /// download directory).
    pub async fn download(&self, name: &str, dir: Option<&Path>) -> Result<PathBuf> {
        let Some(file_name) = Path::new(name).file_name() else {
            return Err(self.reject("Invalid file name"));
        };
        let dir = dir
            .map(Path::to_path_buf)
            .or_else(|| self.config.transfer.download_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let target = dir.join(file_name);
        let base = self.begin_action()?;

        let data = match self.api.download(&base, name).await {
            Ok(data) => data,
            Err(e) => return Err(self.action_failed(Action::Download, e, "Failed to download file")),
        };
        let written = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&target, &data).await
        };
        if let Err(e) = written.await {
            return Err(self.action_failed(Action::Download, e.into(), "Failed to save file"));
        }

        info!("Saved {} ({} bytes) to {}", name, data.len(), target.display());
        self.notifications
            .show(format!("Saved \"{}\"", name), NotificationKind::Info);
        Ok(target)
    }

    /// Put `addr` on the clipboard. Without a clipboard the copy fails as
    /// an action fault.
    pub async fn copy_address(
        &self,
        addr: &str,
        clipboard: Option<&dyn Clipboard>,
    ) -> Result<()> {
        self.reconciler.clear_action_fault();
        let result = match clipboard {
            Some(clipboard) => clipboard.set_contents(addr).await,
            None => Err(PeerwatchError::Clipboard("No clipboard available".to_string())),
        };
        if let Err(e) = result {
            return Err(self.action_failed(Action::CopyAddress, e, "Failed to copy address"));
        }

        self.notifications
            .show("Address copied to clipboard", NotificationKind::Info);
        Ok(())
    }

    fn require_location(&self) -> Result<BackendLocation> {
        self.location().ok_or_else(|| {
            let message = "Backend location not known".to_string();
            self.reconciler
                .record_fault(Fault::Connectivity(message.clone()));
            PeerwatchError::Network(message)
        })
    }

    fn begin_action(&self) -> Result<BackendLocation> {
        let base = self.require_location()?;
        self.reconciler.clear_action_fault();
        Ok(base)
    }

    fn reject(&self, message: &str) -> PeerwatchError {
        warn!("{}", message);
        self.reconciler
            .record_fault(Fault::Validation(message.to_string()));
        PeerwatchError::Validation(message.to_string())
    }

    fn action_failed(&self, action: Action, error: PeerwatchError, fallback: &str) -> PeerwatchError {
        warn!("{} failed: {}", action, error);
        let message = match &error {
            PeerwatchError::Http { body, .. } if !body.is_empty() => body.clone(),
            _ => fallback.to_string(),
        };
        self.reconciler.record_fault(Fault::Action { action, message });
        error
    }
}
