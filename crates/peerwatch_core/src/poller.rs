use crate::{BackendLocation, Endpoint, Fault, NodeApi, Result, StateReconciler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

const CONNECTIVITY_MESSAGE: &str = "Failed to connect to backend server";

/// Fetch one endpoint and hand the result to the reconciler. Failures become
/// a connectivity fault; success clears it.
pub async fn poll_endpoint(
    api: &dyn NodeApi,
    reconciler: &StateReconciler,
    base: &BackendLocation,
    endpoint: Endpoint,
    cycle: Option<u64>,
) -> Result<()> {
    let result = match endpoint {
        Endpoint::Peers => api
            .peers(base)
            .await
            .map(|peers| reconciler.apply_peers_from(cycle, peers)),
        Endpoint::Messages => api
            .messages(base)
            .await
            .map(|raw| reconciler.apply_messages_from(cycle, raw)),
        Endpoint::LocalAddr => api
            .local_addr(base)
            .await
            .map(|addr| reconciler.apply_local_addr_from(cycle, addr)),
        Endpoint::Files => api
            .files(base)
            .await
            .map(|files| reconciler.apply_files_from(cycle, files)),
    };

    match result {
        Ok(_) => {
            if reconciler.clear_connectivity_fault() {
                info!("Backend at {} reachable again", base);
            }
            Ok(())
        }
        Err(e) => {
            if reconciler.record_fault(Fault::Connectivity(CONNECTIVITY_MESSAGE.to_string())) {
                warn!("Polling {:?} from {} failed: {}", endpoint, base, e);
            } else {
                debug!("Polling {:?} still failing: {}", endpoint, e);
            }
            Err(e)
        }
    }
}

/// Run all four reads concurrently and wait for every one of them. Returns
/// the first error, after all results have been applied.
pub async fn poll_once(
    api: &dyn NodeApi,
    reconciler: &StateReconciler,
    base: &BackendLocation,
) -> Result<()> {
    let (peers, messages, local, files) = tokio::join!(
        poll_endpoint(api, reconciler, base, Endpoint::Peers, None),
        poll_endpoint(api, reconciler, base, Endpoint::Messages, None),
        poll_endpoint(api, reconciler, base, Endpoint::LocalAddr, None),
        poll_endpoint(api, reconciler, base, Endpoint::Files, None),
    );
    peers.and(messages).and(local).and(files)
}

/// Repeating refresh of the snapshot.
pub struct Poller {
    api: Arc<dyn NodeApi>,
    reconciler: Arc<StateReconciler>,
    location: watch::Receiver<Option<BackendLocation>>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        api: Arc<dyn NodeApi>,
        reconciler: Arc<StateReconciler>,
        location: watch::Receiver<Option<BackendLocation>>,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            reconciler,
            location,
            interval,
        }
    }

    /// Start ticking. The first cycle runs immediately; polling stops when
    /// the returned handle is stopped or dropped.
    pub fn start(self) -> PollerHandle {
        let shutdown = Arc::new(Notify::new());
        let shutdown_task = Arc::clone(&shutdown);
        let task = tokio::spawn(self.run(shutdown_task));
        PollerHandle {
            shutdown,
            task: Some(task),
        }
    }

    async fn run(self, shutdown: Arc<Notify>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle = 0u64;

        info!("Polling every {:?}", self.interval);
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("Polling stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(base) = self.location.borrow().clone() else {
                        debug!("Backend location not known yet, skipping tick");
                        continue;
                    };
                    cycle += 1;
                    self.spawn_cycle(base, cycle);
                }
            }
        }
    }

    // Each read applies on its own as soon as it resolves; a cycle is not
    // awaited before the next tick.
    fn spawn_cycle(&self, base: BackendLocation, cycle: u64) {
        for endpoint in Endpoint::ALL {
            let api = Arc::clone(&self.api);
            let reconciler = Arc::clone(&self.reconciler);
            let base = base.clone();
            tokio::spawn(async move {
                let _ = poll_endpoint(api.as_ref(), &reconciler, &base, endpoint, Some(cycle)).await;
            });
        }
    }
}

/// Owns the running poll task.
pub struct PollerHandle {
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop ticking and wait for the task to exit. Reads already in flight
    /// still land when they resolve.
    pub async fn stop(mut self) {
        self.shutdown.notify_one();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileRecord, Message, MockNodeApi, MockNodeState, Peer};

    fn node() -> MockNodeApi {
        MockNodeApi::new(MockNodeState {
            peers: vec![Peer {
                id: "QmA".to_string(),
                addresses: vec!["/ip4/10.0.0.2/tcp/4001".to_string()],
            }],
            messages: vec![
                Message {
                    from: "QmA".to_string(),
                    content: "hi".to_string(),
                },
                Message {
                    from: "QmA".to_string(),
                    content: "FILE_PROGRESS:x.bin:50".to_string(),
                },
            ],
            local_addr: "/ip4/10.0.0.1/tcp/4001/p2p/QmSelf".to_string(),
            files: vec![FileRecord {
                name: "x.bin".to_string(),
                from: "QmA".to_string(),
                size: 10,
            }],
            ..MockNodeState::default()
        })
    }

    fn location() -> BackendLocation {
        BackendLocation::from_port("localhost", None).unwrap()
    }

    #[tokio::test]
    async fn test_poll_once_fills_snapshot() {
        let api = node();
        let reconciler = StateReconciler::default();
        poll_once(&api, &reconciler, &location()).await.unwrap();

        let snapshot = reconciler.snapshot();
        assert_eq!(snapshot.peers.len(), 1);
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.transfers["x.bin"].percent, 50.0);
        assert!(snapshot.local_addr.is_some());
        assert!(snapshot.connectivity_fault.is_none());
    }

    #[tokio::test]
    async fn test_failure_sets_fault_and_recovery_clears_it() {
        let api = node();
        api.update(|s| s.reads_fail = true);
        let reconciler = StateReconciler::default();

        assert!(poll_once(&api, &reconciler, &location()).await.is_err());
        assert_eq!(
            reconciler.snapshot().connectivity_fault,
            Some(Fault::Connectivity(CONNECTIVITY_MESSAGE.to_string()))
        );

        api.update(|s| s.reads_fail = false);
        poll_once(&api, &reconciler, &location()).await.unwrap();
        assert!(reconciler.snapshot().connectivity_fault.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_stopped() {
        let api = Arc::new(node());
        let reconciler = Arc::new(StateReconciler::default());
        let (_tx, rx) = watch::channel(Some(location()));

        let handle = Poller::new(api.clone(), Arc::clone(&reconciler), rx, POLL_INTERVAL).start();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(handle.is_running());
        handle.stop().await;

        // Ticks at 0, 500 and 1000 ms, four reads each.
        let calls = api.calls().len();
        assert_eq!(calls, 12);
        assert_eq!(reconciler.snapshot().peers.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.calls().len(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_location_is_noop() {
        let api = Arc::new(node());
        let reconciler = Arc::new(StateReconciler::default());
        let (tx, rx) = watch::channel(None);

        let handle = Poller::new(api.clone(), Arc::clone(&reconciler), rx, POLL_INTERVAL).start();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(api.calls().is_empty());

        tx.send_replace(Some(location()));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!api.calls().is_empty());
        drop(handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_reads_do_not_stop_polling() {
        let api = Arc::new(node());
        api.update(|s| s.reads_fail = true);
        let reconciler = Arc::new(StateReconciler::default());
        let (_tx, rx) = watch::channel(Some(location()));

        let handle = Poller::new(api.clone(), Arc::clone(&reconciler), rx, POLL_INTERVAL).start();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(reconciler.snapshot().connectivity_fault.is_some());

        api.update(|s| s.reads_fail = false);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(reconciler.snapshot().connectivity_fault.is_none());
        assert_eq!(reconciler.snapshot().files.len(), 1);
        handle.stop().await;
    }
}
