use crate::{
    is_local_origin, protocol, Direction, Fault, FileRecord, Message, Peer, TransferProgress,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

/// The reconciled view of the node at one point in time.
///
/// Every field is replaced wholesale by the matching apply call; nothing is
/// merged across polls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Bumped whenever the content changes.
    pub revision: u64,
    pub local_addr: Option<String>,
    pub peers: Vec<Peer>,
    pub messages: Vec<Message>,
    pub files: Vec<FileRecord>,
    /// Transfers reported over the chat channel, keyed by file name.
    pub transfers: BTreeMap<String, TransferProgress>,
    pub connectivity_fault: Option<Fault>,
    pub action_fault: Option<Fault>,
}

impl Snapshot {
    pub fn is_local(&self, from: &str) -> bool {
        is_local_origin(from, self.local_addr.as_deref())
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.action_fault.as_ref().or(self.connectivity_fault.as_ref())
    }
}

/// One of the four read endpoints polled each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Peers,
    Messages,
    LocalAddr,
    Files,
}

impl Endpoint {
    pub const ALL: [Endpoint; 4] = [
        Endpoint::Peers,
        Endpoint::Messages,
        Endpoint::LocalAddr,
        Endpoint::Files,
    ];

    fn index(self) -> usize {
        match self {
            Endpoint::Peers => 0,
            Endpoint::Messages => 1,
            Endpoint::LocalAddr => 2,
            Endpoint::Files => 3,
        }
    }
}

/// Sole writer of the [`Snapshot`]. Readers take clones or subscribe.
pub struct StateReconciler {
    tx: watch::Sender<Snapshot>,
    discard_stale: bool,
    /// Newest poll cycle applied per endpoint.
    applied_cycles: Mutex<[u64; 4]>,
    last_synced: Mutex<Option<DateTime<Utc>>>,
}

impl StateReconciler {
    pub fn new(discard_stale: bool) -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self {
            tx,
            discard_stale,
            applied_cycles: Mutex::new([0; 4]),
            last_synced: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Time of the last successful read from the node.
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        *self.last_synced.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn apply_peers(&self, peers: Vec<Peer>) {
        self.apply_peers_from(None, peers);
    }

    pub fn apply_messages_and_transfers(&self, raw: Vec<Message>) {
        self.apply_messages_from(None, raw);
    }

    pub fn apply_files(&self, files: Vec<FileRecord>) {
        self.apply_files_from(None, files);
    }

    pub fn apply_local_addr(&self, addr: String) {
        self.apply_local_addr_from(None, addr);
    }

    pub fn apply_peers_from(&self, cycle: Option<u64>, peers: Vec<Peer>) -> bool {
        self.apply(Endpoint::Peers, cycle, |snapshot| {
            if snapshot.peers == peers {
                return false;
            }
            snapshot.peers = peers;
            true
        })
    }

    pub fn apply_messages_from(&self, cycle: Option<u64>, raw: Vec<Message>) -> bool {
        let split = protocol::split(raw);
        self.apply(Endpoint::Messages, cycle, |snapshot| {
            let mut transfers = BTreeMap::new();
            for update in split.progress {
                if update.percent >= 100.0 {
                    transfers.remove(&update.key);
                    continue;
                }
                let direction = classify(&update.peer, snapshot.local_addr.as_deref());
                transfers.insert(
                    update.key.clone(),
                    TransferProgress {
                        key: update.key,
                        percent: update.percent,
                        direction,
                        peer: update.peer,
                    },
                );
            }

            if snapshot.messages == split.chat && snapshot.transfers == transfers {
                return false;
            }
            snapshot.messages = split.chat;
            snapshot.transfers = transfers;
            true
        })
    }

    pub fn apply_files_from(&self, cycle: Option<u64>, files: Vec<FileRecord>) -> bool {
        self.apply(Endpoint::Files, cycle, |snapshot| {
            if snapshot.files == files {
                return false;
            }
            snapshot.files = files;
            true
        })
    }

    pub fn apply_local_addr_from(&self, cycle: Option<u64>, addr: String) -> bool {
        let addr = Some(addr).filter(|a| !a.is_empty());
        self.apply(Endpoint::LocalAddr, cycle, |snapshot| {
            if snapshot.local_addr == addr {
                return false;
            }
            debug!("Local address resolved: {:?}", addr);
            snapshot.local_addr = addr;
            for transfer in snapshot.transfers.values_mut() {
                transfer.direction = classify(&transfer.peer, snapshot.local_addr.as_deref());
            }
            true
        })
    }

    /// Returns whether the fault was newly recorded.
    pub fn record_fault(&self, fault: Fault) -> bool {
        self.modify(|snapshot| {
            let slot = match fault {
                Fault::Connectivity(_) => &mut snapshot.connectivity_fault,
                _ => &mut snapshot.action_fault,
            };
            if slot.as_ref() == Some(&fault) {
                return false;
            }
            *slot = Some(fault);
            true
        })
    }

    pub fn clear_connectivity_fault(&self) -> bool {
        self.modify(|snapshot| snapshot.connectivity_fault.take().is_some())
    }

    pub fn clear_action_fault(&self) -> bool {
        self.modify(|snapshot| snapshot.action_fault.take().is_some())
    }

    fn apply<F>(&self, endpoint: Endpoint, cycle: Option<u64>, update: F) -> bool
    where
        F: FnOnce(&mut Snapshot) -> bool,
    {
        // Held across the update so two results for the same endpoint cannot
        // pass the freshness check and then land in the wrong order.
        let mut cycles = self.applied_cycles.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cycle) = cycle {
            let newest = &mut cycles[endpoint.index()];
            if self.discard_stale && cycle < *newest {
                debug!(
                    "Discarding stale {:?} result from cycle {} (newest {})",
                    endpoint, cycle, newest
                );
                return false;
            }
            *newest = (*newest).max(cycle);
        }

        *self.last_synced.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        self.modify(update);
        true
    }

    fn modify<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut Snapshot) -> bool,
    {
        self.tx.send_if_modified(|snapshot| {
            let changed = update(snapshot);
            if changed {
                snapshot.revision += 1;
            }
            changed
        })
    }
}

impl Default for StateReconciler {
    fn default() -> Self {
        Self::new(false)
    }
}

fn classify(peer: &str, local_addr: Option<&str>) -> Direction {
    if is_local_origin(peer, local_addr) {
        Direction::Sending
    } else {
        Direction::Receiving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(from: &str, content: &str) -> Message {
        Message {
            from: from.to_string(),
            content: content.to_string(),
        }
    }

    fn peer(id: &str) -> Peer {
        Peer {
            id: id.to_string(),
            addresses: vec![format!("/ip4/10.0.0.1/tcp/4001/p2p/{}", id)],
        }
    }

    #[test]
    fn test_progress_direction_follows_local_addr() {
        let reconciler = StateReconciler::default();
        reconciler.apply_local_addr("X".to_string());
        reconciler.apply_messages_and_transfers(vec![msg("X", "FILE_PROGRESS:report.pdf:42.5")]);

        let transfer = reconciler.snapshot().transfers["report.pdf"].clone();
        assert_eq!(transfer.percent, 42.5);
        assert_eq!(transfer.direction, Direction::Sending);

        let reconciler = StateReconciler::default();
        reconciler.apply_local_addr("Y".to_string());
        reconciler.apply_messages_and_transfers(vec![msg("X", "FILE_PROGRESS:report.pdf:42.5")]);
        assert_eq!(
            reconciler.snapshot().transfers["report.pdf"].direction,
            Direction::Receiving
        );
    }

    #[test]
    fn test_local_addr_arrival_reclassifies() {
        let reconciler = StateReconciler::default();
        reconciler.apply_messages_and_transfers(vec![msg("X", "FILE_PROGRESS:a.bin:5")]);
        assert_eq!(
            reconciler.snapshot().transfers["a.bin"].direction,
            Direction::Receiving
        );

        reconciler.apply_local_addr("/ip4/127.0.0.1/tcp/4001/p2p/X".to_string());
        assert_eq!(
            reconciler.snapshot().transfers["a.bin"].direction,
            Direction::Sending
        );
    }

    #[test]
    fn test_identical_polls_are_idempotent() {
        let reconciler = StateReconciler::default();
        let poll = |r: &StateReconciler| {
            r.apply_peers(vec![peer("A"), peer("B")]);
            r.apply_messages_and_transfers(vec![msg("A", "hi"), msg("B", "FILE_PROGRESS:f:1")]);
            r.apply_files(vec![FileRecord {
                name: "f".to_string(),
                from: "B".to_string(),
                size: 3,
            }]);
            r.apply_local_addr("L".to_string());
        };

        poll(&reconciler);
        let first = reconciler.snapshot();
        poll(&reconciler);
        let second = reconciler.snapshot();

        assert_eq!(first, second);
        assert_eq!(second.peers.len(), 2);
        assert_eq!(second.messages.len(), 1);
        assert_eq!(second.files.len(), 1);
        assert!(reconciler.last_synced().is_some());
    }

    #[test]
    fn test_transfers_missing_from_batch_are_dropped() {
        let reconciler = StateReconciler::default();
        reconciler.apply_messages_and_transfers(vec![
            msg("A", "FILE_PROGRESS:one:10"),
            msg("A", "FILE_PROGRESS:two:20"),
        ]);
        assert_eq!(reconciler.snapshot().transfers.len(), 2);

        reconciler.apply_messages_and_transfers(vec![msg("A", "FILE_PROGRESS:two:30")]);
        let transfers = reconciler.snapshot().transfers;
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers["two"].percent, 30.0);
    }

    #[test]
    fn test_completed_transfers_are_not_retained() {
        let reconciler = StateReconciler::default();
        reconciler.apply_messages_and_transfers(vec![
            msg("A", "FILE_PROGRESS:f:50"),
            msg("A", "FILE_PROGRESS:f:100"),
        ]);
        assert!(reconciler.snapshot().transfers.is_empty());
    }

    #[test]
    fn test_latest_report_per_file_wins() {
        let reconciler = StateReconciler::default();
        reconciler.apply_messages_and_transfers(vec![
            msg("A", "FILE_PROGRESS:f:10"),
            msg("A", "FILE_PROGRESS:f:60"),
        ]);
        assert_eq!(reconciler.snapshot().transfers["f"].percent, 60.0);
    }

    #[test]
    fn test_empty_local_addr_is_unresolved() {
        let reconciler = StateReconciler::default();
        reconciler.apply_local_addr(String::new());
        assert_eq!(reconciler.snapshot().local_addr, None);
    }

    #[test]
    fn test_stale_cycle_discarded_when_enabled() {
        let reconciler = StateReconciler::new(true);
        assert!(reconciler.apply_peers_from(Some(2), vec![peer("new")]));
        assert!(!reconciler.apply_peers_from(Some(1), vec![peer("old")]));
        assert_eq!(reconciler.snapshot().peers, vec![peer("new")]);
    }

    #[test]
    fn test_stale_cycle_applied_by_default() {
        let reconciler = StateReconciler::default();
        reconciler.apply_peers_from(Some(2), vec![peer("new")]);
        reconciler.apply_peers_from(Some(1), vec![peer("old")]);
        assert_eq!(reconciler.snapshot().peers, vec![peer("old")]);
    }

    #[test]
    fn test_fault_slots() {
        let reconciler = StateReconciler::default();
        reconciler.record_fault(Fault::Connectivity("down".to_string()));
        reconciler.record_fault(Fault::Validation("too big".to_string()));

        let snapshot = reconciler.snapshot();
        assert_eq!(
            snapshot.connectivity_fault,
            Some(Fault::Connectivity("down".to_string()))
        );
        assert_eq!(snapshot.fault().map(Fault::message), Some("too big"));

        reconciler.clear_action_fault();
        reconciler.clear_connectivity_fault();
        assert_eq!(reconciler.snapshot().fault(), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let reconciler = StateReconciler::default();
        let mut rx = reconciler.subscribe();

        reconciler.apply_peers(vec![peer("A")]);
        assert!(rx.has_changed().unwrap());
        let revision = rx.borrow_and_update().revision;

        reconciler.apply_peers(vec![peer("A")]);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(reconciler.snapshot().revision, revision);
    }
}
