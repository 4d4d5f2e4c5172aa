pub mod api;
pub mod client;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod guard;
pub mod location;
pub mod notify;
pub mod poller;
pub mod protocol;
pub mod reconciler;
pub mod transfer;

pub use api::*;
pub use client::*;
pub use clipboard::*;
pub use config::*;
pub use error::*;
pub use guard::*;
pub use location::*;
pub use notify::*;
pub use poller::*;
pub use protocol::*;
pub use reconciler::*;
pub use transfer::*;

use serde::{Deserialize, Serialize};

/// A connected peer. Decoded from either `{ID, Addrs}` or `{id, addrs}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WirePeer")]
pub struct Peer {
    pub id: String,
    pub addresses: Vec<String>,
}

#[derive(Deserialize)]
struct WirePeer {
    #[serde(rename = "ID", alias = "id")]
    id: String,
    #[serde(rename = "Addrs", alias = "addrs", default)]
    addrs: Option<Vec<String>>,
}

impl From<WirePeer> for Peer {
    fn from(wire: WirePeer) -> Self {
        Self {
            id: wire.id,
            addresses: wire.addrs.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub content: String,
}

/// A file received by the local node. The node also ships the raw bytes in a
/// `Data` field, which is ignored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(rename = "From", alias = "from")]
    pub from: String,
    #[serde(rename = "Size", alias = "size")]
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Sending,
    Receiving,
}

/// Progress of one file currently moving between nodes, keyed by file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub key: String,
    pub percent: f64,
    pub direction: Direction,
    pub peer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Info,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
    pub expires_at: tokio::time::Instant,
}

/// Shorten a peer ID for display: first 6 and last 4 characters.
pub fn short_peer_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 10 {
        return id.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Whether a record reported by `from` originated at the local node.
///
/// The node reports its own address as a full multiaddr ending in
/// `/p2p/<peer id>` while messages carry the bare peer ID, so both forms match.
pub fn is_local_origin(from: &str, local_addr: Option<&str>) -> bool {
    match local_addr {
        Some(local) if !local.is_empty() => {
            from == local
                || local
                    .strip_suffix(from)
                    .is_some_and(|prefix| prefix.ends_with("/p2p/"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_decodes_both_casings() {
        let upper: Peer =
            serde_json::from_str(r#"{"ID":"QmA","Addrs":["/ip4/1.2.3.4/tcp/1"]}"#).unwrap();
        let lower: Peer = serde_json::from_str(r#"{"id":"QmA","addrs":["/ip4/1.2.3.4/tcp/1"]}"#)
            .unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.addresses, vec!["/ip4/1.2.3.4/tcp/1".to_string()]);
    }

    #[test]
    fn test_peer_null_addrs_is_empty() {
        let peer: Peer = serde_json::from_str(r#"{"ID":"QmA","Addrs":null}"#).unwrap();
        assert!(peer.addresses.is_empty());

        let peer: Peer = serde_json::from_str(r#"{"id":"QmB"}"#).unwrap();
        assert!(peer.addresses.is_empty());
    }

    #[test]
    fn test_file_record_ignores_data() {
        let file: FileRecord =
            serde_json::from_str(r#"{"Name":"a.txt","From":"QmA","Size":12,"Data":"aGVsbG8="}"#)
                .unwrap();
        assert_eq!(file.name, "a.txt");
        assert_eq!(file.size, 12);
    }

    #[test]
    fn test_short_peer_id() {
        assert_eq!(
            short_peer_id("12D3KooWabcdefghijklmnop"),
            "12D3Ko...mnop"
        );
        assert_eq!(short_peer_id("short"), "short");
    }

    #[test]
    fn test_is_local_origin() {
        assert!(is_local_origin("X", Some("X")));
        assert!(!is_local_origin("X", Some("Y")));
        assert!(is_local_origin("QmSelf", Some("/ip4/127.0.0.1/tcp/4001/p2p/QmSelf")));
        assert!(!is_local_origin("Self", Some("/ip4/127.0.0.1/tcp/4001/p2p/QmSelf")));
        assert!(!is_local_origin("X", None));
        assert!(!is_local_origin("", Some("")));
    }
}
