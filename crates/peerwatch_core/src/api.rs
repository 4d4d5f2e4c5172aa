use crate::{
    BackendLocation, FileRecord, Message, Peer, PeerwatchError, Result, UploadCandidate,
};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::{multipart, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

/// Size of each piece of the streamed upload body.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Bytes of the multipart file body handed to the connection so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.sent as f64 / self.total as f64 * 100.0
    }
}

#[derive(Deserialize)]
struct LocalAddrResponse {
    #[serde(default)]
    addr: String,
}

/// The node's HTTP status API.
#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn peers(&self, base: &BackendLocation) -> Result<Vec<Peer>>;
    async fn messages(&self, base: &BackendLocation) -> Result<Vec<Message>>;
    async fn local_addr(&self, base: &BackendLocation) -> Result<String>;
    async fn files(&self, base: &BackendLocation) -> Result<Vec<FileRecord>>;
    async fn connect(&self, base: &BackendLocation, addr: &str) -> Result<()>;
    async fn broadcast(&self, base: &BackendLocation, message: &str) -> Result<()>;
    /// Upload `candidate` for delivery to `peer_id`, reporting body progress
    /// on `progress` as it streams.
    async fn send_file(
        &self,
        base: &BackendLocation,
        peer_id: &str,
        candidate: UploadCandidate,
        progress: mpsc::UnboundedSender<UploadProgress>,
    ) -> Result<()>;
    async fn download(&self, base: &BackendLocation, name: &str) -> Result<Vec<u8>>;
}

pub struct HttpNodeApi {
    client: reqwest::Client,
    read_timeout: Duration,
}

impl HttpNodeApi {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            read_timeout,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, base: &BackendLocation, path: &str) -> Result<T> {
        let url = base.endpoint(path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .timeout(self.read_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    // Go encodes a nil slice as `null`.
    async fn get_list<T: DeserializeOwned>(
        &self,
        base: &BackendLocation,
        path: &str,
    ) -> Result<Vec<T>> {
        let list: Option<Vec<T>> = self.get_json(base, path).await?;
        Ok(list.unwrap_or_default())
    }

    async fn post_json(
        &self,
        base: &BackendLocation,
        path: &str,
        body: serde_json::Value,
    ) -> Result<()> {
        let url = base.endpoint(path);
        debug!("POST {}", url);
        let response = self.client.post(&url).json(&body).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

impl Default for HttpNodeApi {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PeerwatchError::Http {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

#[async_trait]
impl NodeApi for HttpNodeApi {
    async fn peers(&self, base: &BackendLocation) -> Result<Vec<Peer>> {
        self.get_list(base, "/api/peers").await
    }

    async fn messages(&self, base: &BackendLocation) -> Result<Vec<Message>> {
        self.get_list(base, "/api/messages").await
    }

    async fn local_addr(&self, base: &BackendLocation) -> Result<String> {
        let response: LocalAddrResponse = self.get_json(base, "/api/local").await?;
        Ok(response.addr)
    }

    async fn files(&self, base: &BackendLocation) -> Result<Vec<FileRecord>> {
        self.get_list(base, "/api/files").await
    }

    async fn connect(&self, base: &BackendLocation, addr: &str) -> Result<()> {
        self.post_json(base, "/api/connect", json!({ "addr": addr }))
            .await
    }

    async fn broadcast(&self, base: &BackendLocation, message: &str) -> Result<()> {
        self.post_json(base, "/api/broadcast", json!({ "message": message }))
            .await
    }

    async fn send_file(
        &self,
        base: &BackendLocation,
        peer_id: &str,
        candidate: UploadCandidate,
        progress: mpsc::UnboundedSender<UploadProgress>,
    ) -> Result<()> {
        let total = candidate.size();
        let chunks: Vec<Vec<u8>> = candidate
            .data
            .chunks(UPLOAD_CHUNK)
            .map(<[u8]>::to_vec)
            .collect();

        let mut sent = 0u64;
        let body = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            let _ = progress.send(UploadProgress { sent, total });
            Ok::<_, std::io::Error>(chunk)
        });

        let part = multipart::Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(candidate.name.clone())
            .mime_str("application/octet-stream")?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("peerId", peer_id.to_string());

        let url = base.endpoint("/api/sendfile");
        debug!("POST {} ({} bytes for {})", url, total, peer_id);
        let response = self.client.post(&url).multipart(form).send().await?;

        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PeerwatchError::Http {
                status,
                body: body.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn download(&self, base: &BackendLocation, name: &str) -> Result<Vec<u8>> {
        let url = base.endpoint("/api/download");
        debug!("GET {}?name={}", url, name);
        let response = self
            .client
            .get(&url)
            .query(&[("name", name)])
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Canned outcome for a mocked write call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Ok,
    Http(u16, String),
    NetworkDown,
}

impl MockReply {
    fn into_result(self) -> Result<()> {
        match self {
            MockReply::Ok => Ok(()),
            MockReply::Http(status, body) => Err(PeerwatchError::Http { status, body }),
            MockReply::NetworkDown => {
                Err(PeerwatchError::Network("connection refused".to_string()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockNodeState {
    pub peers: Vec<Peer>,
    pub messages: Vec<Message>,
    pub local_addr: String,
    pub files: Vec<FileRecord>,
    pub downloads: HashMap<String, Vec<u8>>,
    pub reads_fail: bool,
    pub write_reply: MockReply,
    pub upload_reply: MockReply,
    /// When set, `send_file` waits on this after each of the first three
    /// progress events.
    pub upload_gate: Option<Arc<Notify>>,
    /// Every call made, e.g. `GET /api/peers`.
    pub calls: Vec<String>,
}

impl Default for MockNodeState {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            messages: Vec::new(),
            local_addr: String::new(),
            files: Vec::new(),
            downloads: HashMap::new(),
            reads_fail: false,
            write_reply: MockReply::Ok,
            upload_reply: MockReply::Ok,
            upload_gate: None,
            calls: Vec::new(),
        }
    }
}

/// In-memory node for tests and offline use.
#[derive(Default)]
pub struct MockNodeApi {
    state: Mutex<MockNodeState>,
}

impl MockNodeApi {
    pub fn new(state: MockNodeState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn update<F: FnOnce(&mut MockNodeState)>(&self, f: F) {
        f(&mut self.lock());
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockNodeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read<T>(&self, call: &str, pick: impl FnOnce(&MockNodeState) -> T) -> Result<T> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        if state.reads_fail {
            return Err(PeerwatchError::Network("connection refused".to_string()));
        }
        Ok(pick(&state))
    }

    fn write(&self, call: String) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(call);
        state.write_reply.clone().into_result()
    }
}

#[async_trait]
impl NodeApi for MockNodeApi {
    async fn peers(&self, _base: &BackendLocation) -> Result<Vec<Peer>> {
        self.read("GET /api/peers", |s| s.peers.clone())
    }

    async fn messages(&self, _base: &BackendLocation) -> Result<Vec<Message>> {
        self.read("GET /api/messages", |s| s.messages.clone())
    }

    async fn local_addr(&self, _base: &BackendLocation) -> Result<String> {
        self.read("GET /api/local", |s| s.local_addr.clone())
    }

    async fn files(&self, _base: &BackendLocation) -> Result<Vec<FileRecord>> {
        self.read("GET /api/files", |s| s.files.clone())
    }

    async fn connect(&self, _base: &BackendLocation, addr: &str) -> Result<()> {
        self.write(format!("POST /api/connect {}", addr))
    }

    async fn broadcast(&self, _base: &BackendLocation, message: &str) -> Result<()> {
        self.write(format!("POST /api/broadcast {}", message))
    }

    async fn send_file(
        &self,
        _base: &BackendLocation,
        peer_id: &str,
        candidate: UploadCandidate,
        progress: mpsc::UnboundedSender<UploadProgress>,
    ) -> Result<()> {
        let (reply, gate) = {
            let mut state = self.lock();
            state
                .calls
                .push(format!("POST /api/sendfile {} {}", peer_id, candidate.name));
            (state.upload_reply.clone(), state.upload_gate.clone())
        };

        if matches!(reply, MockReply::NetworkDown) {
            return reply.into_result();
        }

        let total = candidate.size();
        for quarter in 1..=4u64 {
            let _ = progress.send(UploadProgress {
                sent: total * quarter / 4,
                total,
            });
            match &gate {
                Some(gate) if quarter < 4 => gate.notified().await,
                _ => tokio::task::yield_now().await,
            }
        }
        reply.into_result()
    }

    async fn download(&self, _base: &BackendLocation, name: &str) -> Result<Vec<u8>> {
        let mut state = self.lock();
        state.calls.push(format!("GET /api/download {}", name));
        state
            .downloads
            .get(name)
            .cloned()
            .ok_or_else(|| PeerwatchError::Http {
                status: 404,
                body: "File not found".to_string(),
            })
    }
}
