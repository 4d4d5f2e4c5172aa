use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeerwatchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for PeerwatchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PeerwatchError::Decode(e.to_string())
        } else {
            PeerwatchError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for PeerwatchError {
    fn from(e: serde_json::Error) -> Self {
        PeerwatchError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PeerwatchError>;

/// User-initiated actions that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    Broadcast,
    SendFile,
    Download,
    CopyAddress,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Connect => "connect",
            Action::Broadcast => "broadcast",
            Action::SendFile => "send file",
            Action::Download => "download",
            Action::CopyAddress => "copy address",
        };
        f.write_str(name)
    }
}

/// Error state surfaced to the user. Held in the snapshot rather than
/// propagated, so a failure never stops the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// A poll or action request could not reach the backend.
    Connectivity(String),
    /// Rejected locally before any request was sent.
    Validation(String),
    Action { action: Action, message: String },
}

impl Fault {
    pub fn message(&self) -> &str {
        match self {
            Fault::Connectivity(m) | Fault::Validation(m) => m,
            Fault::Action { message, .. } => message,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
