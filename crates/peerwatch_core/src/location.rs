use crate::{PeerwatchError, Result};
use std::fmt;
use url::Url;

pub const DEFAULT_PORT: &str = "8080";

/// Base URL of the node's status API, e.g. `http://localhost:8080`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendLocation {
    base: String,
}

/// Keep only the text before the first space.
pub fn first_token(raw: &str) -> &str {
    let trimmed = raw.trim_start();
    trimmed.split(' ').next().unwrap_or_default().trim_end()
}

impl BackendLocation {
    /// Compose `http://<host>:<port>`. A missing or blank port falls back to
    /// the default, anything after the first space is discarded.
    pub fn from_port(host: &str, port: Option<&str>) -> Result<Self> {
        let port = port.map(first_token).filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PORT);
        let port: u16 = port
            .parse()
            .map_err(|_| PeerwatchError::Config(format!("Invalid backend port: {}", port)))?;
        Self::from_base(&format!("http://{}:{}", first_token(host), port))
    }

    /// Resolve from the client's own URL, reading its `port` query parameter.
    pub fn from_client_url(client_url: &str) -> Result<Self> {
        let url = Url::parse(first_token(client_url))
            .map_err(|e| PeerwatchError::Config(format!("Invalid client URL: {}", e)))?;
        let port = url
            .query_pairs()
            .find(|(key, _)| key == "port")
            .map(|(_, value)| value.into_owned());
        Self::from_port("localhost", port.as_deref())
    }

    /// Use a fully specified base URL as-is (after truncation).
    pub fn from_base(raw: &str) -> Result<Self> {
        let base = first_token(raw).trim_end_matches('/');
        let url = Url::parse(base)
            .map_err(|e| PeerwatchError::Config(format!("Invalid backend URL {}: {}", base, e)))?;
        if url.host_str().is_none() {
            return Err(PeerwatchError::Config(format!(
                "Backend URL has no host: {}",
                base
            )));
        }
        Ok(Self {
            base: base.to_string(),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }
}

impl fmt::Display for BackendLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        let location = BackendLocation::from_port("localhost", None).unwrap();
        assert_eq!(location.as_str(), "http://localhost:8080");

        let location = BackendLocation::from_port("localhost", Some("")).unwrap();
        assert_eq!(location.as_str(), "http://localhost:8080");
    }

    #[test]
    fn test_port_truncated_at_first_space() {
        let location = BackendLocation::from_port("localhost", Some("9000 extra tokens")).unwrap();
        assert_eq!(location.as_str(), "http://localhost:9000");
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        assert!(matches!(
            BackendLocation::from_port("localhost", Some("eighty")),
            Err(PeerwatchError::Config(_))
        ));
    }

    #[test]
    fn test_from_client_url() {
        let location = BackendLocation::from_client_url("http://localhost:3000/?port=8081").unwrap();
        assert_eq!(location.as_str(), "http://localhost:8081");

        let location = BackendLocation::from_client_url("http://localhost:3000/").unwrap();
        assert_eq!(location.as_str(), "http://localhost:8080");

        let location =
            BackendLocation::from_client_url("http://localhost:3000/?port=8082%20junk").unwrap();
        assert_eq!(location.as_str(), "http://localhost:8082");
    }

    #[test]
    fn test_from_base_truncates_and_trims_slash() {
        let location = BackendLocation::from_base("http://127.0.0.1:8080/ trailing").unwrap();
        assert_eq!(location.endpoint("/api/peers"), "http://127.0.0.1:8080/api/peers");
    }
}
