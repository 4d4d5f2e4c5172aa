use std::fmt;
use std::path::Path;

/// Largest file the node accepts for upload (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// A file selected for upload. The bytes are read up front so the size
/// check and the multipart body agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    pub name: String,
    pub data: Vec<u8>,
}

impl UploadCandidate {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub async fn from_path(path: &Path) -> crate::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                crate::PeerwatchError::Validation(format!("Not a file: {}", path.display()))
            })?;
        let data = tokio::fs::read(path).await?;
        Ok(Self { name, data })
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub size: u64,
    pub limit: u64,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MIB: u64 = 1024 * 1024;
        match self.limit {
            limit if limit >= MIB && limit % MIB == 0 => {
                write!(f, "File too large. Maximum size is {}MB", limit / MIB)
            }
            limit if limit >= 1024 && limit % 1024 == 0 => {
                write!(f, "File too large. Maximum size is {}KB", limit / 1024)
            }
            limit => write!(f, "File too large. Maximum size is {} bytes", limit),
        }
    }
}

impl std::error::Error for Rejection {}

/// Size policy checked before any upload starts.
#[derive(Debug, Clone, Copy)]
pub struct Guard {
    max_bytes: u64,
}

impl Guard {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn validate(&self, candidate: &UploadCandidate) -> Result<(), Rejection> {
        self.validate_size(candidate.size())
    }

    pub fn validate_size(&self, size: u64) -> Result<(), Rejection> {
        if size > self.max_bytes {
            return Err(Rejection {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::new(MAX_UPLOAD_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_inclusive() {
        let guard = Guard::default();
        assert!(guard.validate_size(MAX_UPLOAD_BYTES).is_ok());

        let err = guard.validate_size(MAX_UPLOAD_BYTES + 1).unwrap_err();
        assert_eq!(err.size, MAX_UPLOAD_BYTES + 1);
        assert_eq!(err.to_string(), "File too large. Maximum size is 10MB");
    }

    #[test]
    fn test_reason_states_small_limits() {
        let reason = |limit| Guard::new(limit).validate_size(limit + 1).unwrap_err().to_string();
        assert_eq!(reason(512 * 1024), "File too large. Maximum size is 512KB");
        assert_eq!(reason(4), "File too large. Maximum size is 4 bytes");
        assert_eq!(reason(1024 * 1024 + 1), "File too large. Maximum size is 1048577 bytes");
        assert_eq!(reason(2 * 1024 * 1024), "File too large. Maximum size is 2MB");
    }

    #[test]
    fn test_validate_candidate() {
        let guard = Guard::new(4);
        assert!(guard.validate(&UploadCandidate::new("a", vec![0; 4])).is_ok());
        assert!(guard.validate(&UploadCandidate::new("a", vec![0; 5])).is_err());
        assert!(guard.validate(&UploadCandidate::new("empty", Vec::new())).is_ok());
    }

    #[tokio::test]
    async fn test_candidate_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let candidate = UploadCandidate::from_path(&path).await.unwrap();
        assert_eq!(candidate.name, "notes.txt");
        assert_eq!(candidate.size(), 5);
    }
}
