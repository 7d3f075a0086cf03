//! Error taxonomy
//!
//! Only storage quota exhaustion ever reaches the user; everything else is
//! logged and degraded (cache miss, stale document, synthetic response).

use thiserror::Error;

/// Durable storage failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored record is corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage quota exhausted while writing {key}")]
    QuotaExceeded { key: String },
}

impl StoreError {
    /// Classifies an I/O error raised while writing `key`.
    pub fn from_write(err: std::io::Error, key: &str) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            StoreError::QuotaExceeded {
                key: key.to_string(),
            }
        } else {
            StoreError::Io(err)
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

/// Failure talking to the documented server
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("could not decode {endpoint} payload: {message}")]
    Decode {
        endpoint: &'static str,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_full_is_quota() {
        let err = std::io::Error::from(std::io::ErrorKind::StorageFull);
        assert!(StoreError::from_write(err, "TAB::GET:/a").is_quota());

        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(!StoreError::from_write(err, "TAB::GET:/a").is_quota());
    }
}
