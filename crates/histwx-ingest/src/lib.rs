//! Weather API ingestion
//!
//! Credential issuance, the typed API payload, the retrying fetch client and
//! the location source. Nothing here touches storage; fetched records are
//! handed to the merge layer by the caller.

pub mod client;
pub mod credential;
pub mod locations;
pub mod payload;
pub mod retry;

pub use client::*;
pub use credential::*;
pub use locations::*;
pub use payload::*;
pub use retry::*;

use std::path::PathBuf;
use thiserror::Error;

/// Why a single request for one location failed
///
/// Kept as the last reason on a failed fetch, so it must be cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("API error code {code}: {message}")]
    Api { code: String, message: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("credential expired")]
    CredentialExpired,
}

/// HTTP status and API code the service uses for a refused token
const UNAUTHORIZED: u16 = 401;

impl FetchError {
    /// The API refused the credential itself
    ///
    /// Every other location would be refused the same way, so this ends the
    /// run instead of failing one location.
    pub fn is_auth_rejected(&self) -> bool {
        match self {
            FetchError::Status { status } => *status == UNAUTHORIZED,
            FetchError::Api { code, .. } => code.parse::<u16>() == Ok(UNAUTHORIZED),
            _ => false,
        }
    }

    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::CredentialExpired) && !self.is_auth_rejected()
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot read location source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed location source {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} line {line}: {reason}")]
    InvalidRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FetchError::Transport("reset".into()).is_retryable());
        assert!(FetchError::Status { status: 503 }.is_retryable());
        assert!(FetchError::Api {
            code: "429".into(),
            message: "rate limit exceeded".into()
        }
        .is_retryable());
        assert!(!FetchError::CredentialExpired.is_retryable());
    }

    #[test]
    fn test_unauthorized_is_rejection_not_retry() {
        let status = FetchError::Status { status: 401 };
        let code = FetchError::Api {
            code: "401".into(),
            message: "authentication failed".into(),
        };
        for err in [&status, &code] {
            assert!(err.is_auth_rejected());
            assert!(!err.is_retryable());
        }
        assert!(!FetchError::Status { status: 403 }.is_auth_rejected());
        assert!(!FetchError::CredentialExpired.is_auth_rejected());
    }
}
