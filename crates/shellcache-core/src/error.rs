use thiserror::Error;

use crate::proxy::Phase;

/// Maximum length for a failure reason carried in an error message
const MAX_REASON_LENGTH: usize = 300;

/// A network fetch that never produced a response.
///
/// HTTP error statuses are not fetch errors; a 404 is still a response.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache store '{name}': {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Proxy is not active (phase: {0})")]
    NotActive(Phase),

    #[error("Cannot {operation} while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },

    #[error("Install failed fetching {url}: {reason}")]
    Install { url: String, reason: String },

    #[error(transparent)]
    Network(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProxyError {
    pub fn install(url: impl Into<String>, reason: impl AsRef<str>) -> Self {
        ProxyError::Install {
            url: url.into(),
            reason: Self::truncate(reason.as_ref()),
        }
    }

    /// Truncate a reason to avoid logging excessive data
    fn truncate(reason: &str) -> String {
        if reason.len() <= MAX_REASON_LENGTH {
            return reason.to_string();
        }
        let mut end = MAX_REASON_LENGTH;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &reason[..end], reason.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_error_keeps_short_reason() {
        let err = ProxyError::install("http://localhost/icon.png", "status 404");
        assert_eq!(
            err.to_string(),
            "Install failed fetching http://localhost/icon.png: status 404"
        );
    }

    #[test]
    fn test_install_error_truncates_long_reason() {
        let reason = "x".repeat(MAX_REASON_LENGTH + 50);
        match ProxyError::install("u", &reason) {
            ProxyError::Install { reason, .. } => {
                assert!(reason.starts_with(&"x".repeat(MAX_REASON_LENGTH)));
                assert!(reason.contains("truncated, 350 total bytes"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_not_active_message_names_phase() {
        let err = ProxyError::NotActive(Phase::Installed);
        assert_eq!(err.to_string(), "Proxy is not active (phase: installed)");
    }
}
