//! Error types for profile lookups and configuration

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure classes for a single profile lookup.
///
/// `Unauthenticated` and `TargetUnavailable` are reported identically to
/// clients; they stay separate here so logs and metrics can tell them apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// No enabled caller identity could be resolved
    #[error("caller is not authenticated")]
    Unauthenticated,

    /// Caller exhausted its quota on the named limiter
    #[error("rate limit exceeded on {limiter}: retry after {retry_after:?}")]
    RateLimitExceeded {
        limiter: String,
        retry_after: Duration,
    },

    /// Target is absent from the store or disabled
    #[error("target account unavailable")]
    TargetUnavailable,

    /// A collaborator (account store, avatar signer) could not answer
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl ProfileError {
    /// True for the outcomes a client sees as "not authorized"
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ProfileError::Unauthenticated | ProfileError::TargetUnavailable
        )
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("missing CDN setting {0} (required for presigned avatar URLs)")]
    MissingCdnSetting(&'static str),

    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),

    #[error("failed to read accounts file {}: {source}", path.display())]
    AccountsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse accounts file {}: {source}", path.display())]
    AccountsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
