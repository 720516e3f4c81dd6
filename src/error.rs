//! Error taxonomy shared by the fetcher, walker and synchronizer.
//!
//! Only [`ApiError`] on the root group and [`ConfigError`] abort a run. Every
//! other failure is recorded against the repository or group it belongs to
//! and the run carries on with the siblings.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The listing or lookup API answered with an error payload, or could not be reached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("API error: {message}")]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// The external version-control client failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("clone error: {0}")]
    Clone(String),

    #[error("pull error: {0}")]
    Pull(String),

    #[error("git {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("failed to run git: {0}")]
    Spawn(String),
}

/// Why a single repository could not be synchronized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Target path exists but holds no repository; left untouched.
    #[error("path exists, not a repository: {}", .path.display())]
    LocalConflict { path: PathBuf },

    #[error("failed to prepare {}: {message}", .path.display())]
    Filesystem { path: PathBuf, message: String },

    /// Name would not stay a single directory below the group directory.
    #[error("unsafe directory name '{0}'")]
    UnsafeName(String),
}

/// A group that could not be processed. Recorded; siblings continue.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("unsafe group slug '{0}'")]
    UnsafeSlug(String),

    #[error("failed to create {}: {message}", .path.display())]
    CreateDir { path: PathBuf, message: String },
}

/// Required settings are missing or malformed. Raised before any traversal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no API token configured (set GITLAB_TOKEN or gitlab.token)")]
    MissingToken,

    #[error("no root group configured (pass --group or set gitlab.root_group)")]
    MissingRootGroup,

    #[error("invalid base URL '{0}': expected an http or https URL")]
    InvalidBaseUrl(String),

    #[error("per_page must be between 1 and 100, got {0}")]
    InvalidPageSize(u32),
}
