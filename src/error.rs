//! Error types for the NFS subdirectory provisioner
//!
//! Structured errors for provisioning, deletion, policy resolution and
//! configuration, plus the retry classification the control loop consumes.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Unsupported request: {0}")]
    UnsupportedRequest(String),

    // =========================================================================
    // Policy Errors
    // =========================================================================
    #[error("Invalid value {value:?} for {key} on {layer}: expected a boolean")]
    InvalidPolicyValue {
        key: String,
        layer: String,
        value: String,
    },

    // =========================================================================
    // Path Errors
    // =========================================================================
    #[error("Invalid path {path} for server root {root}")]
    InvalidPath { path: String, root: String },

    // =========================================================================
    // Filesystem Errors
    // =========================================================================
    #[error("Unable to {operation} {}: {source}", path.display())]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Action the control loop should take for a failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Don't requeue, wait for the object or configuration to change
    NoRequeue,
}

impl Error {
    /// Wrap an io error with the operation and path it failed on
    pub fn filesystem(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Error::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Filesystem { .. } | Error::Kube(_) | Error::Internal(_) => {
                ErrorAction::RequeueWithBackoff
            }

            // Bad requests, bad policy and tampered records - don't retry automatically
            Error::Configuration(_)
            | Error::UnsupportedRequest(_)
            | Error::InvalidPolicyValue { .. }
            | Error::InvalidPath { .. } => ErrorAction::NoRequeue,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;
