//! Error types for the dbguard operator
//!
//! Errors carry the retry classification the reconciler acts on: validation
//! and configuration errors are permanent (a retry with the same input can
//! never succeed), CronJob create failures are permanent by policy, CronJob
//! update failures are transient (delete/recreate races self-resolve).

use thiserror::Error;

/// Main error type for dbguard operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a DatabaseBackup spec
    #[error("validation error for {field}: {message}")]
    Validation {
        /// The invalid field path (e.g., "database.type")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// CronJob lifecycle error, classified by the operation that failed
    #[error("cronjob {operation} failed for {cronjob}: {message}")]
    CronJob {
        /// The operation that failed ("create", "update")
        operation: String,
        /// Name of the CronJob being managed
        cronjob: String,
        /// Description of what failed
        message: String,
        /// Whether this error is retryable
        retryable: bool,
    },

    /// Invalid operator configuration, fatal at process start
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// The DatabaseBackup resource has no namespace
    #[error("missing namespace on DatabaseBackup")]
    MissingNamespace,
}

impl Error {
    /// Create a validation error for a specific spec field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a permanent CronJob creation error
    ///
    /// Create failures are non-retryable by policy: a conflicting or
    /// malformed request will not succeed by blind repetition.
    pub fn create_failed(cronjob: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CronJob {
            operation: "create".to_string(),
            cronjob: cronjob.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a transient CronJob update error
    ///
    /// Update failures are retried after a fixed delay: the delete may not
    /// yet be visible cluster-side when the recreate is attempted.
    pub fn update_failed(cronjob: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CronJob {
            operation: "update".to_string(),
            cronjob: cronjob.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and configuration errors require a spec/config fix and are
    /// never retried. Kubernetes errors depend on the status code: 4xx
    /// responses indicate a request that will not succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Validation { .. } => false,
            Error::CronJob { retryable, .. } => *retryable,
            Error::Config { .. } => false,
            Error::MissingNamespace => false,
        }
    }

    /// Get the spec field if this error is associated with one
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
