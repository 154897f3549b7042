//! DatabaseBackup Custom Resource Definition
//!
//! The DatabaseBackup CRD declares a recurring database backup: which
//! database to dump, on what schedule, into which storage bucket, and how
//! many snapshots to keep. The operator translates it to a `batch/v1`
//! CronJob owned by the resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Database connection configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Database engine type (postgres, mysql, mongodb)
    pub r#type: String,

    /// Database host to dump from
    pub host: String,

    /// Name of the database to back up
    pub name: String,

    /// Secret holding database credentials (defaults to `{name}-db-creds`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret_ref: Option<String>,
}

/// Backup storage destination configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Storage backend type (s3, gcs, azure)
    pub r#type: String,

    /// Bucket receiving backup artifacts
    pub bucket: String,

    /// Storage region (defaults to a per-backend configured value)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Secret holding storage credentials (defaults to `{name}-storage-creds`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret_ref: Option<String>,
}

/// Retention policy for backup artifacts
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSpec {
    /// Number of most recent artifacts to keep; older ones are deleted on
    /// each upload (defaults to the configured value)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_last: Option<u32>,
}

/// Phase of a DatabaseBackup
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum BackupPhase {
    /// CronJob exists, no successful schedule observed yet
    #[default]
    Pending,
    /// CronJob has a recorded last-schedule time
    Active,
    /// The periodic status read failed (recoverable on the next tick)
    Error,
}

impl std::fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Active => write!(f, "Active"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Status of a DatabaseBackup, derived from the live CronJob
///
/// `lastBackup` and `error` serialize as explicit `null` when absent: the
/// status is written as a merge patch, which leaves omitted keys untouched,
/// and a recovery pass must clear the stale values.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseBackupStatus {
    /// Current phase
    #[serde(default)]
    pub phase: BackupPhase,

    /// Timestamp of the last scheduled backup (RFC 3339)
    #[serde(default)]
    pub last_backup: Option<String>,

    /// Number of currently running backup job instances
    #[serde(default)]
    pub active_jobs: u32,

    /// Failure message, present only in phase Error
    #[serde(default)]
    pub error: Option<String>,

    /// Generation last reconciled into a CronJob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Specification for a DatabaseBackup
///
/// Declares desired state for a recurring database backup. The operator
/// derives a CronJob named `{name}-backup` in the same namespace.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "backup.example.com",
    version = "v1",
    kind = "DatabaseBackup",
    plural = "databasebackups",
    shortname = "dbb",
    namespaced,
    status = "DatabaseBackupStatus",
    printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"LastBackup","type":"string","jsonPath":".status.lastBackup"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseBackupSpec {
    /// Cron schedule for backups (defaults to the configured schedule)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Database to back up
    pub database: DatabaseSpec,

    /// Storage destination for backup artifacts
    pub storage: StorageSpec,

    /// Retention policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionSpec>,
}
