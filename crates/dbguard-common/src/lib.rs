//! Common types for dbguard: the DatabaseBackup CRD, errors, and Events

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator name, used for the `managed-by` label and Event reporting
pub const OPERATOR_NAME: &str = "dbguard";

/// Field manager for server-side apply and status patches
pub const FIELD_MANAGER: &str = "dbguard-backup-controller";

/// Suffix appended to a DatabaseBackup name to derive its CronJob name
pub const CRONJOB_SUFFIX: &str = "-backup";

/// Derive the CronJob name for a DatabaseBackup resource name
///
/// The mapping is deterministic: backup `X` always owns CronJob `X-backup`.
pub fn cronjob_name(backup_name: &str) -> String {
    format!("{}{}", backup_name, CRONJOB_SUFFIX)
}
