//! Custom Resource Definitions for dbguard
//!
//! This module contains the DatabaseBackup CRD and the closed engine/storage
//! variant types the rest of the operator dispatches on.

mod database_backup;
mod engine;

pub use database_backup::{
    BackupPhase, DatabaseBackup, DatabaseBackupSpec, DatabaseBackupStatus, DatabaseSpec,
    RetentionSpec, StorageSpec,
};
pub use engine::{DatabaseEngine, StorageBackend};
