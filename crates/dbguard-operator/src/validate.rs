//! DatabaseBackup spec validation
//!
//! Pure checks, run before any manifest is built. Every failure is permanent:
//! retrying an invalid spec can never succeed. Fields that end up inside the
//! backup container's shell command are additionally restricted to a safe
//! character set, so user-supplied values cannot inject shell syntax.

use dbguard_common::crd::{DatabaseBackupSpec, DatabaseEngine, StorageBackend};
use dbguard_common::{Error, Result};

/// Characters allowed in fields interpolated into the backup command.
///
/// Hostnames, database names, and bucket paths fit within this set; shell
/// metacharacters do not.
fn is_safe_shell_value(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | ':' | '-'))
}

/// Validate a DatabaseBackup spec
///
/// Checks, in order: engine type supported; storage type supported; database
/// host present; database name present; storage bucket present; command-
/// interpolated fields restricted to safe characters. Returns the first
/// failing check as a permanent [`Error::Validation`] naming the offending
/// field.
pub fn validate(spec: &DatabaseBackupSpec) -> Result<(DatabaseEngine, StorageBackend)> {
    let engine: DatabaseEngine = spec
        .database
        .r#type
        .parse()
        .map_err(|msg: String| Error::validation("database.type", msg))?;

    let backend: StorageBackend = spec
        .storage
        .r#type
        .parse()
        .map_err(|msg: String| Error::validation("storage.type", msg))?;

    if spec.database.host.is_empty() {
        return Err(Error::validation("database.host", "database host is required"));
    }
    if spec.database.name.is_empty() {
        return Err(Error::validation("database.name", "database name is required"));
    }
    if spec.storage.bucket.is_empty() {
        return Err(Error::validation("storage.bucket", "storage bucket is required"));
    }

    for (field, value) in [
        ("database.host", &spec.database.host),
        ("database.name", &spec.database.name),
        ("storage.bucket", &spec.storage.bucket),
    ] {
        if !is_safe_shell_value(value) {
            return Err(Error::validation(
                field,
                format!("value '{}' contains characters not allowed in a backup command", value),
            ));
        }
    }

    Ok((engine, backend))
}
