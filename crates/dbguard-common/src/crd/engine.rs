//! Closed variant types for database engines and storage backends
//!
//! The CRD carries `type` as a plain string so an unsupported value surfaces
//! as a ValidationError rather than a watch-level deserialization failure.
//! Everything past the validation boundary dispatches on these enums, so the
//! compiler enforces exhaustive handling when a new engine or backend is
//! added.

use std::fmt;
use std::str::FromStr;

/// Supported database engines
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseEngine {
    /// PostgreSQL, dumped via `pg_dump`
    Postgres,
    /// MySQL, dumped via `mysqldump`
    Mysql,
    /// MongoDB, dumped via `mongodump`
    Mongodb,
}

impl DatabaseEngine {
    /// All supported engine type strings, for validation messages
    pub const SUPPORTED: &'static [&'static str] = &["postgres", "mysql", "mongodb"];

    /// Whether this engine authenticates with a password environment
    /// variable. MongoDB does not.
    pub fn uses_password_env(self) -> bool {
        match self {
            Self::Postgres | Self::Mysql => true,
            Self::Mongodb => false,
        }
    }
}

impl FromStr for DatabaseEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "mongodb" => Ok(Self::Mongodb),
            other => Err(format!(
                "unsupported database type: {}. Supported types: {}",
                other,
                Self::SUPPORTED.join(", ")
            )),
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Mysql => write!(f, "mysql"),
            Self::Mongodb => write!(f, "mongodb"),
        }
    }
}

/// Supported storage backends for backup artifacts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// Amazon S3
    S3,
    /// Google Cloud Storage
    Gcs,
    /// Azure Blob Storage
    Azure,
}

impl StorageBackend {
    /// All supported storage type strings, for validation messages
    pub const SUPPORTED: &'static [&'static str] = &["s3", "gcs", "azure"];
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s3" => Ok(Self::S3),
            "gcs" => Ok(Self::Gcs),
            "azure" => Ok(Self::Azure),
            other => Err(format!(
                "unsupported storage type: {}. Supported types: {}",
                other,
                Self::SUPPORTED.join(", ")
            )),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 => write!(f, "s3"),
            Self::Gcs => write!(f, "gcs"),
            Self::Azure => write!(f, "azure"),
        }
    }
}
