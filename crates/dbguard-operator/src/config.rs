//! Operator configuration
//!
//! An immutable configuration value constructed once at startup from the
//! environment and passed by `Arc` into every component that needs it. No
//! component reads configuration through ambient state.

use dbguard_common::crd::{DatabaseEngine, StorageBackend};
use dbguard_common::{Error, Result};

/// Environment variable naming the namespace to watch (unset = all)
pub const ENV_NAMESPACE: &str = "OPERATOR_NAMESPACE";
/// Environment variable overriding the default cron schedule
pub const ENV_DEFAULT_SCHEDULE: &str = "DEFAULT_BACKUP_SCHEDULE";
/// Environment variable overriding the default retention count
pub const ENV_DEFAULT_RETENTION: &str = "DEFAULT_RETENTION";
/// Environment variable toggling admission webhooks (unused by the core)
pub const ENV_ENABLE_WEBHOOKS: &str = "ENABLE_WEBHOOKS";
/// Environment variable toggling Prometheus metrics (unused by the core)
pub const ENV_ENABLE_METRICS: &str = "ENABLE_METRICS";

/// Immutable operator configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,

    /// Default cron schedule applied when the spec omits one
    pub default_schedule: String,

    /// Default keep-last retention applied when the spec omits one
    pub default_retention: u32,

    /// Interval between periodic status checks, in seconds
    pub reconcile_interval_secs: u64,

    /// Delay before retrying a transient reconciliation failure, in seconds
    pub retry_delay_secs: u64,

    /// Hard wall-clock deadline for a single backup run, in seconds
    pub backup_timeout_secs: i64,

    /// Completed job records retained by the CronJob
    pub successful_jobs_history_limit: i32,

    /// Failed job records retained by the CronJob
    pub failed_jobs_history_limit: i32,

    /// Memory request for the backup container
    pub memory_request: String,

    /// Memory limit for the backup container
    pub memory_limit: String,

    /// CPU request for the backup container
    pub cpu_request: String,

    /// CPU limit for the backup container
    pub cpu_limit: String,

    /// Size bound for the ephemeral scratch volume
    pub temp_storage_size: String,

    /// Enable admission webhooks (reserved; not used by the core logic)
    pub enable_webhooks: bool,

    /// Enable Prometheus metrics (reserved; not used by the core logic)
    pub enable_metrics: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            default_schedule: "0 2 * * *".to_string(),
            default_retention: 7,
            reconcile_interval_secs: 300,
            retry_delay_secs: 30,
            backup_timeout_secs: 3600,
            successful_jobs_history_limit: 3,
            failed_jobs_history_limit: 1,
            memory_request: "256Mi".to_string(),
            memory_limit: "512Mi".to_string(),
            cpu_request: "100m".to_string(),
            cpu_limit: "500m".to_string(),
            temp_storage_size: "10Gi".to_string(),
            enable_webhooks: false,
            enable_metrics: false,
        }
    }
}

impl OperatorConfig {
    /// Build configuration from the environment, falling back to defaults
    ///
    /// Unparseable numeric overrides fall back to the default value rather
    /// than failing; hard limits are enforced by [`validate`](Self::validate).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(namespace) = std::env::var(ENV_NAMESPACE) {
            if !namespace.is_empty() {
                config.namespace = Some(namespace);
            }
        }
        if let Ok(schedule) = std::env::var(ENV_DEFAULT_SCHEDULE) {
            if !schedule.is_empty() {
                config.default_schedule = schedule;
            }
        }
        if let Some(retention) = std::env::var(ENV_DEFAULT_RETENTION)
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.default_retention = retention;
        }
        config.enable_webhooks = env_flag(ENV_ENABLE_WEBHOOKS);
        config.enable_metrics = env_flag(ENV_ENABLE_METRICS);

        config
    }

    /// Validate configuration limits
    ///
    /// Called once at process start; a failure here prevents the controller
    /// from starting at all.
    pub fn validate(&self) -> Result<()> {
        if self.reconcile_interval_secs < 60 {
            return Err(Error::config(
                "reconcile interval must be at least 60 seconds",
            ));
        }
        if self.default_retention < 1 {
            return Err(Error::config("retention must be at least 1"));
        }
        if self.backup_timeout_secs < 60 {
            return Err(Error::config("backup timeout must be at least 60 seconds"));
        }
        Ok(())
    }

    /// Container image used to run backups for a database engine
    pub fn image_for(&self, engine: DatabaseEngine) -> &'static str {
        match engine {
            DatabaseEngine::Postgres => "postgres:15-alpine",
            DatabaseEngine::Mysql => "mysql:8.0",
            DatabaseEngine::Mongodb => "mongo:7.0",
        }
    }

    /// Default region applied when the spec omits one
    pub fn default_region(&self, backend: StorageBackend) -> &'static str {
        match backend {
            StorageBackend::S3 => "us-east-1",
            StorageBackend::Gcs => "us-central1",
            StorageBackend::Azure => "eastus",
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::default();
        assert_eq!(config.namespace, None);
        assert_eq!(config.default_schedule, "0 2 * * *");
        assert_eq!(config.default_retention, 7);
        assert_eq!(config.reconcile_interval_secs, 300);
        assert_eq!(config.backup_timeout_secs, 3600);
        assert_eq!(config.successful_jobs_history_limit, 3);
        assert_eq!(config.failed_jobs_history_limit, 1);
        assert!(!config.enable_webhooks);
        assert!(!config.enable_metrics);
    }

    // the only test touching these variables, safe under parallel execution
    #[test]
    fn test_env_overrides() {
        std::env::set_var(ENV_NAMESPACE, "backups");
        std::env::set_var(ENV_DEFAULT_SCHEDULE, "0 4 * * *");
        std::env::set_var(ENV_DEFAULT_RETENTION, "14");
        std::env::set_var(ENV_ENABLE_METRICS, "true");

        let config = OperatorConfig::from_env();
        assert_eq!(config.namespace.as_deref(), Some("backups"));
        assert_eq!(config.default_schedule, "0 4 * * *");
        assert_eq!(config.default_retention, 14);
        assert!(config.enable_metrics);
        assert!(!config.enable_webhooks);

        // unparseable numeric overrides fall back to the default
        std::env::set_var(ENV_DEFAULT_RETENTION, "a-lot");
        let config = OperatorConfig::from_env();
        assert_eq!(config.default_retention, 7);

        std::env::remove_var(ENV_NAMESPACE);
        std::env::remove_var(ENV_DEFAULT_SCHEDULE);
        std::env::remove_var(ENV_DEFAULT_RETENTION);
        std::env::remove_var(ENV_ENABLE_METRICS);
    }

    #[test]
    fn test_defaults_pass_validation() {
        assert!(OperatorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_interval_lower_bound() {
        let config = OperatorConfig {
            reconcile_interval_secs: 10,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("60 seconds"));
    }

    #[test]
    fn test_retention_lower_bound() {
        let config = OperatorConfig {
            default_retention: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_lower_bound() {
        let config = OperatorConfig {
            backup_timeout_secs: 30,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_image_per_engine() {
        let config = OperatorConfig::default();
        assert_eq!(config.image_for(DatabaseEngine::Postgres), "postgres:15-alpine");
        assert_eq!(config.image_for(DatabaseEngine::Mysql), "mysql:8.0");
        assert_eq!(config.image_for(DatabaseEngine::Mongodb), "mongo:7.0");
    }

    #[test]
    fn test_default_region_per_backend() {
        let config = OperatorConfig::default();
        assert_eq!(config.default_region(StorageBackend::S3), "us-east-1");
        assert_eq!(config.default_region(StorageBackend::Gcs), "us-central1");
        assert_eq!(config.default_region(StorageBackend::Azure), "eastus");
    }
}
