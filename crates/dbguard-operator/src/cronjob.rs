//! CronJob manifest builder
//!
//! Deterministic, side-effect-free composition of the `batch/v1` CronJob
//! derived from a validated DatabaseBackup spec. Calling this twice with
//! identical inputs yields byte-identical output; the reconciler relies on
//! that to recreate the job idempotently.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec,
    ResourceRequirements, SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use dbguard_common::crd::{DatabaseEngine, DatabaseSpec, StorageBackend, StorageSpec};
use dbguard_common::{cronjob_name, OPERATOR_NAME};

use crate::commands;
use crate::config::OperatorConfig;

/// Bounded retries per job run before the run is marked failed
const BACKOFF_LIMIT: i32 = 2;

/// Name of the scratch volume mounted at the backup working directory
const SCRATCH_VOLUME: &str = "backup-storage";

/// Build the CronJob for a DatabaseBackup
///
/// `engine` and `backend` come from validation; `schedule` and `keep_last`
/// are the effective values after defaulting. The returned manifest carries
/// no owner reference; the reconciler attaches one before creation.
#[allow(clippy::too_many_arguments)]
pub fn build_cronjob(
    name: &str,
    namespace: &str,
    schedule: &str,
    engine: DatabaseEngine,
    backend: StorageBackend,
    database: &DatabaseSpec,
    storage: &StorageSpec,
    keep_last: u32,
    config: &OperatorConfig,
) -> CronJob {
    let db_creds = database
        .credentials_secret_ref
        .clone()
        .unwrap_or_else(|| format!("{name}-db-creds"));
    let storage_creds = storage
        .credentials_secret_ref
        .clone()
        .unwrap_or_else(|| format!("{name}-storage-creds"));
    let region = storage
        .region
        .clone()
        .unwrap_or_else(|| config.default_region(backend).to_string());

    let command = commands::full_command(
        engine,
        &database.host,
        &database.name,
        &storage.bucket,
        namespace,
        name,
        keep_last,
    );

    CronJob {
        metadata: ObjectMeta {
            name: Some(cronjob_name(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(name)),
            ..Default::default()
        },
        spec: Some(CronJobSpec {
            schedule: schedule.to_string(),
            concurrency_policy: Some("Forbid".to_string()),
            successful_jobs_history_limit: Some(config.successful_jobs_history_limit),
            failed_jobs_history_limit: Some(config.failed_jobs_history_limit),
            job_template: JobTemplateSpec {
                metadata: None,
                spec: Some(JobSpec {
                    backoff_limit: Some(BACKOFF_LIMIT),
                    active_deadline_seconds: Some(config.backup_timeout_secs),
                    template: PodTemplateSpec {
                        metadata: Some(ObjectMeta {
                            labels: Some(pod_labels(name)),
                            ..Default::default()
                        }),
                        spec: Some(PodSpec {
                            restart_policy: Some("OnFailure".to_string()),
                            containers: vec![Container {
                                name: "backup".to_string(),
                                image: Some(config.image_for(engine).to_string()),
                                command: Some(vec![
                                    "/bin/sh".to_string(),
                                    "-c".to_string(),
                                ]),
                                args: Some(vec![command]),
                                env: Some(container_env(
                                    engine,
                                    &db_creds,
                                    &storage_creds,
                                    &region,
                                )),
                                volume_mounts: Some(vec![VolumeMount {
                                    name: SCRATCH_VOLUME.to_string(),
                                    mount_path: commands::BACKUP_DIR.to_string(),
                                    ..Default::default()
                                }]),
                                resources: Some(resources(config)),
                                ..Default::default()
                            }],
                            volumes: Some(vec![Volume {
                                name: SCRATCH_VOLUME.to_string(),
                                empty_dir: Some(EmptyDirVolumeSource {
                                    size_limit: Some(Quantity(
                                        config.temp_storage_size.clone(),
                                    )),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Attach the controller owner reference linking the CronJob to its
/// DatabaseBackup, so garbage collection cascades on deletion.
pub fn with_owner(mut cronjob: CronJob, owner: OwnerReference) -> CronJob {
    cronjob.metadata.owner_references = Some(vec![owner]);
    cronjob
}

/// Identifying labels for the CronJob object
fn labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), "database-backup".to_string()),
        ("backup-name".to_string(), name.to_string()),
        ("managed-by".to_string(), OPERATOR_NAME.to_string()),
        ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
    ])
}

/// Selection labels for the pods spawned by each run
fn pod_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), "database-backup".to_string()),
        ("backup-name".to_string(), name.to_string()),
    ])
}

/// Environment for the backup container
///
/// Credentials are referenced through secret lookups, never inlined. The
/// password reference is added only for engines that authenticate with one
/// (postgres, mysql); mongodb does not authenticate with one.
fn container_env(
    engine: DatabaseEngine,
    db_creds: &str,
    storage_creds: &str,
    region: &str,
) -> Vec<EnvVar> {
    let mut env = vec![secret_env("DB_USER", db_creds, "username")];
    if engine.uses_password_env() {
        env.push(secret_env("DB_PASSWORD", db_creds, "password"));
    }
    env.push(secret_env("AWS_ACCESS_KEY_ID", storage_creds, "access-key"));
    env.push(secret_env("AWS_SECRET_ACCESS_KEY", storage_creds, "secret-key"));
    env.push(EnvVar {
        name: "AWS_DEFAULT_REGION".to_string(),
        value: Some(region.to_string()),
        value_from: None,
    });
    env
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
    }
}

fn resources(config: &OperatorConfig) -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("memory".to_string(), Quantity(config.memory_request.clone())),
            ("cpu".to_string(), Quantity(config.cpu_request.clone())),
        ])),
        limits: Some(BTreeMap::from([
            ("memory".to_string(), Quantity(config.memory_limit.clone())),
            ("cpu".to_string(), Quantity(config.cpu_limit.clone())),
        ])),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbguard_common::crd::{DatabaseSpec, StorageSpec};

    fn sample_database() -> DatabaseSpec {
        DatabaseSpec {
            r#type: "postgres".to_string(),
            host: "db.internal".to_string(),
            name: "orders".to_string(),
            credentials_secret_ref: None,
        }
    }

    fn sample_storage() -> StorageSpec {
        StorageSpec {
            r#type: "s3".to_string(),
            bucket: "backups".to_string(),
            region: None,
            credentials_secret_ref: None,
        }
    }

    fn build_sample() -> CronJob {
        build_cronjob(
            "orders-db",
            "prod",
            "0 3 * * *",
            DatabaseEngine::Postgres,
            StorageBackend::S3,
            &sample_database(),
            &sample_storage(),
            5,
            &OperatorConfig::default(),
        )
    }

    #[test]
    fn test_build_is_idempotent() {
        let a = serde_json::to_vec(&build_sample()).unwrap();
        let b = serde_json::to_vec(&build_sample()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_naming_and_namespace() {
        let cj = build_sample();
        assert_eq!(cj.metadata.name.as_deref(), Some("orders-db-backup"));
        assert_eq!(cj.metadata.namespace.as_deref(), Some("prod"));
    }

    #[test]
    fn test_operational_policy() {
        let cj = build_sample();
        let spec = cj.spec.unwrap();
        assert_eq!(spec.schedule, "0 3 * * *");
        assert_eq!(spec.concurrency_policy.as_deref(), Some("Forbid"));
        assert_eq!(spec.successful_jobs_history_limit, Some(3));
        assert_eq!(spec.failed_jobs_history_limit, Some(1));

        let job = spec.job_template.spec.unwrap();
        assert_eq!(job.backoff_limit, Some(2));
        assert_eq!(job.active_deadline_seconds, Some(3600));

        let pod = job.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("OnFailure"));
    }

    #[test]
    fn test_container_image_and_command() {
        let cj = build_sample();
        let pod = cj.spec.unwrap().job_template.spec.unwrap().template.spec.unwrap();
        let container = &pod.containers[0];

        assert_eq!(container.name, "backup");
        assert_eq!(container.image.as_deref(), Some("postgres:15-alpine"));
        assert_eq!(
            container.command.as_ref().unwrap(),
            &vec!["/bin/sh".to_string(), "-c".to_string()]
        );

        let script = &container.args.as_ref().unwrap()[0];
        assert!(script.contains("pg_dump -h db.internal -U $DB_USER -d orders"));
        assert!(script.contains("s3://backups/prod/orders-db/"));
        assert!(script.contains("tail -n +6"));
    }

    #[test]
    fn test_env_includes_password_for_postgres() {
        let env = container_env(DatabaseEngine::Postgres, "c", "s", "us-east-1");
        let names: Vec<&str> = env.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "DB_USER",
                "DB_PASSWORD",
                "AWS_ACCESS_KEY_ID",
                "AWS_SECRET_ACCESS_KEY",
                "AWS_DEFAULT_REGION"
            ]
        );
    }

    #[test]
    fn test_env_omits_password_for_mongodb() {
        let env = container_env(DatabaseEngine::Mongodb, "c", "s", "us-east-1");
        assert_eq!(env.len(), 4);
        assert!(!env.iter().any(|e| e.name == "DB_PASSWORD"));
    }

    #[test]
    fn test_env_references_secrets_indirectly() {
        let env = container_env(DatabaseEngine::Mysql, "db-creds", "st-creds", "eu-west-1");
        for var in &env {
            if var.name == "AWS_DEFAULT_REGION" {
                assert_eq!(var.value.as_deref(), Some("eu-west-1"));
                continue;
            }
            let secret_ref = var
                .value_from
                .as_ref()
                .and_then(|v| v.secret_key_ref.as_ref())
                .expect("credential env vars must be secret references");
            assert!(var.value.is_none());
            assert!(!secret_ref.name.is_empty());
        }
    }

    #[test]
    fn test_default_secret_names_and_region() {
        let cj = build_sample();
        let pod = cj.spec.unwrap().job_template.spec.unwrap().template.spec.unwrap();
        let env = pod.containers[0].env.as_ref().unwrap();

        let db_user = env.iter().find(|e| e.name == "DB_USER").unwrap();
        assert_eq!(
            db_user.value_from.as_ref().unwrap().secret_key_ref.as_ref().unwrap().name,
            "orders-db-db-creds"
        );
        let access = env.iter().find(|e| e.name == "AWS_ACCESS_KEY_ID").unwrap();
        assert_eq!(
            access.value_from.as_ref().unwrap().secret_key_ref.as_ref().unwrap().name,
            "orders-db-storage-creds"
        );
        let region = env.iter().find(|e| e.name == "AWS_DEFAULT_REGION").unwrap();
        assert_eq!(region.value.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_explicit_secret_and_region_override_defaults() {
        let database = DatabaseSpec {
            credentials_secret_ref: Some("my-db-secret".to_string()),
            ..sample_database()
        };
        let storage = StorageSpec {
            region: Some("eu-central-1".to_string()),
            credentials_secret_ref: Some("my-storage-secret".to_string()),
            ..sample_storage()
        };
        let cj = build_cronjob(
            "orders-db",
            "prod",
            "0 3 * * *",
            DatabaseEngine::Postgres,
            StorageBackend::S3,
            &database,
            &storage,
            5,
            &OperatorConfig::default(),
        );
        let pod = cj.spec.unwrap().job_template.spec.unwrap().template.spec.unwrap();
        let env = pod.containers[0].env.as_ref().unwrap();

        let db_user = env.iter().find(|e| e.name == "DB_USER").unwrap();
        assert_eq!(
            db_user.value_from.as_ref().unwrap().secret_key_ref.as_ref().unwrap().name,
            "my-db-secret"
        );
        let region = env.iter().find(|e| e.name == "AWS_DEFAULT_REGION").unwrap();
        assert_eq!(region.value.as_deref(), Some("eu-central-1"));
    }

    #[test]
    fn test_scratch_volume_bounded_and_mounted() {
        let cj = build_sample();
        let pod = cj.spec.unwrap().job_template.spec.unwrap().template.spec.unwrap();

        let mount = &pod.containers[0].volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.name, "backup-storage");
        assert_eq!(mount.mount_path, "/backup");

        let volume = &pod.volumes.as_ref().unwrap()[0];
        assert_eq!(volume.name, "backup-storage");
        assert_eq!(
            volume.empty_dir.as_ref().unwrap().size_limit,
            Some(Quantity("10Gi".to_string()))
        );
    }

    #[test]
    fn test_labels() {
        let cj = build_sample();
        let labels = cj.metadata.labels.unwrap();
        assert_eq!(labels.get("app").unwrap(), "database-backup");
        assert_eq!(labels.get("backup-name").unwrap(), "orders-db");
        assert_eq!(labels.get("managed-by").unwrap(), "dbguard");
        assert_eq!(labels.get("version").unwrap(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_with_owner_attaches_reference() {
        let owner = OwnerReference {
            api_version: "backup.example.com/v1".to_string(),
            kind: "DatabaseBackup".to_string(),
            name: "orders-db".to_string(),
            uid: "uid-123".to_string(),
            controller: Some(true),
            ..Default::default()
        };
        let cj = with_owner(build_sample(), owner);
        let refs = cj.metadata.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, "DatabaseBackup");
        assert_eq!(refs[0].name, "orders-db");
        assert_eq!(refs[0].controller, Some(true));
    }

    #[test]
    fn test_resource_requests_and_limits() {
        let cj = build_sample();
        let pod = cj.spec.unwrap().job_template.spec.unwrap().template.spec.unwrap();
        let resources = pod.containers[0].resources.as_ref().unwrap();

        let requests = resources.requests.as_ref().unwrap();
        assert_eq!(requests.get("memory").unwrap().0, "256Mi");
        assert_eq!(requests.get("cpu").unwrap().0, "100m");
        let limits = resources.limits.as_ref().unwrap();
        assert_eq!(limits.get("memory").unwrap().0, "512Mi");
        assert_eq!(limits.get("cpu").unwrap().0, "500m");
    }

    /// End-to-end scenario from the operator's acceptance checklist:
    /// a postgres/s3 backup of `orders` with keepLast 5.
    #[test]
    fn test_orders_db_scenario() {
        let cj = build_cronjob(
            "orders-db",
            "prod",
            "0 3 * * *",
            DatabaseEngine::Postgres,
            StorageBackend::S3,
            &sample_database(),
            &sample_storage(),
            5,
            &OperatorConfig::default(),
        );

        assert_eq!(cj.metadata.name.as_deref(), Some("orders-db-backup"));
        let spec = cj.spec.unwrap();
        assert_eq!(spec.schedule, "0 3 * * *");

        let pod = spec.job_template.spec.unwrap().template.spec.unwrap();
        let container = &pod.containers[0];
        let script = &container.args.as_ref().unwrap()[0];

        assert!(script.contains("pg_dump"));
        assert!(script.contains("-h db.internal"));
        assert!(script.contains("-d orders"));
        assert!(script.contains("gzip"));
        assert!(script.contains("s3://backups/prod/orders-db/"));
        assert!(script.contains("tail -n +6")); // keep 5

        let env = container.env.as_ref().unwrap();
        assert_eq!(env.len(), 5);
        assert!(env.iter().any(|e| e.name == "DB_PASSWORD"));
    }

    #[test]
    fn test_json_structure() {
        let cj = build_sample();
        let json = serde_json::to_value(&cj).unwrap();

        assert_eq!(json["metadata"]["name"], "orders-db-backup");
        assert_eq!(json["spec"]["concurrencyPolicy"], "Forbid");
        assert_eq!(json["spec"]["jobTemplate"]["spec"]["backoffLimit"], 2);
        assert_eq!(
            json["spec"]["jobTemplate"]["spec"]["template"]["spec"]["containers"][0]["name"],
            "backup"
        );
    }
}
