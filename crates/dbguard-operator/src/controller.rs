//! DatabaseBackup reconciliation
//!
//! Drives the owned CronJob toward the declared spec and derives the
//! resource's status from the live CronJob on every pass:
//!
//! - CronJob absent → create it (a cluster-API failure here is permanent)
//! - spec generation changed → delete (foreground) and recreate (failures
//!   here are transient and requeued after a fixed delay)
//! - status: lastScheduleTime → Active, none → Pending, read failure →
//!   Error with the captured message (status-only, never a handler failure)
//!
//! Deletion needs no handler: the CronJob carries a controller owner
//! reference and is removed by the garbage-collection cascade.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::batch::v1::CronJob;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use dbguard_common::crd::{BackupPhase, DatabaseBackup, DatabaseBackupStatus};
use dbguard_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use dbguard_common::{cronjob_name, Error, FIELD_MANAGER};

use crate::config::OperatorConfig;
use crate::cronjob::{build_cronjob, with_owner};
use crate::validate::validate;

/// Shared context for the DatabaseBackup controller
pub struct ControllerContext {
    /// Kubernetes API client
    pub client: Client,
    /// Immutable operator configuration
    pub config: Arc<OperatorConfig>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
}

impl ControllerContext {
    /// Create a context with the production Event publisher
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        let events = Arc::new(KubeEventPublisher::new(client.clone(), FIELD_MANAGER));
        Self {
            client,
            config,
            events,
        }
    }
}

/// Outcome payload reported by a successful lifecycle pass
///
/// Published as the note of the Kubernetes Event, for audit by operators.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Human-readable summary of what happened
    pub message: String,
    /// Name of the derived CronJob
    pub cronjob: String,
    /// Effective keep-last retention after defaulting
    pub retention: u32,
}

impl ReconcileOutcome {
    /// Render the payload for an Event note
    pub fn note(&self) -> String {
        format!(
            "{} (cronjob: {}, retention: {})",
            self.message, self.cronjob, self.retention
        )
    }
}

/// Reconcile a DatabaseBackup resource
pub async fn reconcile(
    backup: Arc<DatabaseBackup>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, Error> {
    let name = backup.name_any();
    let namespace = backup.namespace().ok_or(Error::MissingNamespace)?;
    let cj_name = cronjob_name(&name);
    let generation = backup.metadata.generation;

    debug!(backup = %name, namespace = %namespace, "Reconciling DatabaseBackup");

    let object_ref = backup.object_ref(&());
    let (engine, backend) = match validate(&backup.spec) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(backup = %name, error = %e, "Spec validation failed");
            ctx.events
                .publish(
                    &object_ref,
                    EventType::Warning,
                    reasons::VALIDATION_FAILED,
                    actions::RECONCILE,
                    Some(e.to_string()),
                )
                .await;
            return Err(e);
        }
    };

    let schedule = backup
        .spec
        .schedule
        .clone()
        .unwrap_or_else(|| ctx.config.default_schedule.clone());
    let keep_last = backup
        .spec
        .retention
        .as_ref()
        .and_then(|r| r.keep_last)
        .unwrap_or(ctx.config.default_retention);

    let mut desired = build_cronjob(
        &name,
        &namespace,
        &schedule,
        engine,
        backend,
        &backup.spec.database,
        &backup.spec.storage,
        keep_last,
        &ctx.config,
    );
    if let Some(owner) = backup.controller_owner_ref(&()) {
        desired = with_owner(desired, owner);
    }

    let api: Api<CronJob> = Api::namespaced(ctx.client.clone(), &namespace);

    // Drive the CronJob toward the spec. The read result doubles as the
    // status source below, so transient failures degrade status instead of
    // failing the handler.
    let read = api.get_opt(&cj_name).await;
    let mut converged = false;
    match &read {
        Ok(None) => {
            if let Err(e) = api.create(&PostParams::default(), &desired).await {
                let err = Error::create_failed(&cj_name, e.to_string());
                ctx.events
                    .publish(
                        &object_ref,
                        EventType::Warning,
                        reasons::CRONJOB_APPLY_FAILED,
                        actions::RECONCILE,
                        Some(err.to_string()),
                    )
                    .await;
                return Err(err);
            }
            converged = true;

            info!(backup = %name, cronjob = %cj_name, schedule = %schedule, "CronJob created");
            let outcome = ReconcileOutcome {
                message: format!("Backup CronJob created with schedule: {}", schedule),
                cronjob: cj_name.clone(),
                retention: keep_last,
            };
            ctx.events
                .publish(
                    &object_ref,
                    EventType::Normal,
                    reasons::CRONJOB_CREATED,
                    actions::RECONCILE,
                    Some(outcome.note()),
                )
                .await;
        }
        Ok(Some(_)) if spec_changed(&backup, generation) => {
            // Delete-then-recreate: simpler than field-level diffing, at the
            // cost of a brief window with no CronJob. Races with the delete
            // are expected to self-resolve, so failures are transient.
            let replaced = async {
                api.delete(&cj_name, &DeleteParams::foreground())
                    .await
                    .map_err(|e| Error::update_failed(&cj_name, e.to_string()))?;
                api.create(&PostParams::default(), &desired)
                    .await
                    .map_err(|e| Error::update_failed(&cj_name, e.to_string()))?;
                Ok::<(), Error>(())
            }
            .await;
            if let Err(err) = replaced {
                ctx.events
                    .publish(
                        &object_ref,
                        EventType::Warning,
                        reasons::CRONJOB_APPLY_FAILED,
                        actions::RECONCILE,
                        Some(err.to_string()),
                    )
                    .await;
                return Err(err);
            }
            converged = true;

            info!(backup = %name, cronjob = %cj_name, "CronJob recreated after spec update");
            let outcome = ReconcileOutcome {
                message: "Backup CronJob updated".to_string(),
                cronjob: cj_name.clone(),
                retention: keep_last,
            };
            ctx.events
                .publish(
                    &object_ref,
                    EventType::Normal,
                    reasons::CRONJOB_UPDATED,
                    actions::RECONCILE,
                    Some(outcome.note()),
                )
                .await;
        }
        Ok(Some(_)) => {
            converged = true;
        }
        Err(e) => {
            warn!(backup = %name, cronjob = %cj_name, error = %e, "Could not read CronJob");
        }
    }

    // Derive status from the live CronJob. A fresh read reflects the
    // create/recreate above; its failure is folded into the status.
    let status_read = api.get_opt(&cj_name).await;
    let observed = read_for_status(&status_read, &cj_name);
    let observed_generation = if converged {
        generation
    } else {
        backup.status.as_ref().and_then(|s| s.observed_generation)
    };
    let status = derive_status(observed, observed_generation);
    patch_status(&ctx.client, &name, &namespace, &status).await?;

    Ok(Action::requeue(Duration::from_secs(
        ctx.config.reconcile_interval_secs,
    )))
}

/// Error policy for DatabaseBackup reconciliation
///
/// Transient failures (update races) are retried after a fixed delay;
/// permanent failures (validation, create conflicts) wait for a spec change.
pub fn error_policy(
    backup: Arc<DatabaseBackup>,
    error: &Error,
    ctx: Arc<ControllerContext>,
) -> Action {
    error!(
        backup = %backup.name_any(),
        error = %error,
        retryable = error.is_retryable(),
        "backup reconciliation failed"
    );
    if error.is_retryable() {
        Action::requeue(Duration::from_secs(ctx.config.retry_delay_secs))
    } else {
        Action::await_change()
    }
}

/// Whether the spec generation differs from the last one reconciled into a
/// CronJob. A resource with no recorded observation counts as changed.
fn spec_changed(backup: &DatabaseBackup, generation: Option<i64>) -> bool {
    let observed = backup.status.as_ref().and_then(|s| s.observed_generation);
    observed != generation || observed.is_none()
}

/// Fold a CronJob read into the form `derive_status` consumes
///
/// "Not found" is expected transiently during the update window and is
/// reported like any other read failure, as a status-only outcome.
fn read_for_status<'a>(
    read: &'a kube::Result<Option<CronJob>>,
    cj_name: &str,
) -> Result<&'a CronJob, String> {
    match read {
        Ok(Some(cj)) => Ok(cj),
        Ok(None) => Err(format!("CronJob {} not found", cj_name)),
        Err(e) => Err(format!("could not read CronJob {}: {}", cj_name, e)),
    }
}

/// Derive the resource status from the live CronJob
///
/// A recorded last-schedule time means the backup is Active; a CronJob that
/// has not fired yet is Pending; a failed read degrades to Error with the
/// captured message, recoverable on the next tick.
pub fn derive_status(
    read: Result<&CronJob, String>,
    observed_generation: Option<i64>,
) -> DatabaseBackupStatus {
    match read {
        Ok(cronjob) => {
            let cj_status = cronjob.status.as_ref();
            let last_schedule = cj_status.and_then(|s| s.last_schedule_time.as_ref());
            let active_jobs = cj_status
                .and_then(|s| s.active.as_ref())
                .map(|a| a.len() as u32)
                .unwrap_or(0);

            match last_schedule {
                Some(time) => DatabaseBackupStatus {
                    phase: BackupPhase::Active,
                    last_backup: Some(time.0.to_rfc3339()),
                    active_jobs,
                    error: None,
                    observed_generation,
                },
                None => DatabaseBackupStatus {
                    phase: BackupPhase::Pending,
                    last_backup: None,
                    active_jobs,
                    error: None,
                    observed_generation,
                },
            }
        }
        Err(message) => DatabaseBackupStatus {
            phase: BackupPhase::Error,
            last_backup: None,
            active_jobs: 0,
            error: Some(message),
            observed_generation,
        },
    }
}

/// Patch the DatabaseBackup status subresource
async fn patch_status(
    client: &Client,
    name: &str,
    namespace: &str,
    status: &DatabaseBackupStatus,
) -> Result<(), Error> {
    let api: Api<DatabaseBackup> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}
