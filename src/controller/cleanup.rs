//! Completion watcher and dependent-resource cleanup

use std::fmt::Display;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use kube::api::{Api, ApiResource, DynamicObject};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cluster::{ClusterClient, CreatedResource, DeleteOutcome, ResourceKind};
use crate::labels::LabelConfig;
use crate::Error;

/// Consecutive watch errors tolerated before the loop gives up
pub const DEFAULT_WATCH_ERROR_BUDGET: u32 = 5;

/// Kinds deleted when a workload finishes, in deletion order
const DEPENDENT_KINDS: [ResourceKind; 2] = [ResourceKind::Service, ResourceKind::Ingress];

/// Reconciler settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanupConfig {
    /// Also clean up after Jobs that failed terminally
    pub cleanup_on_failure: bool,
    /// Consecutive stream errors tolerated before [`Error::Watch`]
    pub watch_error_budget: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            cleanup_on_failure: false,
            watch_error_budget: DEFAULT_WATCH_ERROR_BUDGET,
        }
    }
}

/// Lifecycle phase of an observed workload, as far as cleanup cares
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadPhase {
    /// Not finished yet
    Active,
    /// At least one pod succeeded
    Succeeded,
    /// The Job carries a `Failed=True` condition
    Failed,
}

impl WorkloadPhase {
    /// Derive the phase from a Job status
    pub fn from_status(status: Option<&JobStatus>) -> Self {
        let Some(status) = status else {
            return Self::Active;
        };
        if status.succeeded.unwrap_or(0) > 0 {
            return Self::Succeeded;
        }
        let failed_condition = status
            .conditions
            .iter()
            .flatten()
            .any(|c| c.type_ == "Failed" && c.status == "True");
        if status.failed.unwrap_or(0) > 0 && failed_condition {
            Self::Failed
        } else {
            Self::Active
        }
    }
}

/// What one cleanup pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Identifier whose dependents were cleaned up
    pub identifier: String,
    /// Resources deleted by this pass
    pub deleted: Vec<CreatedResource>,
    /// Resources that were listed but already gone at delete time
    pub already_gone: Vec<CreatedResource>,
    /// List or delete calls that failed
    pub failed: usize,
}

/// Deletes dependents of finished workloads
pub struct CleanupReconciler {
    client: Arc<dyn ClusterClient>,
    labels: LabelConfig,
    config: CleanupConfig,
}

impl CleanupReconciler {
    /// Create a reconciler
    pub fn new(client: Arc<dyn ClusterClient>, labels: LabelConfig, config: CleanupConfig) -> Self {
        Self {
            client,
            labels,
            config,
        }
    }

    /// Consume workload events until cancelled or the stream fails
    ///
    /// Events are handled one at a time in delivery order. Cleanup failures
    /// are logged and never end the loop.
    ///
    /// # Errors
    ///
    /// [`Error::WatchClosed`] if the stream ends, [`Error::Watch`] once more
    /// than `watch_error_budget` consecutive stream errors were seen.
    pub async fn run<S, E>(&self, events: S, cancel: CancellationToken) -> Result<(), Error>
    where
        S: Stream<Item = Result<Event<DynamicObject>, E>>,
        E: Display,
    {
        let mut events = std::pin::pin!(events);
        let mut consecutive_errors = 0u32;

        info!(selector = %self.labels.managed_selector(), "Cleanup reconciler started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Cleanup reconciler stopped");
                    return Ok(());
                }
                event = events.next() => match event {
                    Some(Ok(event)) => {
                        consecutive_errors = 0;
                        self.handle_event(event).await;
                    }
                    Some(Err(e)) => {
                        consecutive_errors += 1;
                        if consecutive_errors > self.config.watch_error_budget {
                            error!(error = %e, consecutive_errors, "Workload watch failed");
                            return Err(Error::watch(e.to_string()));
                        }
                        warn!(error = %e, consecutive_errors, "Workload watch error");
                    }
                    None => {
                        error!("Workload watch stream closed");
                        return Err(Error::WatchClosed);
                    }
                },
            }
        }
    }

    /// Handle one watch event, returning the cleanup report if it triggered one
    ///
    /// Objects from the initial listing are handled like live updates so Jobs
    /// that finished while the process was down are cleaned up too. Deletion
    /// of the Job itself needs no action.
    pub async fn handle_event(&self, event: Event<DynamicObject>) -> Option<CleanupReport> {
        match event {
            Event::Apply(obj) | Event::InitApply(obj) => self.handle_object(&obj).await,
            Event::Delete(_) | Event::Init | Event::InitDone => None,
        }
    }

    async fn handle_object(&self, obj: &DynamicObject) -> Option<CleanupReport> {
        let name = obj.name_any();

        if let Some(types) = &obj.types {
            if types.api_version != "batch/v1" || types.kind != "Job" {
                warn!(
                    operation = "cleanup",
                    api_version = %types.api_version,
                    kind = %types.kind,
                    name = %name,
                    "Ignoring event for unexpected object type"
                );
                return None;
            }
        }

        let status = match obj.data.get("status") {
            None => None,
            Some(value) => match serde_json::from_value::<JobStatus>(value.clone()) {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!(operation = "cleanup", name = %name, error = %e, "Ignoring Job with unreadable status");
                    return None;
                }
            },
        };

        let phase = WorkloadPhase::from_status(status.as_ref());
        match phase {
            WorkloadPhase::Active => return None,
            WorkloadPhase::Failed if !self.config.cleanup_on_failure => {
                debug!(name = %name, "Job failed, leaving dependents in place");
                return None;
            }
            WorkloadPhase::Succeeded | WorkloadPhase::Failed => {}
        }

        let Some(identifier) = obj.labels().get(self.labels.identity_key()) else {
            warn!(
                operation = "cleanup",
                name = %name,
                label = %self.labels.identity_key(),
                "Finished Job has no identity label, skipping cleanup"
            );
            return None;
        };
        if identifier.is_empty() {
            warn!(operation = "cleanup", name = %name, "Finished Job has an empty identity label, skipping cleanup");
            return None;
        }

        debug!(name = %name, identifier = %identifier, phase = ?phase, "Job finished");
        Some(self.cleanup(identifier).await)
    }

    /// Delete every Service and Ingress carrying the identity label
    ///
    /// Safe to repeat: resources that are already gone are reported, not
    /// treated as failures.
    pub async fn cleanup(&self, identifier: &str) -> CleanupReport {
        let selector = self.labels.identity_selector(identifier);
        let mut report = CleanupReport {
            identifier: identifier.to_string(),
            ..Default::default()
        };

        for kind in DEPENDENT_KINDS {
            let names = match self.client.list_names(kind, &selector).await {
                Ok(names) => names,
                Err(e) => {
                    warn!(
                        operation = "cleanup",
                        identifier = %identifier,
                        kind = %kind,
                        error = %e,
                        "Failed to list dependents"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            for name in names {
                let resource = CreatedResource::new(kind, name);
                match self.client.delete(kind, &resource.name).await {
                    Ok(DeleteOutcome::Deleted) => {
                        info!(
                            operation = "cleanup",
                            identifier = %identifier,
                            resource = %resource,
                            "Deleted dependent"
                        );
                        report.deleted.push(resource);
                    }
                    Ok(DeleteOutcome::NotFound) => {
                        debug!(identifier = %identifier, resource = %resource, "Dependent already gone");
                        report.already_gone.push(resource);
                    }
                    Err(e) => {
                        warn!(
                            operation = "cleanup",
                            identifier = %identifier,
                            resource = %resource,
                            error = %e,
                            "Failed to delete dependent"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }
}

/// Watch stream of managed Jobs in `namespace`
///
/// Objects are watched untyped so anything that is not a Job can be told
/// apart and skipped by [`CleanupReconciler::handle_event`].
pub fn workload_events(
    client: Client,
    namespace: &str,
    labels: &LabelConfig,
) -> impl Stream<Item = Result<Event<DynamicObject>, watcher::Error>> + Send {
    let resource = ApiResource::erase::<Job>(&());
    let api: Api<DynamicObject> = Api::namespaced_with(client, namespace, &resource);
    let config = watcher::Config::default().labels(&labels.managed_selector());
    watcher::watcher(api, config).default_backoff()
}
