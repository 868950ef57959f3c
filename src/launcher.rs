//! Resource launcher
//!
//! Creates the resources for one request in a fixed order: the workload Job,
//! then the optional Service and Ingress. Each create is attempted once. When
//! a later step fails after earlier resources exist, the configured
//! [`PartialFailurePolicy`] decides whether they are deleted again, and the
//! returned [`Error::PartialLaunch`] lists them either way.

use std::sync::Arc;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use tracing::{error, info, warn};

use crate::cluster::{
    ClusterClient, CreatedResource, DeleteOutcome, ManagedResource, RenderedResource,
};
use crate::spec::RequestSpec;
use crate::template::{ManifestTemplate, TemplateRenderer};
use crate::Error;

/// What to do with resources already created when a later step fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PartialFailurePolicy {
    /// Delete the earlier resources in reverse creation order
    #[default]
    Rollback,
    /// Leave the earlier resources in place
    Retain,
}

/// Compiled templates for the kinds this process launches
#[derive(Clone, Debug)]
pub struct LaunchTemplates {
    /// Workload template, always required
    pub workload: ManifestTemplate<Job>,
    /// Optional Service template
    pub service: Option<ManifestTemplate<Service>>,
    /// Optional Ingress template
    pub ingress: Option<ManifestTemplate<Ingress>>,
}

/// Outcome of a successful launch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchReport {
    /// Identifier from the request
    pub identifier: String,
    /// Short name derived from the identifier
    pub unique_name: String,
    /// Resources created, in creation order
    pub created: Vec<CreatedResource>,
}

/// Renders and creates the resources for launch requests
///
/// Immutable after construction and shared across request handlers.
pub struct ResourceLauncher {
    client: Arc<dyn ClusterClient>,
    renderer: TemplateRenderer,
    templates: LaunchTemplates,
    policy: PartialFailurePolicy,
}

impl ResourceLauncher {
    /// Create a launcher
    pub fn new(
        client: Arc<dyn ClusterClient>,
        renderer: TemplateRenderer,
        templates: LaunchTemplates,
        policy: PartialFailurePolicy,
    ) -> Self {
        Self {
            client,
            renderer,
            templates,
            policy,
        }
    }

    /// Launch the resources for `identifier`
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty identifier before any cluster
    /// call. A failure on the first resource is returned as is; a failure
    /// after at least one resource was created is wrapped in
    /// [`Error::PartialLaunch`].
    pub async fn launch(&self, identifier: &str) -> Result<LaunchReport, Error> {
        if identifier.is_empty() {
            return Err(Error::validation("identifier cannot be empty"));
        }

        let spec = RequestSpec::derive(identifier, self.renderer.labels().identity_key());
        let mut created = Vec::new();

        let mut step = self
            .create_from(&self.templates.workload, &spec, &mut created)
            .await;
        if step.is_ok() {
            if let Some(template) = &self.templates.service {
                step = self.create_from(template, &spec, &mut created).await;
            }
        }
        if step.is_ok() {
            if let Some(template) = &self.templates.ingress {
                step = self.create_from(template, &spec, &mut created).await;
            }
        }

        match step {
            Ok(()) => {
                info!(
                    operation = "launch",
                    identifier = %spec.identifier,
                    unique_name = %spec.unique_name,
                    resources = created.len(),
                    "Launched resources"
                );
                Ok(LaunchReport {
                    identifier: spec.identifier,
                    unique_name: spec.unique_name,
                    created,
                })
            }
            Err(e) => Err(self.fail(&spec, created, e).await),
        }
    }

    /// Render one template and create the result, recording it on success
    async fn create_from<K>(
        &self,
        template: &ManifestTemplate<K>,
        spec: &RequestSpec,
        created: &mut Vec<CreatedResource>,
    ) -> Result<(), Error>
    where
        K: ManagedResource,
        RenderedResource: From<K>,
    {
        let kind = K::RESOURCE_KIND;
        let resource = RenderedResource::from(self.renderer.render(template, spec)?);
        let name = self
            .client
            .create(&resource)
            .await
            .map_err(|e| Error::Create {
                kind,
                source: Box::new(e),
            })?;
        info!(
            operation = "launch",
            identifier = %spec.identifier,
            kind = %kind,
            name = %name,
            "Created resource"
        );
        created.push(CreatedResource::new(kind, name));
        Ok(())
    }

    /// Apply the partial-failure policy and build the error for the caller
    async fn fail(&self, spec: &RequestSpec, created: Vec<CreatedResource>, err: Error) -> Error {
        error!(
            operation = "launch",
            identifier = %spec.identifier,
            error = %err,
            created = created.len(),
            "Launch failed"
        );

        let Some(last) = created.last() else {
            return err;
        };
        let kind = match &err {
            Error::Create { kind, .. } => *kind,
            Error::Template(e) => e.kind(),
            _ => last.kind,
        };

        let rolled_back = match self.policy {
            PartialFailurePolicy::Rollback => {
                self.rollback(spec, &created).await;
                true
            }
            PartialFailurePolicy::Retain => {
                warn!(
                    operation = "launch",
                    identifier = %spec.identifier,
                    resources = ?created.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "Retaining resources from failed launch"
                );
                false
            }
        };

        Error::PartialLaunch {
            kind,
            created,
            rolled_back,
            source: Box::new(err),
        }
    }

    /// Delete created resources newest first; failures are logged only
    async fn rollback(&self, spec: &RequestSpec, created: &[CreatedResource]) {
        for resource in created.iter().rev() {
            match self.client.delete(resource.kind, &resource.name).await {
                Ok(DeleteOutcome::Deleted) => {
                    info!(
                        operation = "launch",
                        identifier = %spec.identifier,
                        resource = %resource,
                        "Rolled back resource"
                    );
                }
                Ok(DeleteOutcome::NotFound) => {}
                Err(e) => {
                    warn!(
                        operation = "launch",
                        identifier = %spec.identifier,
                        resource = %resource,
                        error = %e,
                        "Failed to roll back resource"
                    );
                }
            }
        }
    }
}
