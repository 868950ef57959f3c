//! Kubernetes API boundary
//!
//! [`ClusterClient`] is the only way the launcher and the cleanup controller
//! talk to the cluster: create a rendered resource, list resources of a kind by
//! label selector, delete one by name. [`KubeClusterClient`] implements it on
//! top of kube-rs for a single namespace.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Default connection timeout for the kube client
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for the kube client
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// The resource kinds the launcher creates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// The workload (`batch/v1 Job`)
    Workload,
    /// Companion `v1 Service`
    Service,
    /// Companion `networking.k8s.io/v1 Ingress`
    Ingress,
}

impl ResourceKind {
    /// Short name used in messages and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workload => "job",
            Self::Service => "service",
            Self::Ingress => "ingress",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed Kubernetes object that can be produced from a manifest template
pub trait ManagedResource:
    k8s_openapi::Resource<Scope = NamespaceResourceScope>
    + k8s_openapi::Metadata<Ty = ObjectMeta>
    + DeserializeOwned
{
    /// Which launcher kind this type represents
    const RESOURCE_KIND: ResourceKind;
}

impl ManagedResource for Job {
    const RESOURCE_KIND: ResourceKind = ResourceKind::Workload;
}

impl ManagedResource for Service {
    const RESOURCE_KIND: ResourceKind = ResourceKind::Service;
}

impl ManagedResource for Ingress {
    const RESOURCE_KIND: ResourceKind = ResourceKind::Ingress;
}

/// A rendered object ready to be submitted
#[derive(Clone, Debug)]
pub enum RenderedResource {
    /// Workload Job
    Workload(Job),
    /// Companion Service
    Service(Service),
    /// Companion Ingress
    Ingress(Ingress),
}

impl RenderedResource {
    /// Kind of the wrapped object
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Workload(_) => ResourceKind::Workload,
            Self::Service(_) => ResourceKind::Service,
            Self::Ingress(_) => ResourceKind::Ingress,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Workload(job) => &job.metadata,
            Self::Service(svc) => &svc.metadata,
            Self::Ingress(ing) => &ing.metadata,
        }
    }
}

impl From<Job> for RenderedResource {
    fn from(job: Job) -> Self {
        Self::Workload(job)
    }
}

impl From<Service> for RenderedResource {
    fn from(svc: Service) -> Self {
        Self::Service(svc)
    }
}

impl From<Ingress> for RenderedResource {
    fn from(ing: Ingress) -> Self {
        Self::Ingress(ing)
    }
}

/// Record of a resource created during a launch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedResource {
    /// Resource kind
    pub kind: ResourceKind,
    /// Name assigned by the API server
    pub name: String,
}

impl CreatedResource {
    /// Create a new record
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for CreatedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Result of a delete call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The resource existed and deletion was accepted
    Deleted,
    /// The resource was already gone
    NotFound,
}

/// Trait abstracting the Kubernetes operations used by the launcher
///
/// This trait allows mocking the cluster in tests while using the real
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create a resource and return the name the API server assigned
    async fn create(&self, resource: &RenderedResource) -> Result<String, Error>;

    /// Names of resources of `kind` matching an equality label selector
    async fn list_names(&self, kind: ResourceKind, selector: &str) -> Result<Vec<String>, Error>;

    /// Delete a resource by name; an absent resource is not an error
    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<DeleteOutcome, Error>;
}

/// [`ClusterClient`] backed by kube-rs, scoped to one namespace
pub struct KubeClusterClient {
    client: Client,
    namespace: String,
}

impl KubeClusterClient {
    /// Create a client operating in `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn create_typed<K>(&self, object: &K) -> Result<String, Error>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>
            + Clone
            + fmt::Debug
            + Serialize
            + DeserializeOwned,
        K::DynamicType: Default,
    {
        let created = self.api::<K>().create(&PostParams::default(), object).await?;
        Ok(created.name_any())
    }

    async fn list_typed<K>(&self, selector: &str) -> Result<Vec<String>, Error>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>
            + Clone
            + fmt::Debug
            + DeserializeOwned,
        K::DynamicType: Default,
    {
        let list = self
            .api::<K>()
            .list_metadata(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items.iter().map(|item| item.name_any()).collect())
    }

    async fn delete_typed<K>(&self, name: &str, params: &DeleteParams) -> Result<DeleteOutcome, Error>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>
            + Clone
            + fmt::Debug
            + DeserializeOwned,
        K::DynamicType: Default,
    {
        match self.api::<K>().delete(name, params).await.map_err(Error::from) {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.is_not_found() => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create(&self, resource: &RenderedResource) -> Result<String, Error> {
        match resource {
            RenderedResource::Workload(job) => self.create_typed(job).await,
            RenderedResource::Service(svc) => self.create_typed(svc).await,
            RenderedResource::Ingress(ing) => self.create_typed(ing).await,
        }
    }

    async fn list_names(&self, kind: ResourceKind, selector: &str) -> Result<Vec<String>, Error> {
        match kind {
            ResourceKind::Workload => self.list_typed::<Job>(selector).await,
            ResourceKind::Service => self.list_typed::<Service>(selector).await,
            ResourceKind::Ingress => self.list_typed::<Ingress>(selector).await,
        }
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<DeleteOutcome, Error> {
        debug!(kind = %kind, name = %name, namespace = %self.namespace, "Deleting resource");
        match kind {
            // Background propagation so the Job's pods go with it
            ResourceKind::Workload => {
                self.delete_typed::<Job>(name, &DeleteParams::background())
                    .await
            }
            ResourceKind::Service => {
                self.delete_typed::<Service>(name, &DeleteParams::default())
                    .await
            }
            ResourceKind::Ingress => {
                self.delete_typed::<Ingress>(name, &DeleteParams::default())
                    .await
            }
        }
    }
}

/// Create a kube client from an optional kubeconfig path with default timeouts
///
/// Without a path the configuration is inferred: in-cluster service account
/// credentials when running in a pod, otherwise `$KUBECONFIG` or
/// `~/.kube/config`.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::config(format!("failed to read kubeconfig: {}", e)))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("failed to infer config: {}", e)))?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config)
        .map_err(|e| Error::config(format!("failed to create client: {}", e)))
}
