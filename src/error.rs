//! Error types for the launcher

use thiserror::Error;

use crate::cluster::{CreatedResource, ResourceKind};
use crate::template::TemplateError;

/// Main error type for launcher operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Request or configuration failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// Template could not be parsed, executed or decoded
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The API server rejected a resource
    #[error("error creating {kind}: {source}")]
    Create {
        /// Kind whose creation failed
        kind: ResourceKind,
        /// Underlying failure
        source: Box<Error>,
    },

    /// A later step of a launch failed after earlier resources were created
    #[error("{source} ({})", partial_summary(.created, .rolled_back))]
    PartialLaunch {
        /// Kind whose creation failed
        kind: ResourceKind,
        /// Resources created earlier in the same launch
        created: Vec<CreatedResource>,
        /// Whether the created resources were deleted again
        rolled_back: bool,
        /// Underlying failure
        source: Box<Error>,
    },

    /// The workload watch failed beyond its error budget
    #[error("watch error: {0}")]
    Watch(String),

    /// The workload watch stream ended
    #[error("workload watch stream closed")]
    WatchClosed,

    /// Startup configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was aborted
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a watch error with the given message
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }

    /// True if this is a Kubernetes 404 response
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }
}

fn partial_summary(created: &[CreatedResource], rolled_back: &bool) -> String {
    let fate = if *rolled_back { "rolled back" } else { "retained" };
    format!("{} created before failure, {}", created.len(), fate)
}
