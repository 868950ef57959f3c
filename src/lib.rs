//! live-launcher - template-driven Kubernetes Job launcher
//!
//! Each launch request carries an opaque identifier. The launcher renders the
//! configured manifest templates for that identifier and creates a Job plus an
//! optional Service and Ingress, all labeled with the identifier. A background
//! reconciler watches those Jobs and deletes the companion Service and Ingress
//! once a Job has finished.
//!
//! # Modules
//!
//! - [`spec`] - Deterministic naming data derived from an identifier
//! - [`labels`] - Default and identity label configuration, selectors
//! - [`template`] - Manifest template rendering into typed resources
//! - [`cluster`] - Kubernetes API boundary ([`cluster::ClusterClient`])
//! - [`launcher`] - Ordered creation with partial-failure handling
//! - [`controller`] - Completion watcher and dependent cleanup
//! - [`server`] - HTTP front end
//! - [`supervisor`] - Ties the reconciler and server lifetimes together
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod cluster;
pub mod controller;
pub mod error;
pub mod labels;
pub mod launcher;
pub mod server;
pub mod spec;
pub mod supervisor;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application name reported by the liveness endpoint
pub const APP_NAME: &str = "live-launcher";

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
