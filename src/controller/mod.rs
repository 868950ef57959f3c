//! Cleanup controller
//!
//! Watches managed workload Jobs and deletes the Services and Ingresses that
//! share a Job's identity label once the Job has finished.

mod cleanup;

pub use cleanup::{
    workload_events, CleanupConfig, CleanupReconciler, CleanupReport, WorkloadPhase,
    DEFAULT_WATCH_ERROR_BUDGET,
};
