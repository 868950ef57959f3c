//! Template error types

use thiserror::Error;

use crate::cluster::ResourceKind;

/// Errors raised while turning a template into a typed resource
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template source has invalid syntax
    #[error("error parsing {kind} template: {source}")]
    Syntax {
        /// Resource kind the template produces
        kind: ResourceKind,
        /// Underlying minijinja error
        source: minijinja::Error,
    },

    /// Rendering failed, e.g. an undefined field was referenced
    #[error("error executing {kind} template: {source}")]
    Execute {
        /// Resource kind the template produces
        kind: ResourceKind,
        /// Underlying minijinja error
        source: minijinja::Error,
    },

    /// Rendered output is not a valid resource of the expected kind
    #[error("error parsing {kind} YAML: {message}")]
    Decode {
        /// Resource kind the template produces
        kind: ResourceKind,
        /// Description of the decode failure
        message: String,
    },

    /// Rendered output exceeds the document size bound
    #[error("error parsing {kind} YAML: rendered document is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Resource kind the template produces
        kind: ResourceKind,
        /// Size of the rendered document
        size: usize,
        /// Maximum accepted size
        limit: usize,
    },
}

impl TemplateError {
    /// Resource kind the failing template was for
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Syntax { kind, .. }
            | Self::Execute { kind, .. }
            | Self::Decode { kind, .. }
            | Self::TooLarge { kind, .. } => *kind,
        }
    }

    pub(crate) fn decode(kind: ResourceKind, message: impl Into<String>) -> Self {
        Self::Decode {
            kind,
            message: message.into(),
        }
    }
}
