//! Manifest templating
//!
//! Manifest templates are text files rendered with minijinja against a
//! [`TemplateContext`] built from the request. The rendered text is decoded as
//! YAML (or JSON) into the typed Kubernetes object for its kind and stamped
//! with the configured labels.
//!
//! Available fields: `identifier`, `uniqueName`, `identityLabelKey`. Go-style
//! references such as `{{ .UniqueName }}` and `{{ .VideoId }}` are accepted too.

mod context;
mod decode;
mod engine;
mod error;
mod renderer;

pub use context::TemplateContext;
pub use decode::{decode_manifest, MAX_MANIFEST_BYTES};
pub use engine::TemplateEngine;
pub use error::TemplateError;
pub use renderer::{ManifestTemplate, TemplateRenderer};
