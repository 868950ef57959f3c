//! Manifest renderer
//!
//! Turns a manifest template plus a [`RequestSpec`] into a typed, labeled
//! Kubernetes object. Rendering has no side effects; the launcher submits the
//! result.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::cluster::{ManagedResource, ResourceKind};
use crate::labels::LabelConfig;
use crate::spec::RequestSpec;

use super::context::TemplateContext;
use super::decode::decode_manifest;
use super::engine::TemplateEngine;
use super::error::TemplateError;

/// A syntax-checked template producing objects of type `K`
#[derive(Clone, Debug)]
pub struct ManifestTemplate<K> {
    source: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ManagedResource> ManifestTemplate<K> {
    /// Resource kind this template produces
    pub fn kind(&self) -> ResourceKind {
        K::RESOURCE_KIND
    }
}

/// Renders manifest templates into labeled resources
pub struct TemplateRenderer {
    engine: TemplateEngine,
    labels: LabelConfig,
}

impl TemplateRenderer {
    /// Create a renderer applying the given labels
    pub fn new(labels: LabelConfig) -> Self {
        Self {
            engine: TemplateEngine::new(),
            labels,
        }
    }

    /// Label configuration applied to rendered resources
    pub fn labels(&self) -> &LabelConfig {
        &self.labels
    }

    /// Parse template source for resources of type `K`
    ///
    /// Syntax errors are reported here, at startup, rather than on the first
    /// request.
    pub fn compile<K: ManagedResource>(
        &self,
        source: impl AsRef<str>,
    ) -> Result<ManifestTemplate<K>, TemplateError> {
        let source = TemplateEngine::normalize(source.as_ref());
        self.engine
            .check_syntax(&source)
            .map_err(|source| TemplateError::Syntax {
                kind: K::RESOURCE_KIND,
                source,
            })?;
        Ok(ManifestTemplate {
            source,
            _kind: PhantomData,
        })
    }

    /// Render a template for one request
    ///
    /// The result carries the default labels and the identity label. The
    /// identity label is written last and always equals `spec.identifier`.
    pub fn render<K: ManagedResource>(
        &self,
        template: &ManifestTemplate<K>,
        spec: &RequestSpec,
    ) -> Result<K, TemplateError> {
        let kind = K::RESOURCE_KIND;

        let rendered = self
            .engine
            .render(&template.source, TemplateContext::from(spec))
            .map_err(|source| TemplateError::Execute { kind, source })?;

        let mut resource = decode_manifest::<K>(&rendered)?;

        let labels = resource
            .metadata_mut()
            .labels
            .get_or_insert_with(BTreeMap::new);
        self.labels.apply(labels, &spec.identifier);

        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::MAX_MANIFEST_BYTES;
    use k8s_openapi::api::batch::v1::Job;
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::api::networking::v1::Ingress;

    const JOB_TEMPLATE: &str = r#"
apiVersion: batch/v1
kind: Job
metadata:
  name: job-{{ .uniqueName }}
  labels:
    app: test-job
spec:
  backoffLimit: 4
  template:
    spec:
      restartPolicy: OnFailure
      containers:
      - name: stream
        image: busybox
        args: ['/bin/sh', '-c', 'echo {{ .identifier }}']
"#;

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::new(LabelConfig::default())
    }

    fn spec(identifier: &str) -> RequestSpec {
        RequestSpec::derive(identifier, crate::labels::DEFAULT_IDENTITY_LABEL_KEY)
    }

    // =========================================================================
    // Story: a request becomes a fully labeled Job
    // =========================================================================

    #[test]
    fn test_job_is_rendered_with_unique_name_and_labels() {
        let r = renderer();
        let template = r.compile::<Job>(JOB_TEMPLATE).unwrap();
        let spec = spec("abc123xyz89");

        let job = r.render(&template, &spec).unwrap();

        assert_eq!(
            job.metadata.name.as_deref(),
            Some(format!("job-{}", spec.unique_name).as_str())
        );
        let labels = job.metadata.labels.unwrap();
        assert_eq!(labels["app"], "test-job");
        assert_eq!(labels["app.kubernetes.io/managed-by"], "live-launcher");
        assert_eq!(labels[crate::labels::DEFAULT_IDENTITY_LABEL_KEY], "abc123xyz89");

        let args = job.spec.unwrap().template.spec.unwrap().containers[0]
            .args
            .clone()
            .unwrap();
        assert_eq!(args[2], "echo abc123xyz89");
    }

    #[test]
    fn test_identity_label_cannot_be_spoofed() {
        let r = renderer();
        let template = r
            .compile::<Service>(
                r#"
metadata:
  name: svc-{{ uniqueName }}
  labels:
    live-launcher.io/identifier: someone-else
    app.kubernetes.io/managed-by: me
"#,
            )
            .unwrap();

        let svc = r.render(&template, &spec("real-id")).unwrap();
        let labels = svc.metadata.labels.unwrap();
        assert_eq!(labels["live-launcher.io/identifier"], "real-id");
        assert_eq!(labels["app.kubernetes.io/managed-by"], "live-launcher");
    }

    #[test]
    fn test_labels_created_when_template_has_none() {
        let r = renderer();
        let template = r
            .compile::<Ingress>("metadata:\n  name: ing-{{ UniqueName }}\n")
            .unwrap();

        let ingress = r.render(&template, &spec("abc")).unwrap();
        assert_eq!(ingress.metadata.name.as_deref(), Some("ing-a9993e36"));
        assert_eq!(ingress.metadata.labels.unwrap().len(), 2);
    }

    #[test]
    fn test_json_template_accepted() {
        let r = renderer();
        let template = r
            .compile::<Service>(r#"{"metadata": {"name": "svc-{{ .uniqueName }}"}, "spec": {"ports": [{"port": 8080}]}}"#)
            .unwrap();

        let svc = r.render(&template, &spec("abc")).unwrap();
        assert_eq!(svc.metadata.name.as_deref(), Some("svc-a9993e36"));
        assert_eq!(svc.spec.unwrap().ports.unwrap()[0].port, 8080);
    }

    // =========================================================================
    // Story: template failures never produce a partial object
    // =========================================================================

    #[test]
    fn test_undefined_field_fails_execution() {
        let r = renderer();
        let template = r.compile::<Job>("metadata:\n  name: {{ .VideoID }}\n").unwrap();

        let err = r.render(&template, &spec("abc")).unwrap_err();
        assert!(matches!(err, TemplateError::Execute { kind: ResourceKind::Workload, .. }));
        assert!(err.to_string().starts_with("error executing job template"));
    }

    #[test]
    fn test_syntax_error_reported_at_compile() {
        let err = renderer()
            .compile::<Service>("metadata:\n  name: {% if %}\n")
            .unwrap_err();
        assert!(err.to_string().starts_with("error parsing service template"));
    }

    #[test]
    fn test_invalid_yaml_fails_decode() {
        let r = renderer();
        let template = r.compile::<Ingress>("metadata: [unclosed\n").unwrap();

        let err = r.render(&template, &spec("abc")).unwrap_err();
        assert!(err.to_string().starts_with("error parsing ingress YAML"));
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let r = renderer();
        let template = r
            .compile::<Job>("apiVersion: v1\nkind: Service\nmetadata:\n  name: x\n")
            .unwrap();

        let err = r.render(&template, &spec("abc")).unwrap_err();
        assert!(matches!(err, TemplateError::Decode { .. }));
        assert!(err.to_string().contains("expected apiVersion batch/v1"));
    }

    #[test]
    fn test_scalar_document_rejected() {
        let r = renderer();
        let template = r.compile::<Job>("just a string").unwrap();
        assert!(matches!(
            r.render(&template, &spec("abc")),
            Err(TemplateError::Decode { .. })
        ));
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let r = renderer();
        let template = r
            .compile::<Service>("metadata:\n  name: svc\nspec:\n  ports: not-a-list\n")
            .unwrap();
        assert!(matches!(
            r.render(&template, &spec("abc")),
            Err(TemplateError::Decode { .. })
        ));
    }

    #[test]
    fn test_oversized_document_rejected() {
        let r = renderer();
        let padding = "x".repeat(MAX_MANIFEST_BYTES);
        let template = r
            .compile::<Job>(format!("metadata:\n  name: job\n# {}\n", padding))
            .unwrap();

        let err = r.render(&template, &spec("abc")).unwrap_err();
        assert!(matches!(err, TemplateError::TooLarge { .. }));
    }

    #[test]
    fn test_template_reports_its_kind() {
        let r = renderer();
        assert_eq!(
            r.compile::<Ingress>("metadata: {}").unwrap().kind(),
            ResourceKind::Ingress
        );
    }
}
