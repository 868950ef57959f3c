//! Rendered manifest decoding
//!
//! Rendered text is read with yaml-rust2 (JSON is accepted as a YAML subset).
//! Only the first document is used. The root must be a mapping; its
//! `apiVersion` and `kind` are filled in when missing and must otherwise name
//! the expected type before the object is deserialized into `K`.

use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::cluster::ManagedResource;

use super::error::TemplateError;

/// Upper bound on the size of a rendered manifest
pub const MAX_MANIFEST_BYTES: usize = 1024 * 1024;

/// Decode rendered manifest text into a typed resource
pub fn decode_manifest<K: ManagedResource>(rendered: &str) -> Result<K, TemplateError> {
    let kind = K::RESOURCE_KIND;

    if rendered.len() > MAX_MANIFEST_BYTES {
        return Err(TemplateError::TooLarge {
            kind,
            size: rendered.len(),
            limit: MAX_MANIFEST_BYTES,
        });
    }

    let docs =
        YamlLoader::load_from_str(rendered).map_err(|e| TemplateError::decode(kind, e.to_string()))?;
    let root = match docs.into_iter().next() {
        Some(Yaml::Hash(root)) => root,
        None | Some(Yaml::Null) => return Err(TemplateError::decode(kind, "document is empty")),
        Some(_) => {
            return Err(TemplateError::decode(
                kind,
                "expected a mapping at the document root",
            ))
        }
    };

    let mut object = mapping(root, "").map_err(|e| TemplateError::decode(kind, e))?;
    ensure_type_field::<K>(&mut object, "apiVersion", K::API_VERSION)?;
    ensure_type_field::<K>(&mut object, "kind", K::KIND)?;

    serde_json::from_value(Value::Object(object))
        .map_err(|e| TemplateError::decode(kind, e.to_string()))
}

/// Fill in a missing type field, or reject one naming a different type
fn ensure_type_field<K: ManagedResource>(
    object: &mut Map<String, Value>,
    field: &str,
    expected: &str,
) -> Result<(), TemplateError> {
    match object.get(field) {
        None | Some(Value::Null) => {
            object.insert(field.to_string(), Value::String(expected.to_string()));
            Ok(())
        }
        Some(Value::String(found)) if found == expected => Ok(()),
        Some(found) => Err(TemplateError::decode(
            K::RESOURCE_KIND,
            format!("expected {} {}, found {}", field, expected, found),
        )),
    }
}

/// Convert a YAML node; `at` is the dotted path used in error messages
fn node(yaml: Yaml, at: &str) -> Result<Value, String> {
    let value = match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::from(i),
        Yaml::String(s) => Value::String(s),
        Yaml::Real(text) => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("{}: {} is not a finite number", location(at), text))?,
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| node(item, &format!("{}[{}]", at, i)))
                .collect::<Result<_, _>>()?,
        ),
        Yaml::Hash(entries) => Value::Object(mapping(entries, at)?),
        Yaml::Alias(_) => return Err(format!("{}: aliases are not supported", location(at))),
        Yaml::BadValue => return Err(format!("{}: invalid value", location(at))),
    };
    Ok(value)
}

/// Convert mapping entries; keys must be scalars
fn mapping(
    entries: impl IntoIterator<Item = (Yaml, Yaml)>,
    at: &str,
) -> Result<Map<String, Value>, String> {
    entries
        .into_iter()
        .map(|(key, value)| {
            let key = match key {
                Yaml::String(s) | Yaml::Real(s) => s,
                Yaml::Integer(i) => i.to_string(),
                Yaml::Boolean(b) => b.to_string(),
                _ => return Err(format!("{}: mapping keys must be scalars", location(at))),
            };
            let child = if at.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", at, key)
            };
            Ok((key, node(value, &child)?))
        })
        .collect()
}

fn location(at: &str) -> &str {
    if at.is_empty() {
        "document root"
    } else {
        at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ResourceKind;
    use k8s_openapi::api::batch::v1::Job;
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::api::networking::v1::Ingress;

    fn decode_error<K: ManagedResource + std::fmt::Debug>(input: &str) -> String {
        decode_manifest::<K>(input).unwrap_err().to_string()
    }

    #[test]
    fn test_nested_job_manifest() {
        let job: Job = decode_manifest(
            r#"
apiVersion: batch/v1
kind: Job
metadata:
  name: job-1
spec:
  backoffLimit: 4
  template:
    spec:
      restartPolicy: Never
      containers:
      - name: main
        image: busybox
        args: ['/bin/sh', '-c', 'sleep 10']
"#,
        )
        .unwrap();

        assert_eq!(job.metadata.name.as_deref(), Some("job-1"));
        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(4));
        let args = spec.template.spec.unwrap().containers[0].args.clone().unwrap();
        assert_eq!(args[2], "sleep 10");
    }

    #[test]
    fn test_json_manifest() {
        let svc: Service =
            decode_manifest(r#"{"metadata": {"name": "svc"}, "spec": {"ports": [{"port": 80}]}}"#)
                .unwrap();
        assert_eq!(svc.spec.unwrap().ports.unwrap()[0].port, 80);
    }

    #[test]
    fn test_type_fields_filled_in() {
        let ingress: Ingress = decode_manifest("metadata:\n  name: ing\n").unwrap();
        assert_eq!(ingress.metadata.name.as_deref(), Some("ing"));
    }

    #[test]
    fn test_only_first_document_is_used() {
        let svc: Service =
            decode_manifest("metadata:\n  name: first\n---\nmetadata:\n  name: second\n").unwrap();
        assert_eq!(svc.metadata.name.as_deref(), Some("first"));
    }

    #[test]
    fn test_integer_keys_become_strings() {
        let svc: Service =
            decode_manifest("metadata:\n  name: svc\n  labels:\n    8080: http\n").unwrap();
        assert_eq!(svc.metadata.labels.unwrap()["8080"], "http");
    }

    #[test]
    fn test_empty_document_rejected() {
        assert_eq!(
            decode_error::<Job>(""),
            "error parsing job YAML: document is empty"
        );
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        assert!(decode_error::<Service>("not: valid: yaml: {{")
            .starts_with("error parsing service YAML"));
    }

    #[test]
    fn test_sequence_root_rejected() {
        assert!(decode_error::<Job>("- a\n- b\n").contains("expected a mapping"));
    }

    #[test]
    fn test_complex_key_reports_path() {
        let msg = decode_error::<Service>("metadata:\n  labels:\n    ? [a, b]\n    : x\n");
        assert!(msg.contains("metadata.labels: mapping keys must be scalars"), "{msg}");
    }

    #[test]
    fn test_non_finite_number_reports_path() {
        let msg = decode_error::<Service>("spec:\n  ports:\n  - port: .nan\n");
        assert!(msg.contains("spec.ports[0].port"), "{msg}");
    }

    #[test]
    fn test_mismatched_kind_rejected() {
        let err = decode_manifest::<Ingress>("apiVersion: networking.k8s.io/v1\nkind: Service\n")
            .unwrap_err();
        assert_eq!(err.kind(), ResourceKind::Ingress);
        assert!(err.to_string().contains("expected kind Ingress, found \"Service\""));
    }

    #[test]
    fn test_oversized_rejected_before_parsing() {
        let input = format!("# {}", "x".repeat(MAX_MANIFEST_BYTES));
        assert!(matches!(
            decode_manifest::<Job>(&input),
            Err(TemplateError::TooLarge { .. })
        ));
    }
}
