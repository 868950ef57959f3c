//! Data exposed to manifest templates

use serde::Serialize;

use crate::spec::RequestSpec;

/// Fields available inside a manifest template
///
/// `identifier`, `uniqueName` and `identityLabelKey` are the documented names.
/// `VideoId`, `UniqueName` and `VideoIdLabel` carry the same values for
/// templates written against the older field names.
#[derive(Clone, Debug, Serialize)]
pub struct TemplateContext {
    identifier: String,
    #[serde(rename = "uniqueName")]
    unique_name: String,
    #[serde(rename = "identityLabelKey")]
    identity_label_key: String,

    #[serde(rename = "VideoId")]
    legacy_identifier: String,
    #[serde(rename = "UniqueName")]
    legacy_unique_name: String,
    #[serde(rename = "VideoIdLabel")]
    legacy_identity_label_key: String,
}

impl From<&RequestSpec> for TemplateContext {
    fn from(spec: &RequestSpec) -> Self {
        Self {
            identifier: spec.identifier.clone(),
            unique_name: spec.unique_name.clone(),
            identity_label_key: spec.identity_label_key.clone(),
            legacy_identifier: spec.identifier.clone(),
            legacy_unique_name: spec.unique_name.clone(),
            legacy_identity_label_key: spec.identity_label_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_current_and_legacy_names() {
        let spec = RequestSpec::derive("abc", "example.com/id");
        let value = serde_json::to_value(TemplateContext::from(&spec)).unwrap();

        assert_eq!(value["identifier"], "abc");
        assert_eq!(value["uniqueName"], "a9993e36");
        assert_eq!(value["identityLabelKey"], "example.com/id");
        assert_eq!(value["VideoId"], "abc");
        assert_eq!(value["UniqueName"], "a9993e36");
        assert_eq!(value["VideoIdLabel"], "example.com/id");
    }
}
