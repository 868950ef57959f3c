//! Label configuration shared by the launcher and the cleanup controller
//!
//! Every resource created by the launcher carries the default label set plus an
//! identity label whose value is the request identifier. The controller selects
//! dependents for cleanup with the same labels, so both sides must agree on
//! them. [`LabelConfig`] is built once at startup and passed to each component.

use std::collections::BTreeMap;

use crate::Error;

/// Default label key/value applied to every managed resource
pub const DEFAULT_MANAGED_BY: (&str, &str) = ("app.kubernetes.io/managed-by", "live-launcher");

/// Default label key carrying the request identifier
pub const DEFAULT_IDENTITY_LABEL_KEY: &str = "live-launcher.io/identifier";

/// Default labels and identity label key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelConfig {
    defaults: BTreeMap<String, String>,
    identity_key: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            defaults: BTreeMap::from([(
                DEFAULT_MANAGED_BY.0.to_string(),
                DEFAULT_MANAGED_BY.1.to_string(),
            )]),
            identity_key: DEFAULT_IDENTITY_LABEL_KEY.to_string(),
        }
    }
}

impl LabelConfig {
    /// Create a label config from explicit defaults and identity key
    ///
    /// The default set must not be empty: the workload watch filters on it, and
    /// an empty selector would match every Job in the namespace.
    pub fn new(
        defaults: BTreeMap<String, String>,
        identity_key: impl Into<String>,
    ) -> Result<Self, Error> {
        let identity_key = identity_key.into();
        if identity_key.is_empty() {
            return Err(Error::validation("identity label key cannot be empty"));
        }
        if defaults.is_empty() {
            return Err(Error::validation("default label set cannot be empty"));
        }
        if defaults.contains_key(&identity_key) {
            return Err(Error::validation(format!(
                "identity label key '{}' must not be part of the default label set",
                identity_key
            )));
        }
        Ok(Self {
            defaults,
            identity_key,
        })
    }

    /// Parse `KEY=VALUE` pairs (as given on the command line) into a label map
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<BTreeMap<String, String>, Error> {
        pairs
            .iter()
            .map(|pair| {
                let pair = pair.as_ref();
                match pair.split_once('=') {
                    Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
                    _ => Err(Error::validation(format!(
                        "invalid label '{}', expected KEY=VALUE",
                        pair
                    ))),
                }
            })
            .collect()
    }

    /// Default labels applied to every managed resource
    pub fn defaults(&self) -> &BTreeMap<String, String> {
        &self.defaults
    }

    /// Label key under which the request identifier is stored
    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// Selector matching every resource this process manages
    pub fn managed_selector(&self) -> String {
        selector_from(&self.defaults)
    }

    /// Selector matching the resources of a single request
    pub fn identity_selector(&self, identifier: &str) -> String {
        let mut labels = self.defaults.clone();
        labels.insert(self.identity_key.clone(), identifier.to_string());
        selector_from(&labels)
    }

    /// Apply default labels then the identity label onto `labels`
    ///
    /// The identity label is written last so neither the template nor the
    /// defaults can override it.
    pub fn apply(&self, labels: &mut BTreeMap<String, String>, identifier: &str) {
        labels.extend(
            self.defaults
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        labels.insert(self.identity_key.clone(), identifier.to_string());
    }
}

/// Join labels into an equality-based selector in key order
pub fn selector_from(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config_uses_managed_by_label() {
        let config = LabelConfig::default();
        assert_eq!(
            config.managed_selector(),
            "app.kubernetes.io/managed-by=live-launcher"
        );
        assert_eq!(config.identity_key(), DEFAULT_IDENTITY_LABEL_KEY);
    }

    #[test]
    fn test_selector_is_sorted_by_key() {
        let selector = selector_from(&labels(&[("zone", "b"), ("app", "live"), ("m", "x")]));
        assert_eq!(selector, "app=live,m=x,zone=b");
    }

    #[test]
    fn test_selector_of_empty_map_is_empty() {
        assert_eq!(selector_from(&BTreeMap::new()), "");
    }

    #[test]
    fn test_identity_selector_adds_identifier() {
        let config = LabelConfig::new(labels(&[("app", "live")]), "video").unwrap();
        assert_eq!(
            config.identity_selector("abc123xyz89"),
            "app=live,video=abc123xyz89"
        );
        // Managed selector is untouched
        assert_eq!(config.managed_selector(), "app=live");
    }

    #[test]
    fn test_apply_overrides_template_labels() {
        let config = LabelConfig::new(labels(&[("app", "live")]), "video").unwrap();
        let mut existing = labels(&[("app", "template"), ("video", "spoofed"), ("tier", "web")]);

        config.apply(&mut existing, "real-id");

        assert_eq!(existing["app"], "live");
        assert_eq!(existing["video"], "real-id");
        assert_eq!(existing["tier"], "web");
    }

    #[test]
    fn test_new_rejects_invalid_configs() {
        assert!(LabelConfig::new(labels(&[("app", "live")]), "").is_err());
        assert!(LabelConfig::new(BTreeMap::new(), "video").is_err());
        assert!(LabelConfig::new(labels(&[("video", "x")]), "video").is_err());
    }

    #[test]
    fn test_parse_pairs_accepts_key_value() {
        let parsed = LabelConfig::parse_pairs(&["app=live", "team=media", "empty="]).unwrap();
        assert_eq!(parsed, labels(&[("app", "live"), ("team", "media"), ("empty", "")]));
    }

    #[test]
    fn test_parse_pairs_rejects_missing_separator() {
        assert!(LabelConfig::parse_pairs(&["app"]).is_err());
        assert!(LabelConfig::parse_pairs(&["=value"]).is_err());
    }
}
