//! Per-request naming data derived from the request identifier

use std::fmt::Write;

use aws_lc_rs::digest;

/// Number of hex characters kept from the identifier hash
pub const UNIQUE_NAME_LEN: usize = 8;

/// Naming and labeling data for a single launch request
///
/// Built fresh for every request and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSpec {
    /// Request identifier as supplied by the caller
    pub identifier: String,
    /// Short DNS-safe token derived from the identifier
    pub unique_name: String,
    /// Label key under which the identifier is stored
    pub identity_label_key: String,
}

impl RequestSpec {
    /// Derive the spec for an identifier
    ///
    /// The identifier must already be validated as non-empty.
    pub fn derive(identifier: &str, identity_label_key: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            unique_name: unique_name(identifier),
            identity_label_key: identity_label_key.to_string(),
        }
    }
}

/// First 8 lowercase hex characters of the SHA-1 digest of `identifier`.
///
/// SHA-1 keeps generated names identical to those of existing deployments. The
/// digest only names resources, it is not a security boundary. Truncation
/// leaves about 32 bits, so collisions are unlikely but possible.
pub fn unique_name(identifier: &str) -> String {
    let hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, identifier.as_bytes());
    hash.as_ref()[..UNIQUE_NAME_LEN / 2]
        .iter()
        .fold(String::with_capacity(UNIQUE_NAME_LEN), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name_matches_sha1_prefix() {
        // sha1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        assert_eq!(unique_name("abc"), "a9993e36");
    }

    #[test]
    fn test_unique_name_is_eight_lowercase_hex() {
        for id in ["abc123xyz89", "x", "a very long identifier / with spaces", "ÜnïcødÉ"] {
            let name = unique_name(id);
            assert_eq!(name.len(), UNIQUE_NAME_LEN, "{id}");
            assert!(
                name.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)),
                "{name} is not lowercase hex"
            );
        }
    }

    #[test]
    fn test_unique_name_is_deterministic() {
        assert_eq!(unique_name("abc123xyz89"), unique_name("abc123xyz89"));
        assert_ne!(unique_name("abc123xyz89"), unique_name("abc123xyz88"));
    }

    #[test]
    fn test_derive_fills_all_fields() {
        let spec = RequestSpec::derive("abc", "live-launcher.io/identifier");
        assert_eq!(spec.identifier, "abc");
        assert_eq!(spec.unique_name, "a9993e36");
        assert_eq!(spec.identity_label_key, "live-launcher.io/identifier");
    }
}
