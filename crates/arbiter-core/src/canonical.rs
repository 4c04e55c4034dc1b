//! # Canonical Serialization
//!
//! `CanonicalBytes` is the only input the digest functions accept. It is
//! produced by serializing to a `serde_json::Value` and then emitting RFC 8785
//! (JCS) output through `serde_jcs`: sorted keys, no insignificant
//! whitespace, a single byte sequence per logical value.
//!
//! Audit detail payloads may carry evidence submitted by market
//! participants, which is opaque to this system. Numbers are therefore
//! passed through as JCS formats them instead of being rejected.

use serde::Serialize;

use crate::error::CanonicalizationError;

/// Bytes produced by JCS canonicalization. The inner buffer is private.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        let text = serde_jcs::to_string(&value)?;
        Ok(Self(text.into_bytes()))
    }

    /// The canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for an empty buffer. JCS never produces one, but clippy asks.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted() {
        let cb = CanonicalBytes::new(&json!({"b": 1, "a": 2, "c": {"z": true, "y": null}})).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"a":2,"b":1,"c":{"y":null,"z":true}}"#
        );
    }

    #[test]
    fn key_order_does_not_change_bytes() {
        let a = CanonicalBytes::new(&json!({"market": "m1", "outcome": "yes"})).unwrap();
        let b = CanonicalBytes::new(&json!({"outcome": "yes", "market": "m1"})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn floats_pass_through() {
        let cb = CanonicalBytes::new(&json!({"price": 0.5})).unwrap();
        assert_eq!(std::str::from_utf8(cb.as_bytes()).unwrap(), r#"{"price":0.5}"#);
    }

    #[test]
    fn unicode_is_not_escaped() {
        let cb = CanonicalBytes::new(&json!({"title": "Élection"})).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            "{\"title\":\"Élection\"}"
        );
    }
}
