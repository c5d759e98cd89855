//! Parameter codec and request key derivation.
//!
//! A request is identified by its target URI plus a multimap of parameter
//! values. Two submissions with the same parameters in a different order
//! must collapse to the same key, so both the canonical string form and the
//! derived key sort entries by parameter name, then value.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Keys longer than this are replaced by a digest so they stay usable as
/// object-store keys downstream.
pub const MAX_KEY_LENGTH: usize = 200;

/// Multimap from parameter name to its values.
///
/// Names are kept sorted; values retain insertion order until encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Params(BTreeMap<String, Vec<String>>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value for a parameter, keeping any existing values.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.entry(name.into()).or_default().push(value.into());
        self
    }

    /// All values bound to a parameter, if any.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Canonical query-string form: entries sorted by name, then value.
    ///
    /// `foo=x&bar=y` and `bar=y&foo=x` both encode to `bar=y&foo=x`.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        for (name, values) in &self.0 {
            let mut values = values.clone();
            values.sort();
            for value in values {
                if !buf.is_empty() {
                    buf.push('&');
                }
                buf.push_str(name);
                buf.push('=');
                buf.push_str(&value);
            }
        }
        buf
    }

    /// Parse a query-string form. A bare name with no `=` binds the empty
    /// value. The input need not be canonical; re-encoding canonicalizes.
    pub fn decode(encoded: &str) -> Self {
        let mut params = Self::new();
        for binding in encoded.split('&').filter(|b| !b.is_empty()) {
            match binding.split_once('=') {
                Some((name, value)) => params.add(name, value),
                None => params.add(binding, ""),
            };
        }
        params
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.add(name, value);
        }
        params
    }
}

/// Derive the deterministic request key from a target URI and its parameters.
///
/// Readable form: `uri_name_value_..._value` over sorted names and values,
/// with `/` escaped. If that exceeds [`MAX_KEY_LENGTH`] the key falls back
/// to a hex digest of the same sorted material, so permuted parameter
/// orders still collide onto one key.
pub fn request_key(request_uri: &str, params: &Params) -> String {
    let mut key = String::from(request_uri);
    for (name, values) in params.iter() {
        key.push('_');
        key.push_str(name);
        let mut values = values.clone();
        values.sort();
        for value in values {
            key.push('_');
            key.push_str(&value);
        }
    }
    let key = key.replace('/', "%2F");

    if key.len() <= MAX_KEY_LENGTH {
        return key;
    }

    // Readable encoding too big, digest the same sorted material instead.
    let mut hasher = Sha256::new();
    hasher.update(request_uri.as_bytes());
    for (name, values) in params.iter() {
        let mut values = values.clone();
        values.sort();
        for value in values {
            hasher.update(format!("{name}={value}").as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_sorts_by_name_then_value() {
        let params = Params::decode("foo=x&bar=y");
        assert_eq!(params.encode(), "bar=y&foo=x");

        let mut multi = Params::new();
        multi.add("a", "2").add("a", "1").add("b", "x");
        assert_eq!(multi.encode(), "a=1&a=2&b=x");
    }

    #[test]
    fn decode_bare_name_binds_empty_value() {
        let params = Params::decode("flag&foo=x");
        assert_eq!(params.get("flag"), Some(&["".to_string()][..]));
        assert_eq!(params.encode(), "flag=&foo=x");
    }

    #[test]
    fn key_is_order_independent() {
        let a = request_key("test", &Params::decode("foo=x&bar=y"));
        let b = request_key("test", &Params::decode("bar=y&foo=x"));
        assert_eq!(a, "test_bar_y_foo_x");
        assert_eq!(a, b);
    }

    #[test]
    fn key_with_no_params_is_just_the_uri() {
        assert_eq!(request_key("report", &Params::new()), "report");
    }

    #[test]
    fn key_escapes_path_separators() {
        let key = request_key("ds/report", &Params::decode("foo=x"));
        assert_eq!(key, "ds%2Freport_foo_x");
    }

    #[test]
    fn oversized_key_falls_back_to_digest() {
        let mut params = Params::new();
        for i in 0..40 {
            params.add(format!("param{i:02}"), "somevalue");
        }
        let key = request_key("test", &params);
        assert_eq!(key.len(), 64); // hex sha-256
        assert!(!key.contains('_'));

        // Digest form is still order-independent.
        let mut reversed = Params::new();
        for i in (0..40).rev() {
            reversed.add(format!("param{i:02}"), "somevalue");
        }
        assert_eq!(key, request_key("test", &reversed));
    }
}
