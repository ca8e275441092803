//! Stable matching keys for mocked requests.
//!
//! A fingerprint is the JSON serialization of a request's logical identity with
//! the keys of nested objects sorted. Arrays are left as they are, so their
//! element order and the key order of objects inside them both matter.

use std::fmt;

use serde_json_bytes::ByteString;

use crate::graphql::Document;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::sort_object_keys;

/// A deterministic key identifying a request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The key of a GraphQL request: printed document plus variables.
    pub fn for_request(document: &Document, variables: &Object) -> Self {
        let mut key = Object::new();
        key.insert("query", Value::String(ByteString::from(document.printed())));
        key.insert("variables", Value::Object(sort_object_keys(variables)));
        Self::from_key(key)
    }

    /// The key of a raw fetch: URL plus request options.
    pub fn for_fetch(url: &str, options: &Object) -> Self {
        let mut key = Object::new();
        key.insert("url", Value::String(ByteString::from(url)));
        key.insert("opts", Value::Object(sort_object_keys(options)));
        Self::from_key(key)
    }

    /// The fingerprint as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_key(key: Object) -> Self {
        Self(serde_json::to_string(&key).expect("JSON objects always serialize; qed"))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
