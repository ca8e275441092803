//! JSON helpers shared by the mocks.

use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Schema stand-in for [`Object`], which does not implement `JsonSchema`.
pub(crate) type OtherJsonMap = serde_json::Map<String, serde_json::Value>;

/// Returns a copy of `value` where every object lists its keys in sorted order.
///
/// Arrays are copied as they are: neither their elements nor the keys of
/// objects inside them are reordered.
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(sort_object_keys(object)),
        Value::Array(values) => Value::Array(values.clone()),
        other => other.clone(),
    }
}

/// [`sort_keys`] for an object.
pub fn sort_object_keys(object: &Object) -> Object {
    let mut entries: Vec<(&ByteString, &Value)> = object.iter().collect();
    entries.sort_by(|(left, _), (right, _)| left.as_str().cmp(right.as_str()));

    let mut sorted = Object::new();
    for (key, value) in entries {
        sorted.insert(key.clone(), sort_keys(value));
    }
    sorted
}

/// Merges `overrides` into `base`.
///
/// Objects present on both sides are merged key by key; any other value from
/// `overrides` replaces the one in `base`.
pub fn deep_merge(base: &mut Object, overrides: &Object) {
    for (key, value) in overrides.iter() {
        match (base.get_mut(key.as_str()), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming)
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
