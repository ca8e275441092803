use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;

use super::Error;
use super::request::deserialize_null_default;
use crate::json_ext::Object;
use crate::json_ext::OtherJsonMap;
use crate::json_ext::Value;

/// A GraphQL response, as delivered to the client under test.
///
/// An empty `errors` list is the same as no errors: it is never serialized, so
/// a fixture registered with `errors: []` resolves to a response without an
/// `errors` entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[schemars(with = "Option<serde_json::Value>")]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    #[schemars(with = "OtherJsonMap")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>, extensions: Map<ByteString, Value>) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// A response carrying only `data`.
    pub fn from_data(data: impl Into<Value>) -> Self {
        Self {
            data: Some(data.into()),
            ..Default::default()
        }
    }
}
