use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

use super::Document;
use super::OperationKind;
use crate::fingerprint::Fingerprint;
use crate::json_ext::Object;

/// A GraphQL request as issued by the client under test.
///
/// The operation kind is explicit rather than inferred from which field of a
/// loosely shaped object is set. On the wire the document sits under either a
/// `query` or a `mutation` key; deserializing picks the kind from that key and
/// from the document itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRequest", into = "RawRequest")]
#[non_exhaustive]
pub struct Request {
    /// The kind of operation being sent.
    pub kind: OperationKind,

    /// The parsed operation document.
    pub document: Document,

    /// The GraphQL variables in the form of a JSON object.
    pub variables: Object,

    /// The (optional) GraphQL operation name.
    pub operation_name: Option<String>,

    /// A label used only for diagnostics. It does not take part in matching.
    pub debug_name: Option<String>,
}

#[buildstructor::buildstructor]
impl Request {
    /// This is the constructor (or builder) to use when constructing a GraphQL `Request`.
    ///
    /// When `kind` is not given it is taken from the first operation of the document.
    #[builder(visibility = "pub")]
    fn new(
        document: Document,
        kind: Option<OperationKind>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        variables: JsonMap<ByteString, Value>,
        operation_name: Option<String>,
        debug_name: Option<String>,
    ) -> Self {
        Self {
            kind: kind.unwrap_or_else(|| document.operation_kind()),
            document,
            variables,
            operation_name,
            debug_name,
        }
    }

    /// The key this request is matched by.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::for_request(&self.document, &self.variables)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = RawRequest::from(self.clone());
        let json = serde_json::to_string(&raw).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    query: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    mutation: Option<Document>,
    #[serde(
        skip_serializing_if = "Object::is_empty",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    variables: Object,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    operation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    debug_name: Option<String>,
}

// NOTE: this deserialize helper is used to transform `null` to Default::default()
pub(crate) fn deserialize_null_default<'de, D, T: Default + Deserialize<'de>>(
    deserializer: D,
) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Option<T>>::deserialize(deserializer).map(|x| x.unwrap_or_default())
}

impl TryFrom<RawRequest> for Request {
    type Error = String;

    fn try_from(raw: RawRequest) -> Result<Self, Self::Error> {
        let (kind, document) = match (raw.query, raw.mutation) {
            (Some(document), None) => (document.operation_kind(), document),
            (None, Some(document)) => (OperationKind::Mutation, document),
            (Some(_), Some(_)) => {
                return Err("a request carries either `query` or `mutation`, not both".into());
            }
            (None, None) => return Err("a request needs a `query` or a `mutation`".into()),
        };
        Ok(Request {
            kind,
            document,
            variables: raw.variables,
            operation_name: raw.operation_name,
            debug_name: raw.debug_name,
        })
    }
}

impl From<Request> for RawRequest {
    fn from(request: Request) -> Self {
        let (query, mutation) = match request.kind {
            OperationKind::Mutation => (None, Some(request.document)),
            OperationKind::Query | OperationKind::Subscription => (Some(request.document), None),
        };
        RawRequest {
            query,
            mutation,
            variables: request.variables,
            operation_name: request.operation_name,
            debug_name: request.debug_name,
        }
    }
}
