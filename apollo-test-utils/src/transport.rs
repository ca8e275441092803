//! An HTTP batching transport, driven through an injected [`Fetch`].
//!
//! This is the real (non-mocked) side of batching: it prints every request,
//! posts them as one JSON array and splits the array it gets back. Pair it with
//! [`MockFetch`](crate::mocks::fetch::MockFetch) to test it without a network.

use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::json;
use tower::BoxError;

use crate::error::MockError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::deep_merge;
use crate::mocks::batched::BatchFuture;
use crate::mocks::batched::BatchedNetworkInterface;
use crate::mocks::fetch::Fetch;
use crate::mocks::fetch::FetchResponse;
use crate::mocks::network::NetworkInterface;
use crate::mocks::network::ResponseFuture;

/// A request as it is put on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintedRequest {
    /// The printed document.
    pub query: String,
    /// The variables, omitted when empty.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub variables: Object,
    /// The operation to run, omitted when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

/// Prints the document of `request`.
pub fn print_request(request: &Request) -> PrintedRequest {
    PrintedRequest {
        query: request.document.printed().to_owned(),
        variables: request.variables.clone(),
        operation_name: request.operation_name.clone(),
    }
}

/// The requests of a batch and the fetch options they will be sent with.
#[derive(Clone, Debug)]
pub struct BatchRequest {
    /// The batched requests, in send order.
    pub requests: Vec<Request>,
    /// Fetch options, already merged with the defaults.
    pub options: Object,
}

/// The raw response of a batch and the fetch options that produced it.
#[derive(Clone, Debug)]
pub struct BatchResponse {
    /// What the fetch resolved to.
    pub response: FetchResponse,
    /// The options the batch was fetched with.
    pub options: Object,
}

/// Runs before a batch is fetched and may rewrite it.
#[async_trait::async_trait]
pub trait BatchMiddleware: Send + Sync {
    /// Rewrites the requests or options; an error fails the batch.
    async fn apply_batch_middleware(&self, request: &mut BatchRequest) -> Result<(), BoxError>;
}

/// Runs once the response of a batch arrived.
#[async_trait::async_trait]
pub trait BatchAfterware: Send + Sync {
    /// Inspects the raw response; an error fails the batch.
    async fn apply_batch_afterware(&self, response: &BatchResponse) -> Result<(), BoxError>;
}

fn default_options() -> Object {
    json!({
        "method": "POST",
        "headers": {
            "Accept": "*/*",
            "Content-Type": "application/json",
        },
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

/// Sends batches of GraphQL requests as single HTTP requests.
#[derive(Clone)]
pub struct HttpBatchedNetworkInterface {
    uri: String,
    opts: Object,
    fetch: Arc<dyn Fetch>,
    middlewares: Vec<Arc<dyn BatchMiddleware>>,
    afterwares: Vec<Arc<dyn BatchAfterware>>,
}

#[buildstructor::buildstructor]
impl HttpBatchedNetworkInterface {
    /// Creates a transport posting to `uri`.
    ///
    /// `opts` are merged over the default options (`POST`, JSON content type)
    /// for every batch.
    #[builder(visibility = "pub")]
    fn new(
        uri: String,
        fetch: Arc<dyn Fetch>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        opts: JsonMap<ByteString, Value>,
        middlewares: Vec<Arc<dyn BatchMiddleware>>,
        afterwares: Vec<Arc<dyn BatchAfterware>>,
    ) -> Self {
        Self {
            uri,
            opts,
            fetch,
            middlewares,
            afterwares,
        }
    }

    /// The URL batches are fetched from.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The user options merged over the defaults on every fetch.
    pub fn opts(&self) -> &Object {
        &self.opts
    }

    /// Appends middlewares, run in insertion order.
    pub fn use_middlewares(
        &mut self,
        middlewares: impl IntoIterator<Item = Arc<dyn BatchMiddleware>>,
    ) -> &mut Self {
        self.middlewares.extend(middlewares);
        self
    }

    /// Appends afterwares, run in insertion order.
    pub fn use_afterwares(
        &mut self,
        afterwares: impl IntoIterator<Item = Arc<dyn BatchAfterware>>,
    ) -> &mut Self {
        self.afterwares.extend(afterwares);
        self
    }

    async fn send(&self, requests: Vec<Request>) -> Result<Vec<Response>, MockError> {
        let mut options = default_options();
        deep_merge(&mut options, &self.opts);
        let mut batch = BatchRequest { requests, options };
        for middleware in &self.middlewares {
            middleware
                .apply_batch_middleware(&mut batch)
                .await
                .map_err(MockError::transport)?;
        }

        let BatchRequest {
            requests,
            mut options,
        } = batch;
        let printed: Vec<PrintedRequest> = requests.iter().map(print_request).collect();
        let body = serde_json::to_string(&printed).map_err(MockError::transport)?;
        options.insert("body", Value::String(body.into()));
        tracing::debug!(uri = %self.uri, size = requests.len(), "fetching batch");

        let response = self.fetch.fetch(&self.uri, &options)?.await?;
        let response = BatchResponse { response, options };
        for afterware in &self.afterwares {
            afterware
                .apply_batch_afterware(&response)
                .await
                .map_err(MockError::transport)?;
        }

        let results = match response.response.json().await {
            Value::Array(results) => results,
            body => {
                tracing::warn!(uri = %self.uri, "batched response was not an array");
                return Err(MockError::BatchResponseNotArray {
                    body: serde_json::to_string(&body).unwrap_or_default(),
                });
            }
        };
        if results.len() != requests.len() {
            return Err(MockError::BatchResponseLengthMismatch {
                expected: requests.len(),
                actual: results.len(),
            });
        }
        results
            .into_iter()
            .map(|result| {
                serde_json_bytes::from_value(result).map_err(|err| MockError::MalformedResponse {
                    reason: err.to_string(),
                })
            })
            .collect()
    }
}

impl NetworkInterface for HttpBatchedNetworkInterface {
    fn query(&self, request: Request) -> ResponseFuture {
        let batch = self.batch_query(vec![request]);
        async move {
            let mut responses = batch.await?;
            // the length was checked against the batch of one
            responses.pop().ok_or(MockError::BatchResponseLengthMismatch {
                expected: 1,
                actual: 0,
            })
        }
        .boxed()
    }
}

impl BatchedNetworkInterface for HttpBatchedNetworkInterface {
    fn batch_query(&self, requests: Vec<Request>) -> BatchFuture {
        let transport = self.clone();
        async move { transport.send(requests).await }.boxed()
    }
}
