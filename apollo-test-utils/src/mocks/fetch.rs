//! Mock HTTP fetch.
//!
//! Matches raw `(url, options)` pairs instead of parsed GraphQL. An unmatched
//! call fails before any future is returned, so callers can assert on the
//! error without awaiting anything.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use super::delay_millis;
use super::queue::QueueMiss;
use super::queue::ResponseQueue;
use super::wait_for;
use crate::error::MockError;
use crate::fingerprint::Fingerprint;
use crate::json_ext::Object;
use crate::json_ext::OtherJsonMap;
use crate::json_ext::Value;

/// The future returned by a successful [`Fetch::fetch`] call.
pub type FetchFuture = BoxFuture<'static, Result<FetchResponse, MockError>>;

/// An HTTP fetch function.
///
/// The batching transport takes one of these instead of reaching for a global.
/// Any `Fn(&str, &Object) -> Result<FetchFuture, MockError>` closure is a
/// `Fetch`.
pub trait Fetch: Send + Sync {
    /// Issues a request to `url`. `options` holds the method, headers and body.
    fn fetch(&self, url: &str, options: &Object) -> Result<FetchFuture, MockError>;
}

impl<F> Fetch for F
where
    F: Fn(&str, &Object) -> Result<FetchFuture, MockError> + Send + Sync,
{
    fn fetch(&self, url: &str, options: &Object) -> Result<FetchFuture, MockError> {
        self(url, options)
    }
}

/// An HTTP response whose body is JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FetchResponse {
    #[schemars(with = "serde_json::Value")]
    body: Value,
}

impl FetchResponse {
    /// A response with the given JSON body.
    pub fn new(body: impl Into<Value>) -> Self {
        Self { body: body.into() }
    }

    /// Reads the body.
    pub async fn json(&self) -> Value {
        self.body.clone()
    }

    /// The body, without awaiting.
    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// Builds a [`FetchResponse`] whose `json()` resolves to `body`.
pub fn create_mocked_i_response(body: impl Into<Value>) -> FetchResponse {
    FetchResponse::new(body)
}

/// A fetch fixture.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MockedFetchResponse {
    /// The expected URL.
    pub url: String,

    /// The expected request options.
    #[serde(default)]
    #[schemars(with = "OtherJsonMap")]
    pub opts: Object,

    /// The response handed back.
    pub result: FetchResponse,

    /// How long to wait before resolving, in milliseconds on the wire.
    #[serde(default, with = "delay_millis", skip_serializing_if = "Duration::is_zero")]
    #[schemars(with = "u64")]
    pub delay: Duration,
}

impl MockedFetchResponse {
    /// A fixture answering `url` called with `opts`.
    pub fn new(url: impl Into<String>, opts: Object, result: FetchResponse) -> Self {
        Self {
            url: url.into(),
            opts,
            result,
            delay: Duration::ZERO,
        }
    }

    /// Resolves only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The key calls are matched by.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::for_fetch(&self.url, &self.opts)
    }
}

/// A [`Fetch`] answering from registered fixtures.
///
/// Clones share the same fixtures.
#[derive(Clone, Default)]
pub struct MockFetch {
    mocked_responses_by_key: Arc<Mutex<ResponseQueue<MockedFetchResponse>>>,
}

impl MockFetch {
    /// Creates a fetch serving `mocked_responses`.
    pub fn new(mocked_responses: impl IntoIterator<Item = MockedFetchResponse>) -> Self {
        let fetch = Self::default();
        for mocked_response in mocked_responses {
            fetch.add_mocked_fetch_response(mocked_response);
        }
        fetch
    }

    /// Registers one more fixture.
    pub fn add_mocked_fetch_response(&self, mocked_response: MockedFetchResponse) {
        let fingerprint = mocked_response.fingerprint();
        tracing::debug!(%fingerprint, "registering mocked fetch response");
        self.mocked_responses_by_key
            .lock()
            .register(fingerprint, mocked_response);
    }

    /// How many fixtures are still pending for `url` called with `opts`.
    pub fn pending_responses(&self, url: &str, opts: &Object) -> usize {
        self.mocked_responses_by_key
            .lock()
            .pending(&Fingerprint::for_fetch(url, opts))
    }
}

impl Fetch for MockFetch {
    fn fetch(&self, url: &str, options: &Object) -> Result<FetchFuture, MockError> {
        let fingerprint = Fingerprint::for_fetch(url, options);
        let consumed = self.mocked_responses_by_key.lock().consume(&fingerprint);
        let MockedFetchResponse { result, delay, .. } = match consumed {
            Ok(mocked_response) => mocked_response,
            Err(QueueMiss::Unknown) => {
                tracing::warn!(%fingerprint, "no mocked fetch response registered");
                return Err(MockError::NoMatchingMock {
                    request: fingerprint.to_string(),
                });
            }
            Err(QueueMiss::Exhausted) => {
                tracing::warn!(%fingerprint, "no more mocked fetch responses");
                return Err(MockError::NoMoreMockedResponses {
                    request: fingerprint.to_string(),
                });
            }
        };
        tracing::debug!(%fingerprint, "consumed mocked fetch response");
        Ok(async move {
            wait_for(delay).await;
            Ok(result)
        }
        .boxed())
    }
}

/// Builds a [`MockFetch`].
pub fn create_mock_fetch(
    mocked_responses: impl IntoIterator<Item = MockedFetchResponse>,
) -> MockFetch {
    MockFetch::new(mocked_responses)
}
