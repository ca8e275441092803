//! Mock query/mutate network interface.

use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use futures::FutureExt;
use futures::future;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use tower::Service;

use super::MockedOutcome;
use super::delay_millis;
use super::queue::QueueMiss;
use super::queue::ResponseQueue;
use super::wait_for;
use crate::error::MockError;
use crate::error::NetworkError;
use crate::fingerprint::Fingerprint;
use crate::graphql::Document;
use crate::graphql::OperationKind;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::OtherJsonMap;

/// The future returned by [`NetworkInterface`] calls.
pub type ResponseFuture = BoxFuture<'static, Result<Response, MockError>>;

/// The network interface contract of the client under test.
///
/// Matching happens when the method is called; the returned future only waits
/// out the delay and yields the outcome.
pub trait NetworkInterface: Send + Sync {
    /// Sends a query.
    fn query(&self, request: Request) -> ResponseFuture;

    /// Sends a mutation. Mutations are matched exactly like queries.
    fn mutate(&self, request: Request) -> ResponseFuture {
        self.query(request)
    }
}

/// The request half of a fixture.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MockedRequest {
    /// The expected document. Fixtures for mutations may name this `mutation`.
    #[serde(alias = "mutation")]
    pub query: Document,

    /// The expected variables.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    #[schemars(with = "OtherJsonMap")]
    pub variables: Object,

    /// A label used only for diagnostics. It does not take part in matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_name: Option<String>,
}

impl MockedRequest {
    /// Expects `query` with no variables.
    pub fn new(query: Document) -> Self {
        Self {
            query,
            variables: Object::new(),
            debug_name: None,
        }
    }

    /// Expects these variables.
    pub fn with_variables(mut self, variables: Object) -> Self {
        self.variables = variables;
        self
    }

    /// Labels the fixture for diagnostics.
    pub fn with_debug_name(mut self, debug_name: impl Into<String>) -> Self {
        self.debug_name = Some(debug_name.into());
        self
    }

    /// The key incoming requests are matched by.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::for_request(&self.query, &self.variables)
    }
}

impl From<&Request> for MockedRequest {
    fn from(request: &Request) -> Self {
        Self {
            query: request.document.clone(),
            variables: request.variables.clone(),
            debug_name: request.debug_name.clone(),
        }
    }
}

/// A fixture: an expected request and its canned outcome.
///
/// On the wire this is `{ request, result?, error?, delay? }` where exactly one
/// of `result` and `error` is present and `delay` is in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMockedResponse", into = "RawMockedResponse")]
pub struct MockedResponse {
    /// The expected request.
    pub request: MockedRequest,
    /// What the request resolves to.
    pub outcome: MockedOutcome,
    /// How long to wait before settling.
    pub delay: Duration,
}

impl MockedResponse {
    /// A fixture resolving `request` to `result`.
    pub fn result(request: MockedRequest, result: Response) -> Self {
        Self {
            request,
            outcome: MockedOutcome::Result(result),
            delay: Duration::ZERO,
        }
    }

    /// A fixture failing `request` with a network error.
    pub fn error(request: MockedRequest, error: NetworkError) -> Self {
        Self {
            request,
            outcome: MockedOutcome::Error(error),
            delay: Duration::ZERO,
        }
    }

    /// Settles only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[schemars(rename = "MockedResponse")]
struct RawMockedResponse {
    request: MockedRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Response>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<NetworkError>,
    #[serde(default, with = "delay_millis", skip_serializing_if = "Duration::is_zero")]
    #[schemars(with = "u64")]
    delay: Duration,
}

impl TryFrom<RawMockedResponse> for MockedResponse {
    type Error = String;

    fn try_from(raw: RawMockedResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            request: raw.request,
            outcome: MockedOutcome::from_parts(raw.result, raw.error)?,
            delay: raw.delay,
        })
    }
}

impl From<MockedResponse> for RawMockedResponse {
    fn from(mocked: MockedResponse) -> Self {
        let (result, error) = mocked.outcome.into_parts();
        Self {
            request: mocked.request,
            result,
            error,
            delay: mocked.delay,
        }
    }
}

impl JsonSchema for MockedResponse {
    fn schema_name() -> String {
        RawMockedResponse::schema_name()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        RawMockedResponse::json_schema(generator)
    }
}

/// A network interface answering from registered fixtures.
///
/// Clones share the same fixtures.
#[derive(Clone, Default)]
pub struct MockNetworkInterface {
    // using an arc so that clones handed to the client consume from the same queue
    mocked_responses_by_key: Arc<Mutex<ResponseQueue<MockedResponse>>>,
}

impl MockNetworkInterface {
    /// Creates an interface serving `mocked_responses`.
    pub fn new(mocked_responses: impl IntoIterator<Item = MockedResponse>) -> Self {
        let interface = Self::default();
        for mocked_response in mocked_responses {
            interface.add_mocked_response(mocked_response);
        }
        interface
    }

    /// Registers one more fixture, behind any already registered for the same request.
    pub fn add_mocked_response(&self, mocked_response: MockedResponse) {
        let fingerprint = mocked_response.request.fingerprint();
        tracing::debug!(%fingerprint, "registering mocked response");
        self.mocked_responses_by_key
            .lock()
            .register(fingerprint, mocked_response);
    }

    /// How many fixtures are still pending for `request`.
    pub fn pending_responses(&self, request: &MockedRequest) -> usize {
        self.mocked_responses_by_key
            .lock()
            .pending(&request.fingerprint())
    }

    /// Takes the next fixture for `request`, or explains why there is none.
    pub(crate) fn consume(&self, request: &Request) -> Result<MockedResponse, MockError> {
        let fingerprint = request.fingerprint();
        let consumed = self.mocked_responses_by_key.lock().consume(&fingerprint);
        match consumed {
            Ok(mocked_response) => {
                tracing::debug!(
                    %fingerprint,
                    debug_name = request.debug_name.as_deref(),
                    "consumed mocked response"
                );
                Ok(mocked_response)
            }
            Err(QueueMiss::Unknown) => {
                tracing::warn!(%fingerprint, "no mocked response registered for request");
                Err(MockError::NoMatchingMock {
                    request: request.to_string(),
                })
            }
            Err(QueueMiss::Exhausted) => {
                tracing::warn!(%fingerprint, "no more mocked responses for request");
                Err(MockError::NoMoreMockedResponses {
                    request: request.to_string(),
                })
            }
        }
    }
}

impl NetworkInterface for MockNetworkInterface {
    fn query(&self, request: Request) -> ResponseFuture {
        match self.consume(&request) {
            Ok(MockedResponse { outcome, delay, .. }) => async move {
                wait_for(delay).await;
                outcome.into_result()
            }
            .boxed(),
            Err(error) => future::ready(Err(error)).boxed(),
        }
    }
}

/// Builds a [`MockNetworkInterface`].
pub fn mock_network_interface(
    mocked_responses: impl IntoIterator<Item = MockedResponse>,
) -> MockNetworkInterface {
    MockNetworkInterface::new(mocked_responses)
}

impl Service<Request> for MockNetworkInterface {
    type Response = Response;

    type Error = MockError;

    type Future = ResponseFuture;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        match request.kind {
            OperationKind::Mutation => self.mutate(request),
            OperationKind::Query | OperationKind::Subscription => self.query(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;
    use test_log::test;
    use tokio::time::Instant;
    use tower::ServiceExt;

    use super::*;
    use crate::graphql::Error;
    use crate::json_ext::Value;

    const HERO_QUERY: &str = "query Hero($id: Int) { hero(id: $id) { name } }";
    const ADD_PERSON: &str = "mutation AddPerson($name: String) { addPerson(name: $name) { id } }";

    fn object(value: Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    fn mocked_request(source: &str, variables: Value) -> MockedRequest {
        MockedRequest::new(Document::parse(source).unwrap()).with_variables(object(variables))
    }

    fn request(source: &str, variables: Value) -> Request {
        Request::builder()
            .document(Document::parse(source).unwrap())
            .variables(object(variables))
            .build()
    }

    #[test(tokio::test)]
    async fn resolves_once_then_runs_out() {
        let network = mock_network_interface([MockedResponse::result(
            mocked_request(HERO_QUERY, json!({"id": 1})),
            Response::from_data(json!({"name": "Luke"})),
        )]);

        let response = network
            .query(request(HERO_QUERY, json!({"id": 1})))
            .await
            .unwrap();
        assert_eq!(response, Response::from_data(json!({"name": "Luke"})));

        let error = network
            .query(request(HERO_QUERY, json!({"id": 1})))
            .await
            .unwrap_err();
        assert!(matches!(error, MockError::NoMoreMockedResponses { .. }));
    }

    #[test(tokio::test)]
    async fn unknown_requests_are_rejected() {
        let network = mock_network_interface([MockedResponse::result(
            mocked_request(HERO_QUERY, json!({"id": 1})),
            Response::from_data(json!({"name": "Luke"})),
        )]);

        let error = network
            .query(request(HERO_QUERY, json!({"id": 2})))
            .await
            .unwrap_err();
        match error {
            MockError::NoMatchingMock { request } => assert!(request.contains(r#""id":2"#)),
            other => panic!("unexpected error: {other}"),
        }
        // the registered fixture is untouched
        assert_eq!(
            network.pending_responses(&mocked_request(HERO_QUERY, json!({"id": 1}))),
            1
        );
    }

    #[test(tokio::test)]
    async fn same_request_is_answered_in_registration_order() {
        let fixtures = (1..=3).map(|n| {
            MockedResponse::result(
                mocked_request(HERO_QUERY, json!({"id": 1})),
                Response::from_data(json!({"n": n})),
            )
        });
        let network = mock_network_interface(fixtures);

        for n in 1..=3 {
            let response = network
                .query(request(HERO_QUERY, json!({"id": 1})))
                .await
                .unwrap();
            assert_eq!(response.data, Some(json!({"n": n})));
        }
        assert!(matches!(
            network.query(request(HERO_QUERY, json!({"id": 1}))).await,
            Err(MockError::NoMoreMockedResponses { .. })
        ));
    }

    #[test(tokio::test)]
    async fn variable_order_does_not_matter() {
        let network = mock_network_interface([MockedResponse::result(
            mocked_request(HERO_QUERY, json!({"a": 1, "b": 2})),
            Response::from_data(json!({"ok": true})),
        )]);

        let response = network
            .query(request(HERO_QUERY, json!({"b": 2, "a": 1})))
            .await
            .unwrap();
        assert_eq!(response.data, Some(json!({"ok": true})));
    }

    #[test(tokio::test)]
    async fn empty_errors_resolve_as_plain_data() {
        let result: Response = serde_json::from_value(serde_json::json!({
            "data": { "allPeople": { "people": { "name": "Ada Lovelace" } } },
            "errors": []
        }))
        .unwrap();
        let network = mock_network_interface([MockedResponse::result(
            mocked_request("{ allPeople { people { name } } }", json!({})),
            result,
        )]);

        let response = network
            .query(request("{ allPeople { people { name } } }", json!({})))
            .await
            .unwrap();
        assert!(response.errors.is_empty());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "data": { "allPeople": { "people": { "name": "Ada Lovelace" } } } })
        );
    }

    #[test(tokio::test)]
    async fn graphql_errors_are_passed_through() {
        let result = Response::builder()
            .error(Error::builder().message("Forbidden").build())
            .build();
        let network = mock_network_interface([MockedResponse::result(
            mocked_request(HERO_QUERY, json!({})),
            result.clone(),
        )]);

        let response = network.query(request(HERO_QUERY, json!({}))).await.unwrap();
        assert_eq!(response, result);
    }

    #[test(tokio::test(start_paused = true))]
    async fn network_errors_reject_after_the_delay() {
        let network = mock_network_interface([MockedResponse::error(
            mocked_request(HERO_QUERY, json!({})),
            NetworkError::new("Network error"),
        )
        .with_delay(Duration::from_millis(30))]);

        let started = Instant::now();
        let error = network
            .query(request(HERO_QUERY, json!({})))
            .await
            .unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(30));
        match error {
            MockError::Network(error) => assert_eq!(error, NetworkError::new("Network error")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test(tokio::test(start_paused = true))]
    async fn different_requests_settle_in_delay_order() {
        let network = mock_network_interface([
            MockedResponse::result(
                mocked_request(HERO_QUERY, json!({"id": 1})),
                Response::from_data(json!("slow")),
            )
            .with_delay(Duration::from_millis(20)),
            MockedResponse::result(
                mocked_request(HERO_QUERY, json!({"id": 2})),
                Response::from_data(json!("fast")),
            )
            .with_delay(Duration::from_millis(5)),
        ]);

        let order = Arc::new(Mutex::new(Vec::new()));
        let slow = network.query(request(HERO_QUERY, json!({"id": 1})));
        let fast = network.query(request(HERO_QUERY, json!({"id": 2})));
        let record = |future: ResponseFuture| {
            let order = order.clone();
            async move {
                let response = future.await.unwrap();
                order.lock().push(response.data.unwrap());
            }
        };
        futures::join!(record(slow), record(fast));

        assert_eq!(*order.lock(), vec![json!("fast"), json!("slow")]);
    }

    #[test(tokio::test(start_paused = true))]
    async fn same_request_is_assigned_in_registration_order_whatever_the_delay() {
        let network = mock_network_interface([
            MockedResponse::result(
                mocked_request(HERO_QUERY, json!({})),
                Response::from_data(json!("first")),
            )
            .with_delay(Duration::from_millis(20)),
            MockedResponse::result(
                mocked_request(HERO_QUERY, json!({})),
                Response::from_data(json!("second")),
            )
            .with_delay(Duration::from_millis(5)),
        ]);

        let first = network.query(request(HERO_QUERY, json!({})));
        let second = network.query(request(HERO_QUERY, json!({})));
        let (first, second) = futures::join!(first, second);
        assert_eq!(first.unwrap().data, Some(json!("first")));
        assert_eq!(second.unwrap().data, Some(json!("second")));
    }

    #[test(tokio::test)]
    async fn mutate_matches_like_query() {
        let network = mock_network_interface([
            MockedResponse::result(
                mocked_request(ADD_PERSON, json!({"name": "Ada"})),
                Response::from_data(json!({"addPerson": {"id": "1"}})),
            ),
            MockedResponse::result(
                mocked_request(ADD_PERSON, json!({"name": "Ada"})),
                Response::from_data(json!({"addPerson": {"id": "2"}})),
            ),
        ]);
        let mutation: Request = serde_json::from_value(serde_json::json!({
            "mutation": ADD_PERSON,
            "variables": {"name": "Ada"},
        }))
        .unwrap();
        assert_eq!(mutation.kind, OperationKind::Mutation);

        let response = network.mutate(mutation.clone()).await.unwrap();
        assert_eq!(response.data, Some(json!({"addPerson": {"id": "1"}})));
        let response = network.query(mutation).await.unwrap();
        assert_eq!(response.data, Some(json!({"addPerson": {"id": "2"}})));
    }

    #[test(tokio::test)]
    async fn consumption_happens_at_call_time() {
        let network = mock_network_interface([MockedResponse::result(
            mocked_request(HERO_QUERY, json!({})),
            Response::from_data(json!("only")),
        )]);

        let pending = network.query(request(HERO_QUERY, json!({})));
        assert_eq!(
            network.pending_responses(&mocked_request(HERO_QUERY, json!({}))),
            0
        );
        assert_eq!(pending.await.unwrap().data, Some(json!("only")));
    }

    #[test(tokio::test)]
    async fn works_as_a_tower_service() {
        let network = MockNetworkInterface::default();
        network.add_mocked_response(MockedResponse::result(
            mocked_request(HERO_QUERY, json!({"id": 1})),
            Response::from_data(json!({"name": "Luke"})),
        ));

        let response = network
            .clone()
            .oneshot(request(HERO_QUERY, json!({"id": 1})))
            .await
            .unwrap();
        assert_eq!(response.data, Some(json!({"name": "Luke"})));
        // the clone consumed from the shared queue
        assert!(network.query(request(HERO_QUERY, json!({"id": 1}))).await.is_err());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn missing_mocks_are_logged() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .without_time()
            .with_max_level(tracing::Level::WARN)
            .finish();
        let network = MockNetworkInterface::default();
        tracing::subscriber::with_default(subscriber, || {
            // the miss is decided at call time, the future is never polled
            let _ = network.query(request(HERO_QUERY, json!({"id": 1})));
        });

        let logs = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(logs.contains("WARN"), "{logs}");
        assert!(
            logs.contains("no mocked response registered for request"),
            "{logs}"
        );
    }

    #[test]
    fn fixture_wire_format() {
        let mocked: MockedResponse = serde_json::from_value(serde_json::json!({
            "request": {
                "query": HERO_QUERY,
                "variables": {"id": 1},
                "debugName": "hero"
            },
            "result": {"data": {"hero": {"name": "Luke"}}},
            "delay": 15
        }))
        .unwrap();
        assert_eq!(mocked.delay, Duration::from_millis(15));
        assert_eq!(mocked.request.debug_name.as_deref(), Some("hero"));
        assert_eq!(
            mocked.outcome,
            MockedOutcome::Result(Response::from_data(json!({"hero": {"name": "Luke"}})))
        );

        let errored: MockedResponse = serde_json::from_value(serde_json::json!({
            "request": {"mutation": ADD_PERSON},
            "error": {"message": "Network error"}
        }))
        .unwrap();
        assert_eq!(
            errored.outcome,
            MockedOutcome::Error(NetworkError::new("Network error"))
        );
        assert_eq!(errored.delay, Duration::ZERO);

        assert!(
            serde_json::from_value::<MockedResponse>(serde_json::json!({
                "request": {"query": HERO_QUERY}
            }))
            .is_err()
        );
        assert!(
            serde_json::from_value::<MockedResponse>(serde_json::json!({
                "request": {"query": HERO_QUERY},
                "result": {"data": null},
                "error": {"message": "both"}
            }))
            .is_err()
        );
    }
}
