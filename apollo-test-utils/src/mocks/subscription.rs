//! Mock subscription network interface.
//!
//! Subscriptions are registered up front with a list of results. Nothing is
//! pushed to a subscriber until the test calls
//! [`MockSubscriptionNetworkInterface::fire_result`] for its id.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower::Service;

use super::MockedOutcome;
use super::delay_millis;
use super::wait_for;
use super::network::MockNetworkInterface;
use super::network::MockedRequest;
use super::network::MockedResponse;
use super::network::NetworkInterface;
use super::network::ResponseFuture;
use crate::error::MockError;
use crate::error::NetworkError;
use crate::fingerprint::Fingerprint;
use crate::graphql::Request;
use crate::graphql::Response;

/// Identifies an active subscription.
///
/// Ids are handed out by [`SubscriptionNetworkInterface::subscribe`] from a
/// counter starting at 0 and are never reused by the same interface.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// The raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for SubscriptionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receives every result fired at a subscription, each after its own delay.
pub type SubscriptionHandler = Box<dyn Fn(Result<Response, MockError>) + Send + Sync + 'static>;

type SharedHandler = Arc<dyn Fn(Result<Response, MockError>) + Send + Sync + 'static>;

/// The results of a subscription as a stream; see
/// [`MockSubscriptionNetworkInterface::subscribe_stream`].
pub type SubscriptionStream = UnboundedReceiverStream<Result<Response, MockError>>;

/// The subscription contract of the client under test.
pub trait SubscriptionNetworkInterface: NetworkInterface {
    /// Starts a subscription. `handler` is invoked once per pushed result.
    fn subscribe(
        &self,
        request: Request,
        handler: SubscriptionHandler,
    ) -> Result<SubscriptionId, MockError>;

    /// Stops a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// One result pushed to a subscriber.
///
/// On the wire this is `{ result?, error?, delay? }` with exactly one of
/// `result` and `error`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "RawMockedSubscriptionResult",
    into = "RawMockedSubscriptionResult"
)]
pub struct MockedSubscriptionResult {
    /// What the subscriber receives.
    pub outcome: MockedOutcome,
    /// How long after firing the subscriber receives it.
    pub delay: Duration,
}

impl MockedSubscriptionResult {
    /// Pushes `result`.
    pub fn result(result: Response) -> Self {
        Self {
            outcome: MockedOutcome::Result(result),
            delay: Duration::ZERO,
        }
    }

    /// Pushes a network error.
    pub fn error(error: NetworkError) -> Self {
        Self {
            outcome: MockedOutcome::Error(error),
            delay: Duration::ZERO,
        }
    }

    /// Delivers only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(rename = "MockedSubscriptionResult")]
struct RawMockedSubscriptionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Response>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<NetworkError>,
    #[serde(default, with = "delay_millis", skip_serializing_if = "Duration::is_zero")]
    #[schemars(with = "u64")]
    delay: Duration,
}

impl TryFrom<RawMockedSubscriptionResult> for MockedSubscriptionResult {
    type Error = String;

    fn try_from(raw: RawMockedSubscriptionResult) -> Result<Self, Self::Error> {
        Ok(Self {
            outcome: MockedOutcome::from_parts(raw.result, raw.error)?,
            delay: raw.delay,
        })
    }
}

impl From<MockedSubscriptionResult> for RawMockedSubscriptionResult {
    fn from(mocked: MockedSubscriptionResult) -> Self {
        let (result, error) = mocked.outcome.into_parts();
        Self {
            result,
            error,
            delay: mocked.delay,
        }
    }
}

impl JsonSchema for MockedSubscriptionResult {
    fn schema_name() -> String {
        RawMockedSubscriptionResult::schema_name()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        RawMockedSubscriptionResult::json_schema(generator)
    }
}

/// A subscription fixture: the expected request and the results still to push.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MockedSubscription {
    /// The expected subscription request.
    pub request: MockedRequest,
    /// Pending results, oldest first.
    #[serde(default)]
    pub results: VecDeque<MockedSubscriptionResult>,
}

impl MockedSubscription {
    /// A subscription to `request` pushing `results` in order.
    pub fn new(
        request: MockedRequest,
        results: impl IntoIterator<Item = MockedSubscriptionResult>,
    ) -> Self {
        Self {
            request,
            results: results.into_iter().collect(),
        }
    }
}

struct ActiveSubscription {
    index: usize,
    handler: SharedHandler,
}

#[derive(Default)]
struct Registry {
    subscriptions: Vec<MockedSubscription>,
    by_key: HashMap<Fingerprint, Vec<usize>>,
    active: HashMap<SubscriptionId, ActiveSubscription>,
    next_id: u64,
}

impl Registry {
    /// The first registration for `fingerprint` nobody is subscribed to yet,
    /// falling back to the first one.
    fn pick(&self, fingerprint: &Fingerprint) -> Option<usize> {
        let candidates = self.by_key.get(fingerprint)?;
        candidates
            .iter()
            .copied()
            .find(|index| !self.active.values().any(|active| active.index == *index))
            .or_else(|| candidates.first().copied())
    }

    fn allocate_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// A network interface serving subscriptions from registered fixtures, and
/// queries and mutations like [`MockNetworkInterface`].
///
/// Clones share the same fixtures and active subscriptions.
#[derive(Clone, Default)]
pub struct MockSubscriptionNetworkInterface {
    network: MockNetworkInterface,
    registry: Arc<Mutex<Registry>>,
}

impl MockSubscriptionNetworkInterface {
    /// Creates an interface serving `mocked_subscriptions` and `mocked_responses`.
    pub fn new(
        mocked_subscriptions: impl IntoIterator<Item = MockedSubscription>,
        mocked_responses: impl IntoIterator<Item = MockedResponse>,
    ) -> Self {
        let interface = Self {
            network: MockNetworkInterface::new(mocked_responses),
            registry: Default::default(),
        };
        for mocked_subscription in mocked_subscriptions {
            interface.add_mocked_subscription(mocked_subscription);
        }
        interface
    }

    /// Registers one more subscription fixture.
    pub fn add_mocked_subscription(&self, mocked_subscription: MockedSubscription) {
        let fingerprint = mocked_subscription.request.fingerprint();
        tracing::debug!(
            %fingerprint,
            results = mocked_subscription.results.len(),
            "registering mocked subscription"
        );
        let mut registry = self.registry.lock();
        let index = registry.subscriptions.len();
        registry.subscriptions.push(mocked_subscription);
        registry.by_key.entry(fingerprint).or_default().push(index);
    }

    /// Registers one more query or mutation fixture.
    pub fn add_mocked_response(&self, mocked_response: MockedResponse) {
        self.network.add_mocked_response(mocked_response)
    }

    /// Pushes the next pending result of subscription `id` to its handler.
    ///
    /// The handler runs after the result's own delay, on a task of the
    /// current runtime. A later fire with a shorter delay is delivered first.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn fire_result(&self, id: SubscriptionId) -> Result<(), MockError> {
        let (handler, next) = {
            let mut registry = self.registry.lock();
            let Registry {
                subscriptions,
                active,
                ..
            } = &mut *registry;
            let active = active
                .get(&id)
                .ok_or(MockError::UnknownSubscriptionId { id })?;
            let next = subscriptions[active.index]
                .results
                .pop_front()
                .ok_or(MockError::SubscriptionResultsExhausted { id })?;
            (active.handler.clone(), next)
        };

        tracing::debug!(%id, delay = ?next.delay, "firing mocked subscription result");
        tokio::spawn(async move {
            wait_for(next.delay).await;
            handler(next.outcome.into_result());
        });
        Ok(())
    }

    /// Starts a subscription whose results are yielded by a stream.
    ///
    /// The stream ends once the subscription is stopped and every result fired
    /// before that was delivered.
    pub fn subscribe_stream(
        &self,
        request: Request,
    ) -> Result<(SubscriptionId, SubscriptionStream), MockError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.subscribe(
            request,
            Box::new(move |result: Result<Response, MockError>| {
                // the stream may have been dropped already
                let _ = sender.send(result);
            }),
        )?;
        Ok((id, UnboundedReceiverStream::new(receiver)))
    }

    /// Every registered subscription grouped by fingerprint, with the results
    /// still pending.
    pub fn mocked_subscriptions_by_key(&self) -> HashMap<Fingerprint, Vec<MockedSubscription>> {
        let registry = self.registry.lock();
        registry
            .by_key
            .iter()
            .map(|(fingerprint, indexes)| {
                let subscriptions = indexes
                    .iter()
                    .map(|index| registry.subscriptions[*index].clone())
                    .collect();
                (fingerprint.clone(), subscriptions)
            })
            .collect()
    }

    /// The subscriptions currently active, by id.
    pub fn mocked_subscriptions_by_id(&self) -> HashMap<SubscriptionId, MockedSubscription> {
        let registry = self.registry.lock();
        registry
            .active
            .iter()
            .map(|(id, active)| (*id, registry.subscriptions[active.index].clone()))
            .collect()
    }
}

impl NetworkInterface for MockSubscriptionNetworkInterface {
    fn query(&self, request: Request) -> ResponseFuture {
        self.network.query(request)
    }

    fn mutate(&self, request: Request) -> ResponseFuture {
        self.network.mutate(request)
    }
}

impl SubscriptionNetworkInterface for MockSubscriptionNetworkInterface {
    fn subscribe(
        &self,
        request: Request,
        handler: SubscriptionHandler,
    ) -> Result<SubscriptionId, MockError> {
        let fingerprint = request.fingerprint();
        let mut registry = self.registry.lock();
        let Some(index) = registry.pick(&fingerprint) else {
            tracing::warn!(%fingerprint, "no mocked subscription registered for request");
            return Err(MockError::NoMatchingSubscription {
                request: request.to_string(),
            });
        };
        let id = registry.allocate_id();
        registry.active.insert(
            id,
            ActiveSubscription {
                index,
                handler: Arc::from(handler),
            },
        );
        tracing::debug!(%fingerprint, %id, "subscribed");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        // results already fired keep their own handle on the handler
        match self.registry.lock().active.remove(&id) {
            Some(_) => tracing::debug!(%id, "unsubscribed"),
            None => tracing::debug!(%id, "unsubscribing an id that is not active"),
        }
    }
}

/// Builds a [`MockSubscriptionNetworkInterface`].
pub fn mock_subscription_network_interface(
    mocked_subscriptions: impl IntoIterator<Item = MockedSubscription>,
    mocked_responses: impl IntoIterator<Item = MockedResponse>,
) -> MockSubscriptionNetworkInterface {
    MockSubscriptionNetworkInterface::new(mocked_subscriptions, mocked_responses)
}

impl Service<Request> for MockSubscriptionNetworkInterface {
    type Response = Response;

    type Error = MockError;

    type Future = ResponseFuture;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.network.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.network.call(request)
    }
}
