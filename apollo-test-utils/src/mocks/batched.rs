//! Mock batched network interface.

use std::task::Poll;

use futures::FutureExt;
use futures::future;
use futures::future::BoxFuture;
use tower::Service;

use super::network::MockNetworkInterface;
use super::network::MockedResponse;
use super::network::NetworkInterface;
use super::network::ResponseFuture;
use crate::error::MockError;
use crate::graphql::Request;
use crate::graphql::Response;

/// The future returned by [`BatchedNetworkInterface::batch_query`].
pub type BatchFuture = BoxFuture<'static, Result<Vec<Response>, MockError>>;

/// A network interface that can send several operations at once.
pub trait BatchedNetworkInterface: NetworkInterface {
    /// Sends `requests` together. Resolves with one response per request, in
    /// request order, or fails with the first error.
    fn batch_query(&self, requests: Vec<Request>) -> BatchFuture;
}

/// A batched network interface answering from registered fixtures.
///
/// Every member of a batch is matched on its own, exactly as
/// [`MockNetworkInterface::query`] would. A fixture consumed by a member stays
/// consumed even if a sibling fails.
#[derive(Clone, Default)]
pub struct MockBatchedNetworkInterface {
    network: MockNetworkInterface,
}

impl MockBatchedNetworkInterface {
    /// Creates an interface serving `mocked_responses`.
    pub fn new(mocked_responses: impl IntoIterator<Item = MockedResponse>) -> Self {
        Self {
            network: MockNetworkInterface::new(mocked_responses),
        }
    }

    /// Registers one more fixture.
    pub fn add_mocked_response(&self, mocked_response: MockedResponse) {
        self.network.add_mocked_response(mocked_response)
    }
}

impl NetworkInterface for MockBatchedNetworkInterface {
    fn query(&self, request: Request) -> ResponseFuture {
        self.network.query(request)
    }

    fn mutate(&self, request: Request) -> ResponseFuture {
        self.network.mutate(request)
    }
}

impl BatchedNetworkInterface for MockBatchedNetworkInterface {
    fn batch_query(&self, requests: Vec<Request>) -> BatchFuture {
        tracing::debug!(size = requests.len(), "mocking batch");
        // every member is consumed now, so a failing sibling rolls nothing back
        let members: Vec<ResponseFuture> = requests
            .into_iter()
            .map(|request| self.network.query(request))
            .collect();
        future::try_join_all(members).boxed()
    }
}

/// Builds a [`MockBatchedNetworkInterface`].
pub fn mock_batched_network_interface(
    mocked_responses: impl IntoIterator<Item = MockedResponse>,
) -> MockBatchedNetworkInterface {
    MockBatchedNetworkInterface::new(mocked_responses)
}

impl Service<Vec<Request>> for MockBatchedNetworkInterface {
    type Response = Vec<Response>;

    type Error = MockError;

    type Future = BatchFuture;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, requests: Vec<Request>) -> Self::Future {
        self.batch_query(requests)
    }
}
