//! Deterministic mock network interfaces for testing GraphQL clients.
//!
//! Tests register fixtures (an expected request and its canned outcome) up
//! front. The mocks match every incoming request by its
//! [`Fingerprint`](fingerprint::Fingerprint), serve the fixtures for it oldest
//! first and settle after the fixture's delay. Subscriptions only push results
//! when the test fires them.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod fingerprint;
pub mod fixtures;
pub mod graphql;
pub mod json_ext;
pub mod mocks;
pub mod observe;
pub mod transport;

pub use error::FixtureError;
pub use error::MockError;
pub use error::NetworkError;
pub use fixtures::Fixtures;
pub use mocks::MockedOutcome;
pub use mocks::batched::BatchedNetworkInterface;
pub use mocks::batched::MockBatchedNetworkInterface;
pub use mocks::batched::mock_batched_network_interface;
pub use mocks::fetch::Fetch;
pub use mocks::fetch::FetchResponse;
pub use mocks::fetch::MockFetch;
pub use mocks::fetch::MockedFetchResponse;
pub use mocks::fetch::create_mock_fetch;
pub use mocks::fetch::create_mocked_i_response;
pub use mocks::network::MockNetworkInterface;
pub use mocks::network::MockedRequest;
pub use mocks::network::MockedResponse;
pub use mocks::network::NetworkInterface;
pub use mocks::network::mock_network_interface;
pub use mocks::subscription::MockSubscriptionNetworkInterface;
pub use mocks::subscription::MockedSubscription;
pub use mocks::subscription::MockedSubscriptionResult;
pub use mocks::subscription::SubscriptionId;
pub use mocks::subscription::SubscriptionNetworkInterface;
pub use mocks::subscription::mock_subscription_network_interface;
pub use transport::HttpBatchedNetworkInterface;
