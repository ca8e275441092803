//! Mock network interfaces.
//!
//! Every mock matches an incoming request against the fixtures registered for
//! its [`Fingerprint`](crate::fingerprint::Fingerprint), hands them out oldest
//! first, and settles after the fixture's delay.

pub mod batched;
pub mod fetch;
pub mod network;
pub(crate) mod queue;
pub mod subscription;

use std::time::Duration;

use crate::error::MockError;
use crate::error::NetworkError;
use crate::graphql::Response;

/// The canned outcome of a fixture: a response, or a network failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockedOutcome {
    /// The transport succeeds with this response. GraphQL errors, if any, travel inside it.
    Result(Response),
    /// The transport fails with this error.
    Error(NetworkError),
}

impl MockedOutcome {
    pub(crate) fn from_parts(
        result: Option<Response>,
        error: Option<NetworkError>,
    ) -> Result<Self, String> {
        match (result, error) {
            (Some(result), None) => Ok(MockedOutcome::Result(result)),
            (None, Some(error)) => Ok(MockedOutcome::Error(error)),
            (Some(_), Some(_)) => Err("a mock carries either `result` or `error`, not both".into()),
            (None, None) => Err("a mock needs either a `result` or an `error`".into()),
        }
    }

    pub(crate) fn into_parts(self) -> (Option<Response>, Option<NetworkError>) {
        match self {
            MockedOutcome::Result(result) => (Some(result), None),
            MockedOutcome::Error(error) => (None, Some(error)),
        }
    }

    pub(crate) fn into_result(self) -> Result<Response, MockError> {
        match self {
            MockedOutcome::Result(result) => Ok(result),
            MockedOutcome::Error(error) => Err(MockError::Network(error)),
        }
    }
}

pub(crate) async fn wait_for(delay: Duration) {
    if !delay.is_zero() {
        tracing::trace!(?delay, "delaying mocked delivery");
        tokio::time::sleep(delay).await;
    }
}

/// Fixture delays are whole milliseconds on the wire.
pub(crate) mod delay_millis {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Serialize;

    pub(crate) fn serialize<S: serde::Serializer>(
        delay: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        u64::try_from(delay.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
