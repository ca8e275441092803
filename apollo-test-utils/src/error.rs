//! Mock network errors.
use std::sync::Arc;

use displaydoc::Display;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tower::BoxError;

use crate::json_ext::Object;
use crate::json_ext::OtherJsonMap;
use crate::mocks::subscription::SubscriptionId;

/// Errors produced by the mock network interfaces.
///
/// Matching failures are test-authoring mistakes (a fixture is missing or was
/// consumed too many times). Simulated failures are carried unmodified so that
/// a test sees exactly the error it registered.
#[derive(Error, Display, Debug, Clone)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum MockError {
    /// no mocked response registered for request: {request}
    NoMatchingMock {
        /// The offending request, as JSON.
        request: String,
    },

    /// no more mocked responses for request: {request}
    NoMoreMockedResponses {
        /// The offending request, as JSON.
        request: String,
    },

    /// batched response was not an array: {body}
    BatchResponseNotArray {
        /// The response body that was received instead.
        body: String,
    },

    /// batched response contained {actual} results for {expected} requests
    BatchResponseLengthMismatch {
        /// Number of requests in the batch.
        expected: usize,
        /// Number of results in the response body.
        actual: usize,
    },

    /// no mocked subscription registered for request: {request}
    NoMatchingSubscription {
        /// The offending request, as JSON.
        request: String,
    },

    /// no active subscription with id {id}
    UnknownSubscriptionId {
        /// The id passed to `fire_result`.
        id: SubscriptionId,
    },

    /// no more mocked results for subscription {id}
    SubscriptionResultsExhausted {
        /// The subscription that ran out of results.
        id: SubscriptionId,
    },

    /// invalid GraphQL document: {reason}
    InvalidDocument {
        /// Parser diagnostics.
        reason: String,
    },

    /// response was malformed: {reason}
    MalformedResponse {
        /// The reason the response could not be read.
        reason: String,
    },

    /// {0}
    ///
    /// A simulated network failure, exactly as registered.
    Network(NetworkError),

    /// {0}
    ///
    /// A failure raised by a fetch implementation, middleware or afterware.
    Transport(Arc<BoxError>),
}

impl MockError {
    /// Wraps an arbitrary transport failure.
    pub fn transport(error: impl Into<BoxError>) -> Self {
        MockError::Transport(Arc::new(error.into()))
    }

    /// A stable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            MockError::NoMatchingMock { .. } => "NO_MATCHING_MOCK",
            MockError::NoMoreMockedResponses { .. } => "NO_MORE_MOCKED_RESPONSES",
            MockError::BatchResponseNotArray { .. } => "BATCH_RESPONSE_NOT_ARRAY",
            MockError::BatchResponseLengthMismatch { .. } => "BATCH_RESPONSE_LENGTH_MISMATCH",
            MockError::NoMatchingSubscription { .. } => "NO_MATCHING_SUBSCRIPTION",
            MockError::UnknownSubscriptionId { .. } => "UNKNOWN_SUBSCRIPTION_ID",
            MockError::SubscriptionResultsExhausted { .. } => "SUBSCRIPTION_RESULTS_EXHAUSTED",
            MockError::InvalidDocument { .. } => "INVALID_DOCUMENT",
            MockError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            MockError::Network(_) => "NETWORK_ERROR",
            MockError::Transport(_) => "TRANSPORT_ERROR",
        }
    }
}

impl From<NetworkError> for MockError {
    fn from(error: NetworkError) -> Self {
        MockError::Network(error)
    }
}

/// {message}
#[derive(Error, Display, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NetworkError {
    /// Human readable description of the failure.
    pub message: String,

    /// Free-form details for the client under test.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    #[schemars(with = "OtherJsonMap")]
    pub extensions: Object,
}

impl NetworkError {
    /// A network error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: Object::new(),
        }
    }
}

/// Errors loading fixture files.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum FixtureError {
    /// could not read fixtures from '{path}': {reason}
    Io {
        /// The file that was being read.
        path: String,
        /// The I/O failure.
        reason: String,
    },

    /// invalid YAML fixtures: {0}
    Yaml(#[from] serde_yaml::Error),

    /// invalid JSON fixtures: {0}
    Json(#[from] serde_json::Error),
}
