//! Fixture files.
//!
//! A fixture file lists the canned responses, subscriptions and fetches a test
//! runs against:
//!
//! ```yaml
//! responses:
//!   - request:
//!       query: "query Hero($id: Int) { hero(id: $id) { name } }"
//!       variables: { id: 1 }
//!     result:
//!       data: { hero: { name: Luke } }
//!     delay: 10
//! subscriptions: []
//! fetches: []
//! ```
//!
//! Delays are milliseconds.

use std::path::Path;
use std::str::FromStr;

use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::error::FixtureError;
use crate::mocks::batched::MockBatchedNetworkInterface;
use crate::mocks::fetch::MockFetch;
use crate::mocks::fetch::MockedFetchResponse;
use crate::mocks::network::MockNetworkInterface;
use crate::mocks::network::MockedResponse;
use crate::mocks::subscription::MockSubscriptionNetworkInterface;
use crate::mocks::subscription::MockedSubscription;

/// Every fixture a test needs, as loaded from a file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Fixtures {
    /// Query and mutation fixtures.
    pub responses: Vec<MockedResponse>,

    /// Subscription fixtures.
    pub subscriptions: Vec<MockedSubscription>,

    /// Raw fetch fixtures.
    pub fetches: Vec<MockedFetchResponse>,
}

/// Parse fixtures from a string in YAML syntax
impl FromStr for Fixtures {
    type Err = serde_yaml::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s)
    }
}

impl Fixtures {
    /// Parses YAML fixtures.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, FixtureError> {
        Ok(yaml.parse()?)
    }

    /// Parses JSON fixtures.
    pub fn from_json(json: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a fixture file. Files ending in `.json` are JSON, anything else is YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| FixtureError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loading fixtures");
        match path.extension().and_then(|extension| extension.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml_str(&contents),
        }
    }

    /// The JSON schema of fixture files.
    pub fn json_schema() -> RootSchema {
        let settings = SchemaSettings::draft07().with(|s| {
            s.option_nullable = true;
            s.option_add_null_type = false;
            s.inline_subschemas = true;
        });
        settings.into_generator().into_root_schema_for::<Fixtures>()
    }

    /// A [`MockNetworkInterface`] serving the response fixtures.
    pub fn network_interface(&self) -> MockNetworkInterface {
        MockNetworkInterface::new(self.responses.iter().cloned())
    }

    /// A [`MockBatchedNetworkInterface`] serving the response fixtures.
    pub fn batched_network_interface(&self) -> MockBatchedNetworkInterface {
        MockBatchedNetworkInterface::new(self.responses.iter().cloned())
    }

    /// A [`MockSubscriptionNetworkInterface`] serving the subscription and
    /// response fixtures.
    pub fn subscription_network_interface(&self) -> MockSubscriptionNetworkInterface {
        MockSubscriptionNetworkInterface::new(
            self.subscriptions.iter().cloned(),
            self.responses.iter().cloned(),
        )
    }

    /// A [`MockFetch`] serving the fetch fixtures.
    pub fn mock_fetch(&self) -> MockFetch {
        MockFetch::new(self.fetches.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::error::NetworkError;
    use crate::graphql::Document;
    use crate::graphql::Response;
    use crate::mocks::MockedOutcome;
    use crate::mocks::fetch::create_mocked_i_response;
    use crate::mocks::network::MockedRequest;
    use crate::mocks::subscription::MockedSubscriptionResult;

    const FIXTURES: &str = r#"
responses:
  - request:
      query: "query Hero($id: Int) { hero(id: $id) { name } }"
      variables:
        id: 1
      debugName: hero
    result:
      data:
        hero:
          name: Luke
    delay: 10
  - request:
      mutation: "mutation { addPerson(name: \"Ada\") { id } }"
    error:
      message: Network error
subscriptions:
  - request:
      query: "subscription OnComment { comment { text } }"
    results:
      - result:
          data:
            comment:
              text: first
        delay: 50
fetches:
  - url: "http://fake.com/graphql"
    opts:
      method: POST
    result:
      - data:
          ok: true
"#;

    #[test]
    fn loads_yaml() {
        let fixtures = Fixtures::from_yaml_str(FIXTURES).unwrap();
        assert_eq!(fixtures.responses.len(), 2);

        let hero = &fixtures.responses[0];
        assert_eq!(
            hero.request,
            MockedRequest::new(
                Document::parse("query Hero($id: Int) { hero(id: $id) { name } }").unwrap()
            )
            .with_variables(json!({"id": 1}).as_object().cloned().unwrap())
            .with_debug_name("hero")
        );
        assert_eq!(hero.delay, Duration::from_millis(10));
        assert_eq!(
            hero.outcome,
            MockedOutcome::Result(Response::from_data(json!({"hero": {"name": "Luke"}})))
        );
        assert_eq!(
            fixtures.responses[1].outcome,
            MockedOutcome::Error(NetworkError::new("Network error"))
        );

        assert_eq!(
            fixtures.subscriptions[0].results[0],
            MockedSubscriptionResult::result(Response::from_data(
                json!({"comment": {"text": "first"}})
            ))
            .with_delay(Duration::from_millis(50))
        );
        assert_eq!(
            fixtures.fetches[0].result,
            create_mocked_i_response(json!([{"data": {"ok": true}}]))
        );
    }

    #[test]
    fn yaml_and_json_agree() {
        let from_yaml: Fixtures = FIXTURES.parse().unwrap();
        let json = serde_json::to_string(&from_yaml).unwrap();
        assert_eq!(Fixtures::from_json(&json).unwrap(), from_yaml);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let fixtures = Fixtures::from_yaml_str("responses: []").unwrap();
        assert_eq!(fixtures, Fixtures::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = Fixtures::from_yaml_str("mocks: []").unwrap_err();
        assert!(matches!(error, FixtureError::Yaml(_)));

        let error = Fixtures::from_json(
            r#"{"responses": [{"request": {"query": "{ a }"}, "result": {}, "extra": 1}]}"#,
        )
        .unwrap_err();
        assert!(matches!(error, FixtureError::Json(_)));
    }

    #[test]
    fn result_and_error_are_exclusive() {
        let both = r#"
responses:
  - request:
      query: "{ a }"
    result:
      data: { a: 1 }
    error:
      message: boom
"#;
        assert!(Fixtures::from_yaml_str(both).is_err());
    }

    #[test]
    fn missing_files_are_reported() {
        let error = Fixtures::from_path("does/not/exist.yaml").unwrap_err();
        assert!(error.to_string().starts_with("could not read fixtures from 'does/not/exist.yaml'"));
    }

    #[test]
    fn schema() {
        let schema = serde_json::to_value(Fixtures::json_schema()).unwrap();
        assert_eq!(schema["additionalProperties"], serde_json::json!(false));
        let properties = schema["properties"].as_object().unwrap();
        let mut keys: Vec<&str> = properties.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["fetches", "responses", "subscriptions"]);
        assert!(
            schema.to_string().contains("\"delay\""),
            "delays are part of the schema"
        );
    }
}
