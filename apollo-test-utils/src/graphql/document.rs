use std::fmt;
use std::sync::Arc;

use apollo_compiler::ast;
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as _;

use crate::error::MockError;

/// The kind of operation a [`Document`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// A `query` operation (also the kind of a document without operations).
    Query,
    /// A `mutation` operation.
    Mutation,
    /// A `subscription` operation.
    Subscription,
}

impl From<ast::OperationType> for OperationKind {
    fn from(operation_type: ast::OperationType) -> Self {
        match operation_type {
            ast::OperationType::Query => OperationKind::Query,
            ast::OperationType::Mutation => OperationKind::Mutation,
            ast::OperationType::Subscription => OperationKind::Subscription,
        }
    }
}

/// A parsed GraphQL document.
///
/// Documents compare by their printed form, so two sources that only differ in
/// whitespace, commas or comments are the same document.
#[derive(Clone)]
pub struct Document {
    ast: Arc<ast::Document>,
    printed: Arc<str>,
}

impl Document {
    /// Parses GraphQL source text.
    pub fn parse(source: impl Into<String>) -> Result<Self, MockError> {
        let ast = ast::Document::parse(source, "request.graphql").map_err(|with_errors| {
            MockError::InvalidDocument {
                reason: with_errors.errors.to_string(),
            }
        })?;
        let printed = ast.to_string().into();
        Ok(Self {
            ast: Arc::new(ast),
            printed,
        })
    }

    /// The canonical printed form.
    pub fn printed(&self) -> &str {
        &self.printed
    }

    /// The parsed syntax tree.
    pub fn ast(&self) -> &ast::Document {
        &self.ast
    }

    /// The kind of the first operation in the document.
    pub fn operation_kind(&self) -> OperationKind {
        self.ast
            .definitions
            .iter()
            .find_map(|definition| match definition {
                ast::Definition::OperationDefinition(operation) => {
                    Some(operation.operation_type.into())
                }
                _ => None,
            })
            .unwrap_or(OperationKind::Query)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.printed == other.printed
    }
}

impl Eq for Document {}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Document").field(&self.printed).finish()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.printed)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.printed)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Document::parse(source).map_err(D::Error::custom)
    }
}

impl JsonSchema for Document {
    fn schema_name() -> String {
        "GraphQLDocument".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printing_ignores_layout() {
        let compact = Document::parse("query UserInfo($name: String) { user(name: $name) { name } }")
            .unwrap();
        let spread = Document::parse(
            r#"
            # fetch a user
            query UserInfo($name: String) {
              user(name: $name) {
                name,
              }
            }
            "#,
        )
        .unwrap();
        assert_eq!(compact, spread);
        assert_eq!(compact.printed(), spread.printed());
    }

    #[test]
    fn operation_kinds() {
        let kind = |source: &str| Document::parse(source).unwrap().operation_kind();
        assert_eq!(kind("{ author { firstName } }"), OperationKind::Query);
        assert_eq!(
            kind("mutation { addPerson(name: \"Ada\") { id } }"),
            OperationKind::Mutation
        );
        assert_eq!(
            kind("subscription OnComment { comment { text } }"),
            OperationKind::Subscription
        );
        assert_eq!(
            kind("fragment F on User { name } mutation M { m { ...F } }"),
            OperationKind::Mutation
        );
    }

    #[test]
    fn invalid_source() {
        let error = Document::parse("query {").unwrap_err();
        assert_eq!(error.code(), "INVALID_DOCUMENT");
    }

    #[test]
    fn serde_uses_printed_form() {
        let document: Document = serde_json::from_str(r#""{ author { firstName } }""#).unwrap();
        let json = serde_json::to_string(&document).unwrap();
        let again: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(document, again);
        assert!(serde_json::from_str::<Document>(r#""{ author {""#).is_err());
    }
}
