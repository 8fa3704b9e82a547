//! GraphQL request wire type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// GraphQL request payload, POSTed as the HTTP body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    /// The GraphQL document.
    pub query: String,
    /// Operation name, for named single operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Variable bindings for the document.
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl GraphQLRequest {
    /// Create a new request without variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Map::new(),
        }
    }

    /// Set the operation name.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set all variables.
    pub fn variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Set a single variable.
    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let request = GraphQLRequest::new("query ($hello_name: String!) { hello(name: $hello_name) }")
            .variable("hello_name", json!("world"));

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "query": "query ($hello_name: String!) { hello(name: $hello_name) }",
                "variables": { "hello_name": "world" }
            })
        );
    }

    #[test]
    fn test_operation_name_is_camel_case() {
        let request = GraphQLRequest::new("query Me { me { id } }").operation_name("Me");
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["operationName"], "Me");
    }
}
