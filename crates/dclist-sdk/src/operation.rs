//! GraphQL request/response containers.

use serde::{Deserialize, Serialize};

use crate::error::GraphqlError;

/// Body of a GraphQL request over HTTP or inside a `subscribe` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    /// Concrete document, placeholders already filled.
    pub query: String,
    /// Variables payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
    /// Operation name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphqlRequest {
    /// Create a request without variables.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    /// Attach variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Option<serde_json::Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Attach an operation name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// GraphQL response container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct GraphqlResponse<T = serde_json::Value> {
    /// Response data.
    #[serde(default)]
    pub data: Option<T>,
    /// GraphQL errors.
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_operation_name_camel_case() {
        let request = GraphqlRequest::new("query isUserVoted { isUserVoted }")
            .with_variables(Some(json!({ "userId": "1" })))
            .with_operation_name("isUserVoted");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "query": "query isUserVoted { isUserVoted }",
                "variables": { "userId": "1" },
                "operationName": "isUserVoted"
            })
        );
    }

    #[test]
    fn response_tolerates_null_data_and_missing_errors() {
        let response: GraphqlResponse = serde_json::from_value(json!({ "data": null })).unwrap();
        assert!(response.data.is_none());
        assert!(response.errors.is_empty());
    }
}
