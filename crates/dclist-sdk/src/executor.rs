//! Template rendering and response normalization.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{DclistError, DclistResult, HttpErrorInfo};
use crate::operation::{GraphqlRequest, GraphqlResponse};
use crate::queries::{FIELDS_PLACEHOLDER, QueryTemplate};
use crate::selector::FieldSelector;
use crate::transport::{QueryTransport, TransportReply, truncate_body};

/// Executes catalog operations over a [`QueryTransport`].
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn QueryTransport>,
}

impl RequestExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(transport: Arc<dyn QueryTransport>) -> Self {
        Self { transport }
    }

    /// Run `template` and return the value under its result key.
    ///
    /// `Ok(None)` means the server answered without errors but did not
    /// return the key (or returned `null`).
    ///
    /// # Errors
    /// Returns the first GraphQL error as [`DclistError::Api`], or a
    /// transport/decoding error.
    #[instrument(skip_all, fields(operation = template.operation_name))]
    pub async fn execute<T: DeserializeOwned>(
        &self,
        template: &QueryTemplate,
        selector: Option<&FieldSelector>,
        variables: Option<Value>,
    ) -> DclistResult<Option<T>> {
        let request = build_request(template, selector, variables);
        let reply = self
            .transport
            .send(&request, !template.is_mutation())
            .await?;
        let data = decode_reply(reply)?;

        match data.and_then(|data| take_key(data, template.result_key)) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => {
                debug!(result_key = template.result_key, "Result key absent");
                Ok(None)
            }
        }
    }
}

/// Render `template` into a request, splicing `selector` (or the template
/// default) into `$FIELDS$` when the document has that slot.
#[must_use]
pub fn build_request(
    template: &QueryTemplate,
    selector: Option<&FieldSelector>,
    variables: Option<Value>,
) -> GraphqlRequest {
    let document = if template.has_fields_placeholder() {
        let fallback = selector
            .is_none()
            .then(|| template.default_selector())
            .flatten();
        match selector.or(fallback.as_ref()) {
            Some(selector) => template
                .document
                .replacen(FIELDS_PLACEHOLDER, selector.serialized(), 1),
            None => template.document.to_string(),
        }
    } else {
        template.document.to_string()
    };

    GraphqlRequest::new(document)
        .with_variables(variables)
        .with_operation_name(template.operation_name)
}

fn decode_reply(reply: TransportReply) -> DclistResult<Option<Value>> {
    let status = reply.status;
    let http_error =
        || DclistError::Http(HttpErrorInfo::from_status(status, truncate_body(&reply.body)));

    let response: GraphqlResponse = match serde_json::from_slice(&reply.body) {
        Ok(response) => response,
        Err(_) if !status.is_success() => return Err(http_error()),
        Err(err) => return Err(err.into()),
    };

    if let Some(error) = response.errors.into_iter().next() {
        return Err(error.into());
    }
    if response.data.is_none() && !status.is_success() {
        return Err(http_error());
    }
    Ok(response.data)
}

fn take_key(data: Value, key: &str) -> Option<Value> {
    match data {
        Value::Object(mut map) => map.remove(key).filter(|value| !value.is_null()),
        _ => None,
    }
}
