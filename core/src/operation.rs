//! Waiting on background operations.
//!
//! A background response (HTTP 202) carries an operation id. The client
//! waits for it with a single blocking `GET operations/{id}/wait`; the
//! daemon holds the request open until the operation finishes. There is no
//! client-side poll loop.

use std::time::Duration;

use serde_json::Value;

use crate::client::{Client, RequestSpec};
use crate::error::ClientError;
use crate::response::ApiResponse;
use crate::status;
use crate::transport::Transport;
use crate::types::Operation;

/// Extra client-side slack on top of the server-side wait timeout, so the
/// daemon gets to answer before the socket gives up.
const WAIT_GRACE: Duration = Duration::from_secs(5);

/// Path of the blocking wait resource for `id`.
pub fn wait_path(id: &str, timeout: Option<Duration>) -> String {
    match timeout {
        Some(timeout) => format!("operations/{id}/wait?timeout={}", timeout.as_secs()),
        None => format!("operations/{id}/wait"),
    }
}

/// Operation id from a background response body, looked up in order:
/// `metadata.id`, `source.operation`, then the top-level `operation` URL.
/// Either of the last two may be a bare id or a `/1.0/operations/<id>` path.
pub fn operation_id(body: &Value) -> Option<String> {
    if let Some(id) = body.pointer("/metadata/id").and_then(Value::as_str) {
        return Some(id.to_string());
    }
    ["/source/operation", "/operation"]
        .iter()
        .filter_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
        .filter_map(|op| op.trim_end_matches('/').rsplit('/').next())
        .find(|id| !id.is_empty())
        .map(str::to_string)
}

impl<T: Transport> Client<T> {
    /// Follow a background response through to its final result.
    ///
    /// * no response: `NothingToPoll`
    /// * not a background status: the response is returned unchanged
    /// * background status: one wait request, validated, returned
    pub fn poll(&self, response: Option<ApiResponse>) -> Result<ApiResponse, ClientError> {
        let Some(response) = response else {
            tracing::info!("no response given; nothing to poll");
            return Err(ClientError::NothingToPoll);
        };

        if !response.is_background() {
            tracing::debug!(
                status = response.status(),
                "not a background response; polling is not necessary"
            );
            return Ok(response);
        }

        let body = response.json().inspect_err(|err| {
            tracing::warn!("{err}");
        })?;
        let id = operation_id(&body).ok_or(ClientError::MissingOperationId)?;
        self.wait_operation(&id)
    }

    /// `poll` for the output of a previous request. A failed request is
    /// passed through untouched.
    pub fn poll_result(
        &self,
        response: Result<ApiResponse, ClientError>,
    ) -> Result<ApiResponse, ClientError> {
        match response {
            Ok(response) => self.poll(Some(response)),
            Err(err) => {
                tracing::info!("upstream request already failed; not polling: {err}");
                Err(err)
            }
        }
    }

    /// Block until operation `id` finishes.
    ///
    /// Waits indefinitely unless `operation_timeout_secs` is configured.
    /// An operation that ends in an error state is reported as
    /// `OperationFailed`; one still running when the wait returns is
    /// `OperationTimedOut`.
    pub fn wait_operation(&self, id: &str) -> Result<ApiResponse, ClientError> {
        let timeout = self.config().operation_timeout();
        let mut spec = RequestSpec::get(wait_path(id, timeout));
        if let Some(timeout) = timeout {
            spec = spec.with_timeout(timeout + WAIT_GRACE);
        }

        tracing::info!(operation = id, "waiting for operation to complete");
        let waited = self.request(&spec)?;

        let body = waited.json()?;
        if let Some(op) = body
            .get("metadata")
            .and_then(|m| serde_json::from_value::<Operation>(m.clone()).ok())
        {
            tracing::info!(
                operation = id,
                status = %status::describe(op.status_code),
                "operation finished"
            );
            if status::is_error(op.status_code) {
                return Err(ClientError::OperationFailed {
                    id: op.id,
                    status: op.status,
                    err: op.err,
                });
            }
            if !status::is_final(op.status_code) {
                tracing::warn!(
                    operation = id,
                    status = %op.status,
                    "wait returned before the operation finished"
                );
                return Err(ClientError::OperationTimedOut {
                    id: op.id,
                    status: op.status,
                });
            }
        }
        Ok(waited)
    }

    /// `request` followed by `poll`.
    pub fn request_and_wait(&self, spec: &RequestSpec) -> Result<ApiResponse, ClientError> {
        self.poll_result(self.request(spec))
    }
}
