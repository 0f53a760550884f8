//! API responses and their validation.
//!
//! # Design
//! A response is valid when the HTTP status is 2xx, the body parses as
//! JSON, and its status code is outside the error set. The code checked is
//! the envelope's embedded `status_code` when it is present and non-zero,
//! otherwise the HTTP status. Error envelopes carry `status_code: 0`, so
//! they fall back to the HTTP status.

use serde_json::Value;

use crate::error::ClientError;
use crate::http::HttpResponse;
use crate::status;
use crate::types::ResponseEnvelope;

/// A response from the daemon. The body is kept as bytes and parsed on
/// demand, since log and exec-output endpoints do not return JSON.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    inner: HttpResponse,
}

impl ApiResponse {
    pub fn new(inner: HttpResponse) -> Self {
        Self { inner }
    }

    pub fn status(&self) -> u16 {
        self.inner.status
    }

    /// HTTP status in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.inner.status)
    }

    pub fn is_background(&self) -> bool {
        status::is_background(self.inner.status)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.inner.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.header(name)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.inner.body).into_owned()
    }

    pub fn json(&self) -> Result<Value, ClientError> {
        serde_json::from_slice(&self.inner.body).map_err(|e| ClientError::InvalidJson(e.to_string()))
    }

    pub fn envelope(&self) -> Result<ResponseEnvelope, ClientError> {
        serde_json::from_slice(&self.inner.body).map_err(|e| ClientError::InvalidJson(e.to_string()))
    }

    /// The envelope's `metadata`, deserialized into `T`.
    pub fn metadata<T: serde::de::DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_value(self.envelope()?.metadata)
            .map_err(|e| ClientError::InvalidJson(e.to_string()))
    }

    pub fn into_inner(self) -> HttpResponse {
        self.inner
    }
}

impl From<HttpResponse> for ApiResponse {
    fn from(inner: HttpResponse) -> Self {
        Self::new(inner)
    }
}

/// Whether `response` counts as a success. Absent responses never do.
pub fn validate(response: Option<&ApiResponse>) -> bool {
    match response {
        Some(response) => check_response(response).is_ok(),
        None => false,
    }
}

/// Validate `response`, returning its parsed body on success.
pub fn check_response(response: &ApiResponse) -> Result<Value, ClientError> {
    if !response.ok() {
        tracing::info!(status = response.status(), "request returned an HTTP error status");
        return Err(rejected(response, None));
    }

    let json = response.json().inspect_err(|err| {
        tracing::warn!(status = response.status(), "{err}");
    })?;

    let embedded = json
        .get("status_code")
        .and_then(Value::as_u64)
        .filter(|&code| code != 0);
    let code = embedded.unwrap_or(u64::from(response.status()));

    if status::is_error(code) {
        tracing::warn!(
            status = response.status(),
            status_code = %status::describe(code),
            "response status is in the error set"
        );
        return Err(rejected(response, embedded));
    }

    Ok(json)
}

fn rejected(response: &ApiResponse, status_code: Option<u64>) -> ClientError {
    let message = response
        .envelope()
        .ok()
        .and_then(|env| env.error.filter(|e| !e.is_empty()).or(env.status))
        .unwrap_or_else(|| response.text());
    ClientError::Rejected {
        status: response.status(),
        status_code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse::new(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        })
    }

    #[test]
    fn absent_response_is_invalid() {
        assert!(!validate(None));
    }

    #[test]
    fn sync_success_is_valid() {
        let r = response(200, r#"{"type":"sync","status":"Success","status_code":200,"metadata":{}}"#);
        assert!(validate(Some(&r)));
        assert_eq!(check_response(&r).unwrap()["status"], "Success");
    }

    #[test]
    fn http_error_status_is_invalid() {
        let r = response(
            404,
            r#"{"type":"error","error":"Instance not found","error_code":404,"status_code":0}"#,
        );
        assert!(!validate(Some(&r)));
        let err = check_response(&r).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Rejected { status: 404, status_code: None, ref message } if message == "Instance not found"
        ));
    }

    #[test]
    fn non_json_body_is_invalid_even_with_200() {
        let r = response(200, "<html>not json</html>");
        assert!(!validate(Some(&r)));
        assert!(matches!(check_response(&r), Err(ClientError::InvalidJson(_))));
    }

    #[test]
    fn embedded_error_code_is_invalid_despite_http_200() {
        let r = response(200, r#"{"type":"sync","status":"Failure","status_code":400}"#);
        assert!(!validate(Some(&r)));
        assert!(matches!(
            check_response(&r),
            Err(ClientError::Rejected { status: 200, status_code: Some(400), .. })
        ));
    }

    #[test]
    fn background_acceptance_is_valid() {
        let r = response(
            202,
            r#"{"type":"async","status":"Operation created","status_code":100,"metadata":{"id":"abc"}}"#,
        );
        assert!(r.is_background());
        assert!(validate(Some(&r)));
    }

    #[test]
    fn zero_status_code_falls_back_to_http_status() {
        let r = response(200, r#"{"status_code":0,"metadata":null}"#);
        assert!(validate(Some(&r)));
    }

    #[test]
    fn json_without_status_code_uses_http_status() {
        let r = response(200, r#"{"metadata":{"id":"abc"}}"#);
        assert!(validate(Some(&r)));
    }

    #[test]
    fn metadata_deserializes_into_target_type() {
        let r = response(200, r#"{"status_code":200,"metadata":["/1.0/instances/c1"]}"#);
        let names: Vec<String> = r.metadata().unwrap();
        assert_eq!(names, vec!["/1.0/instances/c1".to_string()]);
    }

    #[test]
    fn rejection_message_falls_back_to_body_text() {
        let r = response(500, "internal error");
        let err = check_response(&r).unwrap_err();
        assert!(matches!(err, ClientError::Rejected { ref message, .. } if message == "internal error"));
    }
}
