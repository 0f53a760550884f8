//! Request dispatch against the Incus API.
//!
//! # Design
//! `Client` holds an immutable `ClientConfig` and a transport opened once at
//! construction. Each request is split the same way: `build_request`
//! produces an `HttpRequest` without touching the network, the transport
//! carries it, and `parse_response` decides whether the result is usable.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::response::{check_response, ApiResponse};
use crate::target::Endpoint;
use crate::transport::{Session, Transport};

pub const DEFAULT_API_VERSION: &str = "1.0";

/// One API call: method, versioned path, optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub api_version: String,
    pub method: HttpMethod,
    /// Relative resource path, e.g. `instances?recursion=2`.
    pub api_path: String,
    pub body: Option<Value>,
    /// Return the raw response without validation. Used for log and
    /// exec-output streams that are not JSON.
    pub skip_result_validation: bool,
    pub timeout: Option<Duration>,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            method: HttpMethod::Get,
            api_path: String::new(),
            body: None,
            skip_result_validation: false,
            timeout: None,
        }
    }
}

impl RequestSpec {
    pub fn new(method: HttpMethod, api_path: impl Into<String>) -> Self {
        Self {
            method,
            api_path: api_path.into(),
            ..Self::default()
        }
    }

    pub fn get(api_path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, api_path)
    }

    pub fn delete(api_path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, api_path)
    }

    pub fn post(api_path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, api_path).with_body(body)
    }

    pub fn put(api_path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, api_path).with_body(body)
    }

    pub fn patch(api_path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Patch, api_path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize any `Serialize` value as the JSON body.
    pub fn with_json<T: Serialize>(self, body: &T) -> Result<Self, ClientError> {
        let value =
            serde_json::to_value(body).map_err(|e| ClientError::Serialization(e.to_string()))?;
        Ok(self.with_body(value))
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn skip_validation(mut self) -> Self {
        self.skip_result_validation = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Synchronous client for the Incus API.
#[derive(Debug)]
pub struct Client<T = Session> {
    config: ClientConfig,
    transport: T,
}

impl Client<Session> {
    /// Open a session for `config.connection_target`.
    ///
    /// Fails with `UnsupportedTarget` for targets that are neither a socket
    /// path nor an `https://` URL, without any I/O.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let session = Session::open(&config)?;
        Ok(Self::with_transport(config, session))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build the HTTP request for `spec` without sending it.
    pub fn build_request(&self, spec: &RequestSpec) -> Result<HttpRequest, ClientError> {
        let endpoint = Endpoint::classify(&self.config.connection_target).inspect_err(|_| {
            tracing::warn!(
                connection_target = %self.config.connection_target,
                "unknown connection target"
            );
        })?;

        if spec.body.is_none() && spec.method.expects_body() {
            tracing::warn!(
                method = %spec.method,
                path = %spec.api_path,
                "this request type requires a JSON body; sending an empty one"
            );
        }

        let api_path = spec.api_path.trim_start_matches('/');
        let url = endpoint.url(&spec.api_version, api_path);

        let mut headers = vec![("accept".to_string(), "application/json".to_string())];
        let body = match &spec.body {
            Some(value) => {
                headers.push(("content-type".to_string(), "application/json".to_string()));
                Some(serde_json::to_vec(value).map_err(|e| ClientError::Serialization(e.to_string()))?)
            }
            None => None,
        };

        tracing::debug!(method = %spec.method, %url, "built request");

        Ok(HttpRequest {
            method: spec.method,
            url,
            headers,
            body,
            timeout: spec.timeout,
        })
    }

    /// Turn a raw response into an `ApiResponse`, validating it unless the
    /// caller asked for the raw stream.
    pub fn parse_response(
        &self,
        response: HttpResponse,
        skip_result_validation: bool,
    ) -> Result<ApiResponse, ClientError> {
        let response = ApiResponse::new(response);
        if skip_result_validation {
            tracing::debug!(status = response.status(), "skipping validation");
            return Ok(response);
        }
        check_response(&response).inspect_err(|err| {
            tracing::warn!(status = response.status(), "request validation failed: {err}");
        })?;
        Ok(response)
    }

    /// Send `spec` and return the validated response.
    ///
    /// Transport failures are terminal; nothing is retried.
    pub fn request(&self, spec: &RequestSpec) -> Result<ApiResponse, ClientError> {
        let request = self.build_request(spec)?;
        let response = self.transport.send(&request).map_err(|source| {
            tracing::error!(
                connection_target = %self.config.connection_target,
                kind = ?source.kind,
                "unable to complete request: {source}"
            );
            ClientError::Transport {
                target: self.config.connection_target.clone(),
                source,
            }
        })?;
        tracing::debug!(status = response.status, url = %request.url, "received response");
        self.parse_response(response, spec.skip_result_validation)
    }

    pub fn get(&self, api_path: &str) -> Result<ApiResponse, ClientError> {
        self.request(&RequestSpec::get(api_path))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use serde_json::json;

    use super::*;
    use crate::error::{TransportError, TransportErrorKind};

    /// Replays queued responses and records every request it is given.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub responses: RefCell<VecDeque<Result<HttpResponse, TransportError>>>,
        pub requests: RefCell<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub fn replying(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                requests: RefCell::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.borrow_mut().push(request.clone());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new(TransportErrorKind::Connection, "no scripted response")))
        }
    }

    pub(crate) fn http(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        })
    }

    fn client(target: &str, transport: ScriptedTransport) -> Client<ScriptedTransport> {
        Client::with_transport(ClientConfig::new(target), transport)
    }

    #[test]
    fn unsupported_target_makes_no_transport_calls() {
        let c = client("ftp://nope", ScriptedTransport::default());
        let err = c.request(&RequestSpec::get("instances")).unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedTarget(_)));
        assert!(err.is_transport());
        assert_eq!(c.transport().calls(), 0);
    }

    #[test]
    fn socket_request_uses_encoded_socket_url() {
        let c = client(
            "/tmp/x.sock",
            ScriptedTransport::replying(vec![http(200, r#"{"type":"sync","status_code":200,"metadata":[]}"#)]),
        );
        let response = c.request(&RequestSpec::get("instances")).unwrap();
        assert_eq!(response.status(), 200);

        let requests = c.transport().requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(requests[0].url, "http+unix://%2Ftmp%2Fx.sock/1.0/instances");
        assert!(requests[0].body.is_none());
    }

    #[test]
    fn https_request_joins_target_version_and_path() {
        let c = client("https://localhost:8443", ScriptedTransport::default());
        let req = c
            .build_request(&RequestSpec::get("/instances?recursion=2").with_api_version("1.0"))
            .unwrap();
        assert_eq!(req.url, "https://localhost:8443/1.0/instances?recursion=2");
    }

    #[test]
    fn post_body_is_serialized_as_json() {
        let c = client("/tmp/x.sock", ScriptedTransport::default());
        let req = c
            .build_request(&RequestSpec::post("instances", json!({"name": "c1", "start": true})))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert!(req
            .headers
            .contains(&("content-type".to_string(), "application/json".to_string())));
        let body: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"name": "c1", "start": true}));
    }

    #[test]
    fn write_method_without_body_is_still_sent() {
        let c = client(
            "/tmp/x.sock",
            ScriptedTransport::replying(vec![http(200, r#"{"status_code":200}"#)]),
        );
        let spec = RequestSpec::new(HttpMethod::Put, "instances/c1/state");
        assert!(c.request(&spec).is_ok());
        assert_eq!(c.transport().calls(), 1);
        assert!(c.transport().requests.borrow()[0].body.is_none());
    }

    #[test]
    fn transport_failure_is_reported_with_kind() {
        let c = client(
            "https://localhost:8443",
            ScriptedTransport::replying(vec![Err(TransportError::new(
                TransportErrorKind::Certificate,
                "unknown issuer",
            ))]),
        );
        let err = c.get("instances").unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Certificate));
        assert!(!err.is_rejection());
    }

    #[test]
    fn invalid_response_is_rejected() {
        let c = client(
            "/tmp/x.sock",
            ScriptedTransport::replying(vec![http(
                404,
                r#"{"type":"error","error":"Not Found","error_code":404}"#,
            )]),
        );
        let err = c.get("instances/missing").unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn skip_validation_returns_raw_stream() {
        let c = client(
            "/tmp/x.sock",
            ScriptedTransport::replying(vec![http(200, "line one\nline two\n")]),
        );
        let response = c
            .request(&RequestSpec::get("instances/c1/logs/exec-output/stdout.log").skip_validation())
            .unwrap();
        assert_eq!(response.text(), "line one\nline two\n");
    }

    #[test]
    fn skip_validation_returns_error_statuses_too() {
        let c = client(
            "/tmp/x.sock",
            ScriptedTransport::replying(vec![http(500, "boom")]),
        );
        let response = c.request(&RequestSpec::get("x").skip_validation()).unwrap();
        assert_eq!(response.status(), 500);
    }

    #[test]
    fn with_json_serializes_structs() {
        #[derive(Serialize)]
        struct StateChange {
            action: &'static str,
        }
        let spec = RequestSpec::new(HttpMethod::Put, "instances/c1/state")
            .with_json(&StateChange { action: "start" })
            .unwrap();
        assert_eq!(spec.body, Some(json!({"action": "start"})));
    }

    #[test]
    fn request_timeout_is_carried_to_transport() {
        let c = client("/tmp/x.sock", ScriptedTransport::default());
        let req = c
            .build_request(&RequestSpec::get("instances").with_timeout(Duration::from_secs(3)))
            .unwrap();
        assert_eq!(req.timeout, Some(Duration::from_secs(3)));
    }
}
