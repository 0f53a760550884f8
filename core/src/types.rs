//! Response DTOs for the Incus API.
//!
//! # Design
//! Only the generic envelope and the operation object are typed. Resource
//! payloads (instances, volumes, devices) stay as `serde_json::Value` in
//! `metadata`; callers deserialize them into their own types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Sync,
    Async,
    Error,
}

/// The JSON wrapper every API response is returned in.
///
/// Sync responses carry `status`/`status_code` and the resource in
/// `metadata`. Async responses add `operation` and put the operation object
/// in `metadata`. Error responses carry `error_code` and `error` instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// A background operation as returned in async envelopes and by
/// `operations/{id}/wait`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_code: u64,
    #[serde(default)]
    pub err: String,
    #[serde(default)]
    pub may_cancel: bool,
    #[serde(default)]
    pub resources: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub metadata: Option<Value>,
}
