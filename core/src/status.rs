//! Status-code vocabularies used by the Incus API.
//!
//! Two sets of numbers travel with every response: the HTTP status line and
//! the `status_code` embedded in the JSON envelope. Control decisions only
//! use the closed error set; `ApiStatus` names exist for logging.

use std::fmt;

/// HTTP status for a synchronous success.
pub const HTTP_SUCCESSFUL_SYNCHRONOUS_CODES: &[u16] = &[200];

/// HTTP statuses meaning "operation accepted, wait for it". 100 is not in
/// the API documentation but is treated as background as well.
pub const HTTP_SUCCESSFUL_BACKGROUND_CODES: &[u16] = &[100, 202];

/// Statuses treated as a server-side rejection, whether they arrive on the
/// status line or embedded in the body.
pub const HTTP_ERROR_CODES: &[u16] = &[400, 401, 403, 404, 409, 412, 500];

pub fn is_background(status: u16) -> bool {
    HTTP_SUCCESSFUL_BACKGROUND_CODES.contains(&status)
}

pub fn is_error(code: u64) -> bool {
    HTTP_ERROR_CODES.iter().any(|&c| u64::from(c) == code)
}

/// Operation states that end a wait: Success, Failure and Canceled.
pub const OPERATION_FINAL_CODES: &[u64] = &[200, 400, 401];

pub fn is_final(code: u64) -> bool {
    OPERATION_FINAL_CODES.contains(&code)
}

/// Named lifecycle state carried in an envelope's `status_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    OperationCreated,
    Started,
    Stopped,
    Running,
    Canceling,
    Pending,
    Starting,
    Stopping,
    Aborting,
    Freezing,
    Frozen,
    Thawed,
    Error,
    Ready,
    Success,
    Failure,
    Canceled,
}

impl ApiStatus {
    pub fn from_code(code: u64) -> Option<Self> {
        let status = match code {
            100 => ApiStatus::OperationCreated,
            101 => ApiStatus::Started,
            102 => ApiStatus::Stopped,
            103 => ApiStatus::Running,
            104 => ApiStatus::Canceling,
            105 => ApiStatus::Pending,
            106 => ApiStatus::Starting,
            107 => ApiStatus::Stopping,
            108 => ApiStatus::Aborting,
            109 => ApiStatus::Freezing,
            110 => ApiStatus::Frozen,
            111 => ApiStatus::Thawed,
            112 => ApiStatus::Error,
            113 => ApiStatus::Ready,
            200 => ApiStatus::Success,
            400 => ApiStatus::Failure,
            401 => ApiStatus::Canceled,
            _ => return None,
        };
        Some(status)
    }

    pub fn code(&self) -> u64 {
        match self {
            ApiStatus::OperationCreated => 100,
            ApiStatus::Started => 101,
            ApiStatus::Stopped => 102,
            ApiStatus::Running => 103,
            ApiStatus::Canceling => 104,
            ApiStatus::Pending => 105,
            ApiStatus::Starting => 106,
            ApiStatus::Stopping => 107,
            ApiStatus::Aborting => 108,
            ApiStatus::Freezing => 109,
            ApiStatus::Frozen => 110,
            ApiStatus::Thawed => 111,
            ApiStatus::Error => 112,
            ApiStatus::Ready => 113,
            ApiStatus::Success => 200,
            ApiStatus::Failure => 400,
            ApiStatus::Canceled => 401,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApiStatus::OperationCreated => "Operation created",
            ApiStatus::Started => "Started",
            ApiStatus::Stopped => "Stopped",
            ApiStatus::Running => "Running",
            ApiStatus::Canceling => "Canceling",
            ApiStatus::Pending => "Pending",
            ApiStatus::Starting => "Starting",
            ApiStatus::Stopping => "Stopping",
            ApiStatus::Aborting => "Aborting",
            ApiStatus::Freezing => "Freezing",
            ApiStatus::Frozen => "Frozen",
            ApiStatus::Thawed => "Thawed",
            ApiStatus::Error => "Error",
            ApiStatus::Ready => "Ready",
            ApiStatus::Success => "Success",
            ApiStatus::Failure => "Failure",
            ApiStatus::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Human-readable name for an embedded status code, for log lines.
pub fn describe(code: u64) -> String {
    match ApiStatus::from_code(code) {
        Some(status) => format!("{code} ({status})"),
        None => format!("{code} (unknown)"),
    }
}
