use crate::containers::{DispatchError, ValidationError};
use crate::pool::PoolError;
use dockfleet_common::directory::DirectoryError;
use dockfleet_common::provision::ProvisionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

pub const CODE_OK: i32 = 0;
pub const CODE_VALIDATION: i32 = 1;
pub const CODE_CONNECTION: i32 = 2;
pub const CODE_RUNTIME_CALL: i32 = 3;
pub const CODE_NOT_FOUND: i32 = 4;
pub const CODE_PROVISIONING: i32 = 5;
pub const CODE_DIRECTORY_TIMEOUT: i32 = 100;
pub const CODE_DIRECTORY_READ: i32 = 101;
pub const CODE_INTERNAL: i32 = 500;

/// Envelope of every kernel HTTP response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub error_code: i32,
    pub data: Value,
}

impl ApiResponse {
    pub fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self { error_code: CODE_OK, data },
            Err(e) => {
                error!(op = "response.encode", error = %e, "response payload not serializable");
                Self::error(CODE_INTERNAL, "response encoding error")
            }
        }
    }

    pub fn empty() -> Self {
        Self { error_code: CODE_OK, data: Value::String(String::new()) }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self { error_code: code, data: Value::String(message.into()) }
    }
}

/// Everything a request can fail with, reduced to a code and a short message
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("host {0} not found")]
    HostNotFound(String),
}

impl ApiError {
    pub fn code(&self) -> i32 {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => CODE_VALIDATION,
            ApiError::Pool(PoolError::NotFound(_)) | ApiError::HostNotFound(_) => CODE_NOT_FOUND,
            ApiError::Pool(_) => CODE_CONNECTION,
            ApiError::Dispatch(_) => CODE_RUNTIME_CALL,
            ApiError::Provision(_) => CODE_PROVISIONING,
            ApiError::Directory(e) if e.is_timeout() => CODE_DIRECTORY_TIMEOUT,
            ApiError::Directory(_) => CODE_DIRECTORY_READ,
        }
    }

    /// What the caller sees. Transport details stay in the logs.
    pub fn message(&self) -> String {
        match self {
            ApiError::Pool(PoolError::Connect { ip, .. }) => format!("connect to runtime on {ip} error"),
            ApiError::Pool(PoolError::NotFound(ip)) => format!("no runtime connection for {ip}"),
            ApiError::Provision(ProvisionError::Remote { message, .. }) => {
                format!("entry point script error: {message}")
            }
            ApiError::Provision(_) => "entry point provisioning error".to_string(),
            ApiError::Directory(e) if e.is_timeout() => "directory read timed out".to_string(),
            ApiError::Directory(_) => "directory read error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ApiError> for ApiResponse {
    fn from(err: ApiError) -> Self {
        ApiResponse::error(err.code(), err.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockfleet_common::directory::StoreError;
    use std::time::Duration;

    #[test]
    fn codes_follow_the_error_table() {
        assert_eq!(ApiError::Validation(ValidationError::MissingName).code(), 1);
        assert_eq!(ApiError::Pool(PoolError::Closed).code(), 2);
        assert_eq!(ApiError::Pool(PoolError::NotFound("10.0.0.9".into())).code(), 4);
        assert_eq!(ApiError::HostNotFound("10.0.0.9".into()).code(), 4);
        assert_eq!(ApiError::Directory(DirectoryError::Timeout(Duration::from_secs(2))).code(), 100);
        assert_eq!(ApiError::Directory(DirectoryError::Read(StoreError::Unavailable("x".into()))).code(), 101);
    }

    #[test]
    fn envelope_is_camel_case() {
        let json = serde_json::to_value(ApiResponse::error(4, "no runtime connection for 10.0.0.9")).unwrap();
        assert_eq!(json["errorCode"], 4);
        assert_eq!(json["data"], "no runtime connection for 10.0.0.9");
    }

    #[test]
    fn unencodable_payload_is_an_internal_error() {
        let mut data = std::collections::HashMap::new();
        data.insert((1, 2), "tuple keys are not valid json object keys");

        let resp = ApiResponse::ok(data);
        assert_eq!(resp.error_code, CODE_INTERNAL);
        assert_ne!(resp.error_code, CODE_RUNTIME_CALL);
        assert_eq!(resp.data, "response encoding error");
    }

    #[test]
    fn empty_success_carries_empty_string() {
        let json = serde_json::to_value(ApiResponse::empty()).unwrap();
        assert_eq!(json["errorCode"], 0);
        assert_eq!(json["data"], "");
    }
}
