//! Response envelope and error mapping.

use std::collections::HashMap;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;

use taskmesh_core::api::ApiResponse;
use taskmesh_core::CoreError;

/// Result type for API handlers.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Wrap `data` in a success envelope.
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

/// Error rendered as `{success:false, error, code}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::MissingField(_) | CoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::NodeNotFound(_)
            | CoreError::RegistrationNotFound(_)
            | CoreError::TaskNotFound(_)
            | CoreError::AgentNotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::InvalidTransition { .. }
            | CoreError::AlreadyClaimed { .. }
            | CoreError::NotPending { .. } => StatusCode::CONFLICT,
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(status = %self.status, code = self.code, error = %self.message, "Request failed");
        let body = ApiResponse::<()>::err(self.code, self.message);
        (self.status, Json(body)).into_response()
    }
}

/// Collect repeated `label=key:value` query pairs into a map.
///
/// Values may themselves contain `:`; only the first one splits.
pub fn parse_label_filter(params: &[(String, String)]) -> Result<HashMap<String, String>, ApiError> {
    let mut labels = HashMap::new();
    for (name, value) in params {
        if name != "label" {
            continue;
        }
        let (key, val) = value
            .split_once(':')
            .filter(|(k, _)| !k.is_empty())
            .ok_or_else(|| {
                ApiError::bad_request(format!("label filter must be key:value, got {value:?}"))
            })?;
        labels.insert(key.to_string(), val.to_string());
    }
    Ok(labels)
}

/// Last value of query parameter `name`, if present.
pub fn query_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .rev()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}
