use crate::domain_model::ApiResponse;
use crate::domain_port::{StorageError, TransportError};
use serde_json::Value;

/// Structured code the judge API uses for an invalid or expired access token.
pub const TOKEN_NOT_VALID: &str = "token_not_valid";

/// A non-2xx response, as reported by the server.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("HTTP {status}: {detail}")]
pub struct ApiError {
    pub status: u16,
    pub code: Option<String>,
    pub detail: String,
    pub body: Value,
}

impl ApiError {
    pub fn from_response(response: &ApiResponse) -> Self {
        let body = &response.body;
        let code = body
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string);
        let detail = body
            .get("detail")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| match body {
                Value::Null => format!("status {}", response.status),
                Value::String(text) => text.clone(),
                other => other.to_string(),
            });

        Self {
            status: response.status,
            code,
            detail,
            body: body.clone(),
        }
    }

    /// True only for the one failure that a credential renewal can fix.
    /// A bare 401 without the structured code is not enough.
    pub fn is_token_invalid(&self) -> bool {
        self.status == 401 && self.code.as_deref() == Some(TOKEN_NOT_VALID)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Api(ApiError),
    #[error("session expired, please log in again")]
    SessionExpired,
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(e) => Some(e),
            _ => None,
        }
    }
}
