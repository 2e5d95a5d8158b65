use crate::domain_model::{ApiRequest, ApiResponse};

/// Network-level failures. Any response the server actually produced, whatever
/// its status, is an `ApiResponse` rather than a `TransportError`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("server unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("network error: {0}")]
    Network(String),
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send the request exactly as given. Implementations must not add or
    /// remove credentials.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}
