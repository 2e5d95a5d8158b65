use crate::application_port::{ApiError, ClientError};
use crate::domain_model::{ApiRequest, ApiResponse};
use crate::domain_port::Transport;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// One stage wrapped around the transport call.
///
/// A middleware may change the request, inspect or replace the outcome, and
/// call `next` more than once.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, ClientError>;
}

/// The remainder of the pipeline after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub async fn run(self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        match self.middlewares.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    middlewares: rest,
                    transport: self.transport,
                };
                head.handle(request, next).await
            }
            None => {
                debug!(
                    request_id = %request.id,
                    method = %request.method,
                    path = %request.path,
                    authorized = request.authorization.is_some(),
                    retried = request.retried,
                    "sending request"
                );
                let response = self.transport.send(&request).await?;
                debug!(request_id = %request.id, status = response.status, "response received");

                if response.is_success() {
                    Ok(response)
                } else {
                    Err(ClientError::Api(ApiError::from_response(&response)))
                }
            }
        }
    }
}

/// Ordered middlewares in front of a transport. The first middleware added
/// sees the request first and the outcome last.
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            middlewares: Vec::new(),
            transport,
        }
    }

    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let next = Next {
            middlewares: &self.middlewares,
            transport: self.transport.as_ref(),
        };
        next.run(request).await
    }

    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ClientError> {
        let response = self.execute(request).await?;
        serde_json::from_value(response.body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}
