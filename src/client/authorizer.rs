use super::{Middleware, Next};
use crate::application_port::ClientError;
use crate::domain_model::{ApiRequest, ApiResponse};
use crate::domain_port::CredentialStore;
use std::sync::Arc;

/// Attaches the current access token to outgoing requests.
pub struct RequestAuthorizer {
    store: Arc<dyn CredentialStore>,
}

impl RequestAuthorizer {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Overwrites whatever credential the request carried. Without a session
    /// the request goes out unauthenticated.
    pub fn authorize(&self, request: &mut ApiRequest) {
        request.authorization = self.store.get().map(|pair| pair.access);
    }
}

#[async_trait::async_trait]
impl Middleware for RequestAuthorizer {
    async fn handle(
        &self,
        mut request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, ClientError> {
        self.authorize(&mut request);
        next.run(request).await
    }
}
