use crate::application_port::{
    ClientError, LoginInput, RegisterInput, RegisterOutcome, SessionService, SessionStatus,
};
use crate::client::Pipeline;
use crate::domain_model::{ApiRequest, CredentialPair, Endpoints};
use crate::domain_port::CredentialStore;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Login, registration and logout against the judge API.
///
/// `public` must not carry credentials: login and register are sent
/// unauthenticated so a stale token can never trigger a renewal here.
pub struct RealSessionService {
    public: Arc<Pipeline>,
    store: Arc<dyn CredentialStore>,
    endpoints: Endpoints,
}

impl RealSessionService {
    pub fn new(
        public: Arc<Pipeline>,
        store: Arc<dyn CredentialStore>,
        endpoints: Endpoints,
    ) -> RealSessionService {
        RealSessionService {
            public,
            store,
            endpoints,
        }
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ClientError> {
        serde_json::to_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl SessionService for RealSessionService {
    async fn login(&self, request: LoginInput) -> Result<(), ClientError> {
        let username = request.username.clone();
        let body = Self::to_json(&request)?;

        let tokens: LoginResponse = self
            .public
            .execute_json(ApiRequest::post(self.endpoints.login.as_str(), body))
            .await?;

        self.store
            .set(CredentialPair::new(tokens.access, tokens.refresh))?;
        info!(%username, "logged in");
        Ok(())
    }

    async fn register(&self, request: RegisterInput) -> Result<RegisterOutcome, ClientError> {
        let username = request.username.clone();
        let body = Self::to_json(&request)?;

        let response: RegisterResponse = self
            .public
            .execute_json(ApiRequest::post(self.endpoints.register.as_str(), body))
            .await?;

        match (response.token, response.refresh) {
            (Some(access), Some(refresh)) => {
                self.store.set(CredentialPair::new(access, refresh))?;
                info!(%username, "registered and signed in");
                Ok(RegisterOutcome::SignedIn)
            }
            (access, refresh) => {
                if access.is_some() || refresh.is_some() {
                    warn!(%username, "registration returned half a credential pair, ignoring it");
                }
                info!(%username, "registered");
                Ok(RegisterOutcome::Created {
                    message: response.message,
                })
            }
        }
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.store.clear()?;
        info!("logged out");
        Ok(())
    }

    fn status(&self) -> SessionStatus {
        match self.store.get() {
            Some(pair) => SessionStatus::Authenticated {
                access_expires_at: pair.access.expires_at(),
            },
            None => SessionStatus::Unauthenticated,
        }
    }
}
