use super::ClientError;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The server returned a full credential pair and the session is live.
    SignedIn,
    /// The account exists but no session was issued; log in next.
    Created { message: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated {
        access_expires_at: Option<DateTime<Utc>>,
    },
}

impl SessionStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated { .. })
    }
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    async fn login(&self, request: LoginInput) -> Result<(), ClientError>;
    async fn register(&self, request: RegisterInput) -> Result<RegisterOutcome, ClientError>;
    async fn logout(&self) -> Result<(), ClientError>;
    fn status(&self) -> SessionStatus;
}
