use super::ClientError;
use crate::domain_model::{Profile, ProfileUpdate};

#[async_trait::async_trait]
pub trait ProfileService: Send + Sync {
    async fn get_profile(&self) -> Result<Profile, ClientError>;
    async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, ClientError>;
}
