use crate::application_port::{ClientError, ProfileService};
use crate::client::Pipeline;
use crate::domain_model::{ApiRequest, Endpoints, Profile, ProfileUpdate};
use std::sync::Arc;

pub struct RealProfileService {
    pipeline: Arc<Pipeline>,
    endpoints: Endpoints,
}

impl RealProfileService {
    pub fn new(pipeline: Arc<Pipeline>, endpoints: Endpoints) -> RealProfileService {
        RealProfileService {
            pipeline,
            endpoints,
        }
    }
}

#[async_trait::async_trait]
impl ProfileService for RealProfileService {
    async fn get_profile(&self) -> Result<Profile, ClientError> {
        self.pipeline
            .execute_json(ApiRequest::get(self.endpoints.profile.as_str()))
            .await
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, ClientError> {
        let body = serde_json::to_value(&update).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.pipeline
            .execute_json(ApiRequest::put(self.endpoints.profile.as_str(), body))
            .await
    }
}
