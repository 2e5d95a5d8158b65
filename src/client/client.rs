use super::*;
use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::{DRAFT_KEY_PREFIX, Endpoints, RefreshPolicy};
use crate::domain_port::*;
use crate::infra_http::*;
use crate::infra_storage::*;
use crate::settings::Settings;
use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Account seeded into the in-process backend so the fake transport can be
/// used straight away.
pub const FAKE_DEMO_USERNAME: &str = "demo";
pub const FAKE_DEMO_PASSWORD: &str = "demo1234";

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub endpoints: Endpoints,
    pub refresh_policy: RefreshPolicy,
    pub tracker: TrackerConfig,
}

impl ClientOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            endpoints: settings.api.endpoints.clone(),
            refresh_policy: settings.session.refresh_policy,
            tracker: TrackerConfig {
                poll_interval: Duration::from_millis(settings.tracker.poll_interval_ms),
                max_polls: settings.tracker.max_polls,
            },
        }
    }
}

pub struct Client {
    pub session_service: Arc<dyn SessionService>,
    pub profile_service: Arc<dyn ProfileService>,
    pub judge_service: Arc<dyn JudgeService>,
    pub drafts: Arc<dyn DraftStore>,
    pub tracker: SubmissionTracker,
    credentials: Arc<dyn CredentialStore>,
    renewal: Arc<RenewalCoordinator>,
}

/// In-process backend seeded with the demo account. It rotates refresh
/// tokens only when the client adopts rotated ones.
fn fake_backend(options: &ClientOptions) -> FakeJudgeServer {
    let config = FakeJudgeConfig {
        rotate_refresh_tokens: options.refresh_policy == RefreshPolicy::Rotate,
        ..FakeJudgeConfig::default()
    };
    FakeJudgeServer::new(config, options.endpoints.clone()).with_account(
        FAKE_DEMO_USERNAME,
        "demo@example.com",
        FAKE_DEMO_PASSWORD,
    )
}

impl Client {
    pub fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let options = ClientOptions::from_settings(settings);

        let transport: Arc<dyn Transport> = match settings.transport.backend.as_str() {
            "fake" => Arc::new(fake_backend(&options)),
            "real" => Arc::new(ReqwestTransport::new(
                &settings.api.base_url,
                Duration::from_secs(settings.api.timeout_secs),
            )?),
            other => return Err(anyhow!("Unknown transport backend: {}", other)),
        };
        info!(backend = %settings.transport.backend, "transport ready");

        let storage: Arc<dyn LocalStorage> =
            Arc::new(JsonFileStorage::open(&settings.session.state_path)?);

        Ok(Self::assemble(transport, storage, options)?)
    }

    /// Wire the client around an existing transport and storage.
    pub fn assemble(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn LocalStorage>,
        options: ClientOptions,
    ) -> Result<Self, StorageError> {
        // region session
        let credentials: Arc<dyn CredentialStore> = Arc::new(
            PersistentCredentialStore::load(storage.clone())?.with_linked_prefix(DRAFT_KEY_PREFIX),
        );
        let drafts: Arc<dyn DraftStore> = Arc::new(PersistentDraftStore::new(storage));
        // endregion

        // region pipelines
        let authorizer = Arc::new(RequestAuthorizer::new(credentials.clone()));
        let renewal = Arc::new(RenewalCoordinator::new(
            credentials.clone(),
            authorizer.clone(),
            transport.clone(),
            options.endpoints.renew.as_str(),
            options.refresh_policy,
        ));
        let authenticated = Arc::new(
            Pipeline::new(transport.clone())
                .with(authorizer)
                .with(renewal.clone()),
        );
        let public = Arc::new(Pipeline::new(transport));
        // endregion

        let session_service: Arc<dyn SessionService> = Arc::new(RealSessionService::new(
            public,
            credentials.clone(),
            options.endpoints.clone(),
        ));
        let profile_service: Arc<dyn ProfileService> = Arc::new(RealProfileService::new(
            authenticated.clone(),
            options.endpoints.clone(),
        ));
        let judge_service: Arc<dyn JudgeService> = Arc::new(RealJudgeService::new(
            authenticated,
            options.endpoints,
        ));
        let tracker = SubmissionTracker::new(judge_service.clone(), options.tracker);

        Ok(Self {
            session_service,
            profile_service,
            judge_service,
            drafts,
            tracker,
            credentials,
            renewal,
        })
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Renewal calls made by this client since it was built.
    pub fn renewals_started(&self) -> u64 {
        self.renewal.renewals_started()
    }
}
