use super::{Middleware, Next, RequestAuthorizer};
use crate::application_port::{ApiError, ClientError};
use crate::domain_model::{
    AccessToken, ApiRequest, ApiResponse, CredentialPair, RefreshPolicy, RefreshToken,
};
use crate::domain_port::{CredentialStore, Transport};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct RenewResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// Outcome of one renewal, shared by every request waiting on it.
/// `true` means the store holds the renewed pair.
type RenewalFlight = Shared<BoxFuture<'static, bool>>;

/// Recovers from expired access tokens by renewing the session once and
/// replaying the failed request.
///
/// Renewals are single-flight: the first request to see `token_not_valid`
/// spawns the renewal as its own task and parks it in `in_flight`, and every
/// other failing request awaits the same task. Dropping any caller leaves the
/// task running. A request that finds no renewal in flight compares the token
/// it was sent with against the store:
/// - a different token means the session was renewed, so it replays;
/// - an empty store means the renewal failed and the session is gone.
///
/// The task writes the store and empties `in_flight` under the same lock, so
/// no request can miss a finished renewal and start another one.
pub struct RenewalCoordinator {
    renewer: Arc<Renewer>,
    authorizer: Arc<RequestAuthorizer>,
}

struct Renewer {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    renew_path: String,
    policy: RefreshPolicy,
    in_flight: Mutex<Option<RenewalFlight>>,
    renewals_started: AtomicU64,
}

impl RenewalCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        authorizer: Arc<RequestAuthorizer>,
        transport: Arc<dyn Transport>,
        renew_path: impl Into<String>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            renewer: Arc::new(Renewer {
                store,
                transport,
                renew_path: renew_path.into(),
                policy,
                in_flight: Mutex::new(None),
                renewals_started: AtomicU64::new(0),
            }),
            authorizer,
        }
    }

    /// Number of calls made to the renewal endpoint so far.
    pub fn renewals_started(&self) -> u64 {
        self.renewer.renewals_started.load(Ordering::SeqCst)
    }

    async fn await_renewal(
        &self,
        sent_with: Option<&AccessToken>,
        rejected: ApiError,
    ) -> Result<(), ClientError> {
        let flight = {
            let mut in_flight = self.renewer.lock_in_flight();
            match self.renewer.store.get() {
                Some(pair) if Some(&pair.access) != sent_with => {
                    debug!("session already renewed, replaying with current token");
                    return Ok(());
                }
                Some(pair) => in_flight
                    .get_or_insert_with(|| Arc::clone(&self.renewer).start(pair))
                    .clone(),
                None if sent_with.is_some() => return Err(ClientError::SessionExpired),
                // never had a session; nothing to renew
                None => return Err(ClientError::Api(rejected)),
            }
        };

        if flight.await {
            Ok(())
        } else {
            Err(ClientError::SessionExpired)
        }
    }
}

impl Renewer {
    fn lock_in_flight(&self) -> MutexGuard<'_, Option<RenewalFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(self: Arc<Self>, current: CredentialPair) -> RenewalFlight {
        let attempt = self.renewals_started.fetch_add(1, Ordering::SeqCst) + 1;
        info!(attempt, "access token rejected, renewing session");

        tokio::spawn(async move {
            let exchanged = self.exchange(&current).await;
            self.settle(attempt, exchanged)
        })
        .map(|joined| joined.unwrap_or(false))
        .boxed()
        .shared()
    }

    fn settle(&self, attempt: u64, exchanged: Result<CredentialPair, ClientError>) -> bool {
        let mut in_flight = self.lock_in_flight();

        let renewed = match exchanged {
            Ok(pair) => self.store.set(pair).map_err(ClientError::from),
            Err(e) => Err(e),
        };
        let renewed = match renewed {
            Ok(()) => {
                info!(attempt, "session renewed");
                true
            }
            Err(e) => {
                warn!(attempt, error = %e, "session renewal failed, tearing down session");
                if let Err(clear_err) = self.store.clear() {
                    warn!(error = %clear_err, "failed to remove persisted session");
                }
                false
            }
        };

        in_flight.take();
        renewed
    }

    async fn exchange(&self, current: &CredentialPair) -> Result<CredentialPair, ClientError> {
        let request = ApiRequest::post(
            self.renew_path.as_str(),
            json!({ "refresh": current.refresh.0 }),
        );
        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(ClientError::Api(ApiError::from_response(&response)));
        }

        let body: RenewResponse = serde_json::from_value(response.body)
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        Ok(self.policy.renewed_pair(
            current,
            AccessToken(body.access),
            body.refresh.map(RefreshToken),
        ))
    }
}

#[async_trait::async_trait]
impl Middleware for RenewalCoordinator {
    async fn handle(
        &self,
        mut request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, ClientError> {
        let rejected = match next.run(request.clone()).await {
            Err(ClientError::Api(error)) if error.is_token_invalid() && !request.retried => error,
            outcome => return outcome,
        };

        request.mark_retried();
        debug!(request_id = %request.id, path = %request.path, "access token rejected");

        self.await_renewal(request.authorization.as_ref(), rejected)
            .await?;

        self.authorizer.authorize(&mut request);
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Pipeline;
    use crate::domain_port::TransportError;
    use crate::infra_storage::{MemoryStorage, PersistentCredentialStore};
    use futures_util::future::join_all;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::Barrier;

    const RENEW: &str = "users/token/refresh/";

    #[derive(Clone, Copy)]
    enum RenewBehavior {
        Grant,
        Reject,
        NetworkDown,
    }

    /// Protected resources accept only the token "fresh". Requests carrying
    /// "stale" are rejected with `token_not_valid`, optionally after waiting on
    /// a barrier so that a whole batch fails at the same moment. Refresh tokens
    /// are single use, as with a rotating server.
    struct ScriptedApi {
        renew: RenewBehavior,
        barrier: Option<Barrier>,
        calls: StdMutex<HashMap<String, usize>>,
        used_refresh: StdMutex<HashSet<String>>,
    }

    impl ScriptedApi {
        fn new(renew: RenewBehavior) -> Self {
            Self {
                renew,
                barrier: None,
                calls: StdMutex::new(HashMap::new()),
                used_refresh: StdMutex::new(HashSet::new()),
            }
        }

        fn with_barrier(mut self, parties: usize) -> Self {
            self.barrier = Some(Barrier::new(parties));
            self
        }

        fn calls(&self, path: &str) -> usize {
            self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
        }

        fn token_not_valid() -> ApiResponse {
            ApiResponse::new(
                401,
                json!({ "detail": "Given token not valid for any token type", "code": "token_not_valid" }),
            )
        }

        async fn protected(&self, request: &ApiRequest) -> ApiResponse {
            match request.authorization.as_ref().map(|t| t.0.as_str()) {
                Some("fresh") => ApiResponse::new(200, json!({ "ok": true })),
                Some(_) => {
                    if let Some(barrier) = &self.barrier {
                        barrier.wait().await;
                    }
                    Self::token_not_valid()
                }
                None => ApiResponse::new(
                    401,
                    json!({ "detail": "Authentication credentials were not provided.", "code": "not_authenticated" }),
                ),
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedApi {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(request.path.clone())
                .or_default() += 1;

            match request.path.as_str() {
                RENEW => {
                    let refresh = request
                        .body
                        .as_ref()
                        .and_then(|body| body["refresh"].as_str())
                        .unwrap_or_default()
                        .to_string();
                    let first_use = self.used_refresh.lock().unwrap().insert(refresh);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    if !first_use {
                        return Ok(Self::token_not_valid());
                    }
                    match self.renew {
                        RenewBehavior::Grant => Ok(ApiResponse::new(
                            200,
                            json!({ "access": "fresh", "refresh": "r2" }),
                        )),
                        RenewBehavior::Reject => Ok(Self::token_not_valid()),
                        RenewBehavior::NetworkDown => {
                            Err(TransportError::Unreachable("connection refused".into()))
                        }
                    }
                }
                "data/" => Ok(self.protected(request).await),
                "slow/" => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(self.protected(request).await)
                }
                "always_401/" => Ok(Self::token_not_valid()),
                "bad/" => Ok(ApiResponse::new(400, json!({ "detail": "malformed input" }))),
                _ => Ok(ApiResponse::new(404, json!({ "detail": "Not found." }))),
            }
        }
    }

    #[derive(Clone)]
    struct Harness {
        api: Arc<ScriptedApi>,
        store: Arc<PersistentCredentialStore>,
        coordinator: Arc<RenewalCoordinator>,
        pipeline: Arc<Pipeline>,
    }

    fn create_harness(api: ScriptedApi, policy: RefreshPolicy) -> Harness {
        let api = Arc::new(api);
        let store =
            Arc::new(PersistentCredentialStore::load(Arc::new(MemoryStorage::new())).unwrap());
        store.set(CredentialPair::new("stale", "r1")).unwrap();

        let authorizer = Arc::new(RequestAuthorizer::new(store.clone()));
        let coordinator = Arc::new(RenewalCoordinator::new(
            store.clone(),
            authorizer.clone(),
            api.clone(),
            RENEW,
            policy,
        ));
        let pipeline = Arc::new(
            Pipeline::new(api.clone())
                .with(authorizer)
                .with(coordinator.clone()),
        );

        Harness {
            api,
            store,
            coordinator,
            pipeline,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_is_renewed_and_request_replayed() {
        let h = create_harness(ScriptedApi::new(RenewBehavior::Grant), RefreshPolicy::Rotate);

        let response = h.pipeline.execute(ApiRequest::get("data/")).await.unwrap();

        assert_eq!(response.body, json!({ "ok": true }));
        assert_eq!(h.api.calls(RENEW), 1);
        assert_eq!(h.api.calls("data/"), 2);
        assert_eq!(h.store.get(), Some(CredentialPair::new("fresh", "r2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_share_a_single_renewal() {
        const N: usize = 8;
        let h = create_harness(
            ScriptedApi::new(RenewBehavior::Grant).with_barrier(N),
            RefreshPolicy::Rotate,
        );

        let results = join_all((0..N).map(|_| h.pipeline.execute(ApiRequest::get("data/")))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(h.api.calls(RENEW), 1);
        assert_eq!(h.coordinator.renewals_started(), 1);
        assert_eq!(h.api.calls("data/"), 2 * N);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_renewal_fails_every_waiter_and_clears_session() {
        const N: usize = 3;
        let h = create_harness(
            ScriptedApi::new(RenewBehavior::Reject).with_barrier(N),
            RefreshPolicy::Rotate,
        );

        let results = join_all((0..N).map(|_| h.pipeline.execute(ApiRequest::get("data/")))).await;

        assert!(
            results
                .iter()
                .all(|r| matches!(r, Err(ClientError::SessionExpired)))
        );
        assert_eq!(h.api.calls(RENEW), 1);
        assert!(h.store.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_during_renewal_expires_session() {
        let h = create_harness(
            ScriptedApi::new(RenewBehavior::NetworkDown),
            RefreshPolicy::Rotate,
        );

        let result = h.pipeline.execute(ApiRequest::get("data/")).await;

        assert!(matches!(result, Err(ClientError::SessionExpired)));
        assert!(h.store.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_auth_error_propagates_unchanged() {
        let h = create_harness(ScriptedApi::new(RenewBehavior::Grant), RefreshPolicy::Rotate);

        let err = h.pipeline.execute(ApiRequest::get("bad/")).await.unwrap_err();

        let api = err.api_error().unwrap();
        assert_eq!(api.status, 400);
        assert_eq!(api.detail, "malformed input");
        assert_eq!(h.api.calls(RENEW), 0);
        assert_eq!(h.store.get(), Some(CredentialPair::new("stale", "r1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replayed_request_is_not_retried_again() {
        let h = create_harness(ScriptedApi::new(RenewBehavior::Grant), RefreshPolicy::Rotate);

        let err = h
            .pipeline
            .execute(ApiRequest::get("always_401/"))
            .await
            .unwrap_err();

        assert!(err.api_error().unwrap().is_token_invalid());
        assert_eq!(h.api.calls("always_401/"), 2);
        assert_eq!(h.api.calls(RENEW), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_already_marked_retried_is_not_renewed() {
        let h = create_harness(ScriptedApi::new(RenewBehavior::Grant), RefreshPolicy::Rotate);
        let mut request = ApiRequest::get("data/");
        request.mark_retried();

        let err = h.pipeline.execute(request).await.unwrap_err();

        assert!(err.api_error().unwrap().is_token_invalid());
        assert_eq!(h.api.calls(RENEW), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_401_does_not_renew() {
        let h = create_harness(ScriptedApi::new(RenewBehavior::Grant), RefreshPolicy::Rotate);
        h.store.clear().unwrap();

        let err = h.pipeline.execute(ApiRequest::get("data/")).await.unwrap_err();

        assert_eq!(err.api_error().unwrap().code.as_deref(), Some("not_authenticated"));
        assert_eq!(h.api.calls(RENEW), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_after_renewal_replays_without_renewing() {
        let h = create_harness(ScriptedApi::new(RenewBehavior::Grant), RefreshPolicy::Rotate);

        let (slow, fast) = tokio::join!(
            h.pipeline.execute(ApiRequest::get("slow/")),
            h.pipeline.execute(ApiRequest::get("data/")),
        );

        assert!(slow.is_ok());
        assert!(fast.is_ok());
        assert_eq!(h.api.calls(RENEW), 1);
        assert_eq!(h.api.calls("slow/"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_policy_retains_login_refresh_token() {
        let h = create_harness(ScriptedApi::new(RenewBehavior::Grant), RefreshPolicy::Keep);

        h.pipeline.execute(ApiRequest::get("data/")).await.unwrap();

        assert_eq!(h.store.get(), Some(CredentialPair::new("fresh", "r1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_the_first_caller_does_not_abort_its_renewal() {
        let h = create_harness(ScriptedApi::new(RenewBehavior::Grant), RefreshPolicy::Rotate);

        let first = tokio::spawn({
            let h = h.clone();
            async move { h.pipeline.execute(ApiRequest::get("data/")).await }
        });
        tokio::time::sleep(Duration::from_millis(3)).await;
        let second = tokio::spawn({
            let h = h.clone();
            async move { h.pipeline.execute(ApiRequest::get("data/")).await }
        });
        // the renewal answers at 10ms
        tokio::time::sleep(Duration::from_millis(5)).await;
        first.abort();

        let second = second.await.unwrap();

        assert_eq!(second.unwrap().body, json!({ "ok": true }));
        assert_eq!(h.api.calls(RENEW), 1);
        assert_eq!(h.coordinator.renewals_started(), 1);
        assert_eq!(h.store.get(), Some(CredentialPair::new("fresh", "r2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_survives_when_every_caller_is_dropped() {
        let h = create_harness(ScriptedApi::new(RenewBehavior::Grant), RefreshPolicy::Rotate);

        let caller = tokio::spawn({
            let h = h.clone();
            async move { h.pipeline.execute(ApiRequest::get("data/")).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        caller.abort();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(h.store.get(), Some(CredentialPair::new("fresh", "r2")));

        let response = h.pipeline.execute(ApiRequest::get("data/")).await.unwrap();
        assert_eq!(response.body, json!({ "ok": true }));
        assert_eq!(h.api.calls(RENEW), 1);
    }
}
