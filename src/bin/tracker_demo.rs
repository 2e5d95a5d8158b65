use futures_util::StreamExt;
use judgelink::application_port::*;
use judgelink::client::*;
use judgelink::domain_model::*;
use judgelink::infra_http::*;
use judgelink::infra_storage::*;
use judgelink::logger::*;
use std::sync::Arc;
use std::time::Duration;

// $ cargo run --bin tracker_demo
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    logger.reload_from_config(&LogConfig {
        filter: "judgelink=debug,info".to_string(),
    })?;

    let server = Arc::new(
        FakeJudgeServer::new(
            FakeJudgeConfig {
                pending_polls: 3,
                latency: Duration::from_millis(50),
                ..FakeJudgeConfig::default()
            },
            Endpoints::default(),
        )
        .with_account(FAKE_DEMO_USERNAME, "demo@example.com", FAKE_DEMO_PASSWORD),
    );
    let options = ClientOptions {
        tracker: TrackerConfig {
            poll_interval: Duration::from_millis(300),
            max_polls: 20,
        },
        ..ClientOptions::default()
    };
    let client = Client::assemble(server.clone(), Arc::new(MemoryStorage::new()), options)?;

    client
        .session_service
        .login(LoginInput {
            username: FAKE_DEMO_USERNAME.to_string(),
            password: FAKE_DEMO_PASSWORD.to_string(),
        })
        .await?;
    info!(status = ?client.session_service.status(), "logged in");

    let id = client
        .judge_service
        .submit(SubmitInput {
            problem_code: ProblemCode("A".to_string()),
            language: Language::Python,
            code: "print(sum(map(int, input().split())))".to_string(),
        })
        .await?;

    let mut tracking = client.tracker.track(id);
    while let Some(state) = tracking.next().await {
        info!(?state, "tracker");
        if state == TrackerState::Polling {
            // every token issued so far stops working; the next poll renews
            server.revoke_access_tokens();
        }
    }

    info!(
        renewals = server.renewal_calls(),
        status_queries = server.status_queries(),
        "done"
    );

    // a rejected refresh token ends the session
    server.revoke_access_tokens();
    server.revoke_refresh_tokens();
    match client.profile_service.get_profile().await {
        Err(ClientError::SessionExpired) => info!("session expired as expected"),
        other => warn!(?other, "unexpected result"),
    }
    info!(status = ?client.session_service.status(), "after teardown");

    Ok(())
}
