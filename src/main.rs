use anyhow::{Context, anyhow};
use futures_util::StreamExt;
use judgelink::application_port::*;
use judgelink::client::*;
use judgelink::domain_model::*;
use judgelink::logger::*;
use judgelink::settings::*;
use std::fs;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    debug!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
    };
    logger.reload_from_config(&logger_config)?;

    let client = Client::try_new(&project_settings)?;

    match cli.command {
        Command::Login { username, password } => {
            client
                .session_service
                .login(LoginInput {
                    username: username.clone(),
                    password,
                })
                .await?;
            println!("Logged in as {username}");
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let outcome = client
                .session_service
                .register(RegisterInput {
                    username,
                    email,
                    password,
                })
                .await?;
            match outcome {
                RegisterOutcome::SignedIn => println!("Account created, you are logged in"),
                RegisterOutcome::Created { message } => println!(
                    "{}; log in to continue",
                    message.as_deref().unwrap_or("Account created")
                ),
            }
        }
        Command::Logout => {
            client.session_service.logout().await?;
            println!("Logged out");
        }
        Command::Status => match client.session_service.status() {
            SessionStatus::Unauthenticated => println!("Not logged in"),
            SessionStatus::Authenticated { access_expires_at } => match access_expires_at {
                Some(at) => println!("Logged in, access token expires at {at}"),
                None => println!("Logged in"),
            },
        },
        Command::Profile { bio } => {
            let profile = match bio {
                Some(bio) => {
                    client
                        .profile_service
                        .update_profile(ProfileUpdate { bio })
                        .await?
                }
                None => client.profile_service.get_profile().await?,
            };
            println!("{} (#{})", profile.username, profile.id);
            if let Some(email) = &profile.email {
                println!("  email:  {email}");
            }
            println!("  bio:    {}", profile.bio.as_deref().unwrap_or(""));
            println!("  streak: {}", profile.streak);
        }
        Command::Submit {
            problem,
            language,
            file,
            no_wait,
        } => {
            let language: Language = language.parse()?;
            let code = fs::read_to_string(&file).with_context(|| format!("reading {file}"))?;
            let id = client
                .judge_service
                .submit(SubmitInput {
                    problem_code: ProblemCode(problem),
                    language,
                    code,
                })
                .await?;
            println!("Submitted as #{id}");
            if !no_wait {
                follow(&client, id).await?;
            }
        }
        Command::Track { id } => follow(&client, SubmissionId(id)).await?,
        Command::Run {
            language,
            file,
            input,
        } => {
            let language: Language = language.parse()?;
            let code = fs::read_to_string(&file).with_context(|| format!("reading {file}"))?;
            let input = match input {
                Some(path) => {
                    fs::read_to_string(&path).with_context(|| format!("reading {path}"))?
                }
                None => String::new(),
            };
            let output = client
                .judge_service
                .run(RunInput {
                    language,
                    code,
                    input,
                })
                .await?;
            print!("{}", output.output);
            if let Some(error) = output.error {
                eprintln!("{error}");
            }
        }
        Command::Submissions { problem } => {
            let submissions = client
                .judge_service
                .list_submissions(&ProblemCode(problem))
                .await?;
            if submissions.is_empty() {
                println!("No submissions");
            }
            for s in submissions {
                let when = s
                    .submitted_at
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "#{:<6} {:<7} {:<8} {}",
                    s.id.0,
                    s.language.as_str(),
                    s.verdict.code(),
                    when
                );
            }
        }
        Command::Draft { action } => match action {
            DraftAction::Save {
                problem,
                language,
                file,
            } => {
                let key = DraftKey::new(ProblemCode(problem), language.parse()?);
                let code = fs::read_to_string(&file).with_context(|| format!("reading {file}"))?;
                client.drafts.save(&key, &code)?;
                println!("Draft saved");
            }
            DraftAction::Show { problem, language } => {
                let key = DraftKey::new(ProblemCode(problem), language.parse()?);
                match client.drafts.load(&key)? {
                    Some(code) => print!("{code}"),
                    None => println!("No draft"),
                }
            }
        },
    }

    Ok(())
}

/// Print tracker states until the verdict arrives. Ctrl-C stops tracking.
async fn follow(client: &Client, id: SubmissionId) -> anyhow::Result<()> {
    let mut tracking = client.tracker.track(id);
    let cancel = tracking.cancel_handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    while let Some(state) = tracking.next().await {
        match state {
            TrackerState::Created => {}
            TrackerState::Polling => println!("Waiting for verdict on #{id}..."),
            TrackerState::Resolved(verdict) => println!("Verdict: {verdict}"),
            TrackerState::Cancelled => println!("Stopped tracking #{id}"),
            TrackerState::Failed(failure) => return Err(anyhow!(failure)),
        }
    }
    Ok(())
}
