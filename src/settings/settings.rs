use crate::domain_model::{Endpoints, RefreshPolicy};
use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub api: Api,
    pub transport: Transport,
    pub session: Session,
    #[serde(default)]
    pub tracker: Tracker,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Api {
    pub base_url: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub endpoints: Endpoints,
}

#[derive(Debug, Deserialize)]
pub struct Transport {
    pub backend: String, // "fake" or "real"
}

#[derive(Debug, Deserialize)]
pub struct Session {
    /// Durable key/value file holding tokens and drafts.
    pub state_path: String,
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Tracker {
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl Default for Tracker {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            max_polls: 200,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_settings_fill_defaults() {
        let file = write_settings(
            r#"
            [api]
            base_url = "http://127.0.0.1:8000/api/"
            timeout_secs = 10

            [transport]
            backend = "real"

            [session]
            state_path = "state.json"

            [log]
            filter = "info"
            "#,
        );

        let settings = parse_settings(file.path().to_str()).unwrap();

        assert_eq!(settings.api.endpoints, Endpoints::default());
        assert_eq!(settings.session.refresh_policy, RefreshPolicy::Rotate);
        assert_eq!(settings.tracker.poll_interval_ms, 3000);
        assert_eq!(settings.tracker.max_polls, 200);
    }

    #[test]
    fn test_endpoint_and_policy_overrides() {
        let file = write_settings(
            r#"
            [api]
            base_url = "https://judge.example.com/api/"
            timeout_secs = 5

            [api.endpoints]
            renew = "auth/refresh/"

            [transport]
            backend = "fake"

            [session]
            state_path = "state.json"
            refresh_policy = "keep"

            [tracker]
            poll_interval_ms = 500

            [log]
            filter = "debug"
            "#,
        );

        let settings = parse_settings(file.path().to_str()).unwrap();

        assert_eq!(settings.api.endpoints.renew, "auth/refresh/");
        assert_eq!(settings.api.endpoints.login, "login/");
        assert_eq!(settings.session.refresh_policy, RefreshPolicy::Keep);
        assert_eq!(settings.tracker.poll_interval_ms, 500);
        assert_eq!(settings.tracker.max_polls, 200);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(parse_settings(Some("does/not/exist.toml")).is_err());
    }
}
