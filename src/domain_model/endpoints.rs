use super::SubmissionId;
use serde::Deserialize;

/// Paths of the judge API, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub renew: String,
    pub profile: String,
    pub submit: String,
    pub run: String,
    /// `{id}` is replaced with the submission id.
    pub submission_status: String,
    pub submissions: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "login/".to_string(),
            register: "users/register/".to_string(),
            renew: "users/token/refresh/".to_string(),
            profile: "users/profile/".to_string(),
            submit: "submit/".to_string(),
            run: "run/".to_string(),
            submission_status: "submission/{id}/".to_string(),
            submissions: "submissions/".to_string(),
        }
    }
}

impl Endpoints {
    pub fn submission_status_path(&self, id: SubmissionId) -> String {
        self.submission_status.replace("{id}", &id.to_string())
    }
}
