use super::ClientError;
use crate::domain_model::{
    Language, ProblemCode, SubmissionId, SubmissionStatus, SubmissionSummary,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct SubmitInput {
    pub problem_code: ProblemCode,
    pub language: Language,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunInput {
    pub language: Language,
    pub code: String,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunOutput {
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait::async_trait]
pub trait JudgeService: Send + Sync {
    /// Queue code for grading. The verdict is obtained later by polling.
    async fn submit(&self, request: SubmitInput) -> Result<SubmissionId, ClientError>;
    /// Execute code against ad-hoc input and wait for the output.
    async fn run(&self, request: RunInput) -> Result<RunOutput, ClientError>;
    async fn submission_status(&self, id: SubmissionId) -> Result<SubmissionStatus, ClientError>;
    async fn list_submissions(
        &self,
        problem: &ProblemCode,
    ) -> Result<Vec<SubmissionSummary>, ClientError>;
}
