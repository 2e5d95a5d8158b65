use crate::application_port::{ClientError, JudgeService, RunInput, RunOutput, SubmitInput};
use crate::client::Pipeline;
use crate::domain_model::{
    ApiRequest, Endpoints, ProblemCode, SubmissionId, SubmissionStatus, SubmissionSummary,
};
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    submission_id: SubmissionId,
}

pub struct RealJudgeService {
    pipeline: Arc<Pipeline>,
    endpoints: Endpoints,
}

impl RealJudgeService {
    pub fn new(pipeline: Arc<Pipeline>, endpoints: Endpoints) -> RealJudgeService {
        RealJudgeService {
            pipeline,
            endpoints,
        }
    }

    fn to_json<T: Serialize>(value: &T) -> Result<Value, ClientError> {
        serde_json::to_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl JudgeService for RealJudgeService {
    async fn submit(&self, request: SubmitInput) -> Result<SubmissionId, ClientError> {
        let body = Self::to_json(&request)?;
        let response: SubmitResponse = self
            .pipeline
            .execute_json(ApiRequest::post(self.endpoints.submit.as_str(), body))
            .await?;

        info!(
            submission_id = %response.submission_id,
            problem = %request.problem_code,
            language = %request.language,
            "submitted"
        );
        Ok(response.submission_id)
    }

    async fn run(&self, request: RunInput) -> Result<RunOutput, ClientError> {
        let body = Self::to_json(&request)?;
        self.pipeline
            .execute_json(ApiRequest::post(self.endpoints.run.as_str(), body))
            .await
    }

    async fn submission_status(&self, id: SubmissionId) -> Result<SubmissionStatus, ClientError> {
        self.pipeline
            .execute_json(ApiRequest::get(self.endpoints.submission_status_path(id)))
            .await
    }

    async fn list_submissions(
        &self,
        problem: &ProblemCode,
    ) -> Result<Vec<SubmissionSummary>, ClientError> {
        let request = ApiRequest::get(self.endpoints.submissions.as_str())
            .with_query("problem", problem.0.as_str());
        self.pipeline.execute_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::{ApiResponse, Language, Verdict};
    use crate::domain_port::{Transport, TransportError};
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingTransport {
        body: Value,
        seen: Mutex<Vec<ApiRequest>>,
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(ApiResponse::new(200, self.body.clone()))
        }
    }

    fn create_service(body: Value) -> (Arc<RecordingTransport>, RealJudgeService) {
        let transport = Arc::new(RecordingTransport {
            body,
            seen: Mutex::new(Vec::new()),
        });
        let service = RealJudgeService::new(
            Arc::new(Pipeline::new(transport.clone())),
            Endpoints::default(),
        );
        (transport, service)
    }

    #[tokio::test]
    async fn test_submit_posts_code_and_returns_id() {
        let (transport, service) = create_service(json!({ "submission_id": 42 }));

        let id = service
            .submit(SubmitInput {
                problem_code: ProblemCode("A".into()),
                language: Language::Python,
                code: "print(1)".into(),
            })
            .await
            .unwrap();

        assert_eq!(id, SubmissionId(42));
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].path, "submit/");
        assert_eq!(
            seen[0].body,
            Some(json!({ "problem_code": "A", "language": "python", "code": "print(1)" }))
        );
    }

    #[tokio::test]
    async fn test_status_uses_submission_path() {
        let (transport, service) = create_service(json!({ "id": 42, "verdict": "WA" }));

        let status = service.submission_status(SubmissionId(42)).await.unwrap();

        assert_eq!(status.verdict, Verdict::WrongAnswer);
        assert_eq!(transport.seen.lock().unwrap()[0].path, "submission/42/");
    }

    #[tokio::test]
    async fn test_list_submissions_filters_by_problem() {
        let (transport, service) = create_service(json!([
            { "id": 1, "language": "cpp", "verdict": "AC", "code": "int main(){}" }
        ]));

        let list = service
            .list_submissions(&ProblemCode("B".into()))
            .await
            .unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].language, Language::Cpp);
        assert_eq!(
            transport.seen.lock().unwrap()[0].query,
            vec![("problem".to_string(), "B".to_string())]
        );
    }
}
