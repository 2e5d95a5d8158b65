use crate::domain_model::{
    ApiRequest, ApiResponse, Endpoints, Language, Method, SubmissionId, Verdict,
};
use crate::domain_port::{Transport, TransportError};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FakeJudgeConfig {
    pub signing_key: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Status queries answered with `PENDING` before the verdict is revealed.
    pub pending_polls: u32,
    /// Delay before each response is delivered. The request itself takes
    /// effect on arrival.
    pub latency: Duration,
    /// Renewal hands out a new refresh token and the presented one stops
    /// working. Off, renewal returns only an access token and refresh tokens
    /// stay valid until they expire.
    pub rotate_refresh_tokens: bool,
}

impl Default for FakeJudgeConfig {
    fn default() -> Self {
        Self {
            signing_key: b"fake-judge-signing-key".to_vec(),
            access_ttl: Duration::from_secs(5 * 60),
            refresh_ttl: Duration::from_secs(24 * 60 * 60),
            pending_polls: 2,
            latency: Duration::ZERO,
            rotate_refresh_tokens: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
    jti: String,
    token_type: TokenType,
    /// Tokens minted before the last revocation carry an older epoch.
    epoch: u64,
}

#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,
    #[error("Given token not valid for any token type")]
    TokenNotValid,
    #[error("No active account found with the given credentials")]
    NoActiveAccount,
    #[error("invalid fields")]
    Fields(Value),
    #[error("Not found.")]
    NotFound,
    #[error("Method \"{0}\" not allowed.")]
    MethodNotAllowed(Method),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Rejection {
    fn code(&self) -> &'static str {
        match self {
            Rejection::NotAuthenticated => "not_authenticated",
            Rejection::TokenNotValid => "token_not_valid",
            Rejection::NoActiveAccount => "no_active_account",
            Rejection::Fields(_) => "invalid",
            Rejection::NotFound => "not_found",
            Rejection::MethodNotAllowed(_) => "method_not_allowed",
            Rejection::Internal(_) => "error",
        }
    }

    fn into_response(self) -> ApiResponse {
        let status = match &self {
            Rejection::NotAuthenticated | Rejection::TokenNotValid | Rejection::NoActiveAccount => {
                401
            }
            Rejection::Fields(_) => 400,
            Rejection::NotFound => 404,
            Rejection::MethodNotAllowed(_) => 405,
            Rejection::Internal(_) => 500,
        };
        match self {
            Rejection::Fields(body) => ApiResponse::new(status, body),
            other => ApiResponse::new(
                status,
                json!({ "detail": other.to_string(), "code": other.code() }),
            ),
        }
    }
}

fn field_error(field: &str, message: &str) -> Rejection {
    Rejection::Fields(json!({ field: [message] }))
}

fn parse_body<T: DeserializeOwned>(request: &ApiRequest) -> Result<T, Rejection> {
    let body = request.body.clone().unwrap_or(Value::Null);
    serde_json::from_value(body).map_err(|e| Rejection::Fields(json!({ "detail": e.to_string() })))
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RenewBody {
    refresh: String,
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    bio: String,
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    problem_code: String,
    language: Language,
    code: String,
}

#[derive(Debug, Deserialize)]
struct RunBody {
    language: Language,
    code: String,
    #[serde(default)]
    input: String,
}

#[derive(Debug, Clone)]
struct Account {
    id: u64,
    email: String,
    password: String,
    bio: String,
    joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Submission {
    id: u64,
    owner: String,
    problem: String,
    language: Language,
    code: String,
    verdict: Verdict,
    polls: u32,
    submitted_at: DateTime<Utc>,
}

/// Deterministic stand-in for the grader: the verdict depends only on the
/// source text.
fn grade(code: &str) -> Verdict {
    if code.trim().is_empty() {
        Verdict::CompilationError
    } else if code.contains("raise") || code.contains("panic!") {
        Verdict::RuntimeError
    } else if code.contains("while True") || code.contains("loop {}") {
        Verdict::TimeLimitExceeded
    } else {
        Verdict::Accepted
    }
}

/// In-process judge backend speaking the same wire contract as the real API.
///
/// Access and refresh tokens are real HS256 JWTs. `revoke_access_tokens` and
/// `revoke_refresh_tokens` invalidate every token issued so far, which is how
/// tests and the demo force a renewal or a renewal failure.
pub struct FakeJudgeServer {
    config: FakeJudgeConfig,
    endpoints: Endpoints,
    accounts: DashMap<String, Account>,
    submissions: DashMap<u64, Submission>,
    used_refresh: DashSet<String>,
    next_account_id: AtomicU64,
    next_submission_id: AtomicU64,
    access_epoch: AtomicU64,
    refresh_epoch: AtomicU64,
    renewal_calls: AtomicU64,
    status_queries: AtomicU64,
}

impl FakeJudgeServer {
    pub fn new(config: FakeJudgeConfig, endpoints: Endpoints) -> Self {
        Self {
            config,
            endpoints,
            accounts: DashMap::new(),
            submissions: DashMap::new(),
            used_refresh: DashSet::new(),
            next_account_id: AtomicU64::new(1),
            next_submission_id: AtomicU64::new(1),
            access_epoch: AtomicU64::new(0),
            refresh_epoch: AtomicU64::new(0),
            renewal_calls: AtomicU64::new(0),
            status_queries: AtomicU64::new(0),
        }
    }

    /// Create an account directly, bypassing the register endpoint.
    pub fn with_account(self, username: &str, email: &str, password: &str) -> Self {
        self.create_account(username, email, password);
        self
    }

    pub fn renewal_calls(&self) -> u64 {
        self.renewal_calls.load(Ordering::SeqCst)
    }

    pub fn status_queries(&self) -> u64 {
        self.status_queries.load(Ordering::SeqCst)
    }

    /// Every access token issued so far is rejected with `token_not_valid`.
    pub fn revoke_access_tokens(&self) {
        self.access_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Every refresh token issued so far is rejected by the renewal endpoint.
    pub fn revoke_refresh_tokens(&self) {
        self.refresh_epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn create_account(&self, username: &str, email: &str, password: &str) -> Account {
        let account = Account {
            id: self.next_account_id.fetch_add(1, Ordering::SeqCst),
            email: email.to_string(),
            password: password.to_string(),
            bio: String::new(),
            joined_at: Utc::now(),
        };
        self.accounts.insert(username.to_string(), account.clone());
        account
    }

    // region tokens

    fn epoch(&self, token_type: TokenType) -> u64 {
        match token_type {
            TokenType::Access => self.access_epoch.load(Ordering::SeqCst),
            TokenType::Refresh => self.refresh_epoch.load(Ordering::SeqCst),
        }
    }

    fn issue(&self, username: &str, token_type: TokenType) -> Result<String, Rejection> {
        let ttl = match token_type {
            TokenType::Access => self.config.access_ttl,
            TokenType::Refresh => self.config.refresh_ttl,
        };
        let iat = Utc::now();
        let exp = iat + ttl;
        let claims = Claims {
            sub: username.to_string(),
            exp: exp.timestamp(),
            iat: iat.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            token_type,
            epoch: self.epoch(token_type),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.config.signing_key),
        )
        .map_err(|e| Rejection::Internal(e.to_string()))
    }

    fn issue_pair(&self, username: &str) -> Result<(String, String), Rejection> {
        Ok((
            self.issue(username, TokenType::Access)?,
            self.issue(username, TokenType::Refresh)?,
        ))
    }

    fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, Rejection> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.config.signing_key),
            &validation,
        )
        .map_err(|_| Rejection::TokenNotValid)?
        .claims;

        if claims.token_type != expected || claims.epoch != self.epoch(expected) {
            return Err(Rejection::TokenNotValid);
        }
        if !self.accounts.contains_key(&claims.sub) {
            return Err(Rejection::TokenNotValid);
        }
        Ok(claims)
    }

    fn authenticate(&self, request: &ApiRequest) -> Result<String, Rejection> {
        let token = request
            .authorization
            .as_ref()
            .ok_or(Rejection::NotAuthenticated)?;
        Ok(self.verify(&token.0, TokenType::Access)?.sub)
    }

    // endregion

    // region handlers

    fn login(&self, request: &ApiRequest) -> Result<ApiResponse, Rejection> {
        let body: LoginBody = parse_body(request)?;
        let valid = self
            .accounts
            .get(&body.username)
            .is_some_and(|account| account.password == body.password);
        if !valid {
            return Err(Rejection::NoActiveAccount);
        }

        let (access, refresh) = self.issue_pair(&body.username)?;
        Ok(ApiResponse::new(
            200,
            json!({ "access": access, "refresh": refresh }),
        ))
    }

    fn register(&self, request: &ApiRequest) -> Result<ApiResponse, Rejection> {
        let body: RegisterBody = parse_body(request)?;
        if body.username.trim().is_empty() {
            return Err(field_error("username", "This field may not be blank."));
        }
        if !body.email.contains('@') {
            return Err(field_error("email", "Enter a valid email address."));
        }
        if body.password.len() < 6 {
            return Err(field_error(
                "password",
                "Ensure this field has at least 6 characters.",
            ));
        }
        if self.accounts.contains_key(&body.username) {
            return Err(field_error(
                "username",
                "A user with that username already exists.",
            ));
        }

        let account = self.create_account(&body.username, &body.email, &body.password);
        let (access, refresh) = self.issue_pair(&body.username)?;
        Ok(ApiResponse::new(
            201,
            json!({
                "user": { "id": account.id, "username": body.username, "email": account.email },
                "token": access,
                "refresh": refresh,
                "message": "User registered successfully",
            }),
        ))
    }

    fn renew(&self, request: &ApiRequest) -> Result<ApiResponse, Rejection> {
        self.renewal_calls.fetch_add(1, Ordering::SeqCst);
        let body: RenewBody = parse_body(request)?;
        let claims = self.verify(&body.refresh, TokenType::Refresh)?;

        if !self.config.rotate_refresh_tokens {
            let (access, _) = self.issue_pair(&claims.sub)?;
            return Ok(ApiResponse::new(200, json!({ "access": access })));
        }

        // a rotated refresh token is good for one renewal
        if !self.used_refresh.insert(claims.jti) {
            return Err(Rejection::TokenNotValid);
        }

        let (access, refresh) = self.issue_pair(&claims.sub)?;
        Ok(ApiResponse::new(
            200,
            json!({ "access": access, "refresh": refresh }),
        ))
    }

    fn profile(&self, request: &ApiRequest) -> Result<ApiResponse, Rejection> {
        let username = self.authenticate(request)?;
        if request.method == Method::Put {
            let body: ProfileBody = parse_body(request)?;
            if let Some(mut account) = self.accounts.get_mut(&username) {
                account.bio = body.bio;
            }
        }

        let account = self
            .accounts
            .get(&username)
            .map(|entry| entry.value().clone())
            .ok_or(Rejection::NotFound)?;
        let streak = self
            .submissions
            .iter()
            .filter(|s| s.owner == username && s.verdict == Verdict::Accepted)
            .count();

        Ok(ApiResponse::new(
            200,
            json!({
                "id": account.id,
                "username": username,
                "email": account.email,
                "bio": account.bio,
                "streak": streak,
                "badges": [],
                "joined_at": account.joined_at,
            }),
        ))
    }

    fn submit(&self, request: &ApiRequest) -> Result<ApiResponse, Rejection> {
        let username = self.authenticate(request)?;
        let body: SubmitBody = parse_body(request)?;
        if body.problem_code.trim().is_empty() {
            return Err(field_error("problem_code", "This field may not be blank."));
        }

        let id = self.next_submission_id.fetch_add(1, Ordering::SeqCst);
        self.submissions.insert(
            id,
            Submission {
                id,
                owner: username,
                problem: body.problem_code,
                language: body.language,
                verdict: grade(&body.code),
                code: body.code,
                polls: 0,
                submitted_at: Utc::now(),
            },
        );
        Ok(ApiResponse::new(201, json!({ "submission_id": id })))
    }

    fn run(&self, request: &ApiRequest) -> Result<ApiResponse, Rejection> {
        self.authenticate(request)?;
        let body: RunBody = parse_body(request)?;

        let reply = match grade(&body.code) {
            Verdict::Accepted => json!({ "output": body.input, "error": null }),
            verdict => json!({
                "output": "",
                "error": format!("{} ({})", verdict, body.language),
            }),
        };
        Ok(ApiResponse::new(200, reply))
    }

    fn submission_status(&self, request: &ApiRequest, id: u64) -> Result<ApiResponse, Rejection> {
        let username = self.authenticate(request)?;
        self.status_queries.fetch_add(1, Ordering::SeqCst);

        let mut submission = self
            .submissions
            .get_mut(&id)
            .filter(|s| s.owner == username)
            .ok_or(Rejection::NotFound)?;
        submission.polls += 1;

        let verdict = if submission.polls > self.config.pending_polls {
            submission.verdict.clone()
        } else {
            Verdict::Pending
        };
        let feedback = match verdict {
            Verdict::Pending => None,
            Verdict::Accepted => Some("All test cases passed".to_string()),
            ref other => Some(format!("Failed with {other}")),
        };

        Ok(ApiResponse::new(
            200,
            json!({ "id": submission.id, "verdict": verdict, "feedback": feedback }),
        ))
    }

    fn list_submissions(&self, request: &ApiRequest) -> Result<ApiResponse, Rejection> {
        let username = self.authenticate(request)?;
        let problem = request
            .query
            .iter()
            .find(|(key, _)| key == "problem")
            .map(|(_, value)| value.as_str());

        let mut mine: Vec<Submission> = self
            .submissions
            .iter()
            .filter(|s| s.owner == username)
            .filter(|s| problem.is_none_or(|code| s.problem == code))
            .map(|s| s.value().clone())
            .collect();
        mine.sort_by(|a, b| b.id.cmp(&a.id));

        let rows: Vec<Value> = mine
            .into_iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "language": s.language,
                    "verdict": s.verdict,
                    "code": s.code,
                    "time_taken": null,
                    "submitted_at": s.submitted_at,
                    "feedback": null,
                })
            })
            .collect();
        Ok(ApiResponse::new(200, Value::Array(rows)))
    }

    // endregion

    fn status_id(&self, path: &str) -> Option<u64> {
        let (prefix, suffix) = self.endpoints.submission_status.split_once("{id}")?;
        path.strip_prefix(prefix)?
            .strip_suffix(suffix)?
            .parse::<SubmissionId>()
            .ok()
            .map(|id| id.0)
    }

    fn route(&self, request: &ApiRequest) -> Result<ApiResponse, Rejection> {
        let endpoints = &self.endpoints;
        let path = request.path.as_str();
        let method = request.method;

        let expect = |allowed: &[Method]| {
            if allowed.contains(&method) {
                Ok(())
            } else {
                Err(Rejection::MethodNotAllowed(method))
            }
        };

        if path == endpoints.login {
            expect(&[Method::Post])?;
            self.login(request)
        } else if path == endpoints.register {
            expect(&[Method::Post])?;
            self.register(request)
        } else if path == endpoints.renew {
            expect(&[Method::Post])?;
            self.renew(request)
        } else if path == endpoints.profile {
            expect(&[Method::Get, Method::Put])?;
            self.profile(request)
        } else if path == endpoints.submit {
            expect(&[Method::Post])?;
            self.submit(request)
        } else if path == endpoints.run {
            expect(&[Method::Post])?;
            self.run(request)
        } else if path == endpoints.submissions {
            expect(&[Method::Get])?;
            self.list_submissions(request)
        } else if let Some(id) = self.status_id(path) {
            expect(&[Method::Get])?;
            self.submission_status(request, id)
        } else {
            Err(Rejection::NotFound)
        }
    }
}

#[async_trait::async_trait]
impl Transport for FakeJudgeServer {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let response = self
            .route(request)
            .unwrap_or_else(Rejection::into_response);
        debug!(
            request_id = %request.id,
            method = %request.method,
            path = %request.path,
            status = response.status,
            "fake judge served request"
        );

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        Ok(response)
    }
}
