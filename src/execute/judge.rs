use crate::config::Config;
use crate::error::ExecutionError;
use crate::util::sanitize_api_response;
use serde::{Deserialize, Serialize};
use std::future::Future;
use url::Url;

/// Submission payload. `stdin` is always sent, empty by default.
#[derive(Debug, Clone, Serialize)]
pub struct Submission<'a> {
    pub source_code: &'a str,
    pub language_id: u32,
    pub stdin: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JudgeStatus {
    pub id: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// One status check as reported by the judge
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JudgeResult {
    pub status: JudgeStatus,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    token: Option<String>,
}

/// Asynchronous execution service
pub trait Judge {
    /// Queue a run and return its opaque token
    fn submit(
        &self,
        submission: &Submission<'_>,
    ) -> impl Future<Output = Result<String, ExecutionError>>;

    fn poll(&self, token: &str) -> impl Future<Output = Result<JudgeResult, ExecutionError>>;
}

/// HTTP client for a Judge0-compatible service
#[derive(Debug, Clone)]
pub struct Judge0Client {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    rapidapi_host: Option<String>,
}

impl Judge0Client {
    pub fn new(config: &Config, api_key: Option<String>) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(&config.judge_url)
            .map_err(|e| anyhow::anyhow!("Invalid judge URL '{}': {}", config.judge_url, e))?;
        // Url::join replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http,
            base_url,
            api_key,
            rapidapi_host: config.judge_rapidapi_host.clone(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config, config.judge_api_key())
    }

    fn endpoint(&self, path: &str) -> Result<Url, String> {
        self.base_url.join(path).map_err(|e| e.to_string())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let Some(key) = &self.api_key else {
            return request;
        };
        let request = request.header("X-RapidAPI-Key", key);
        match &self.rapidapi_host {
            Some(host) => request.header("X-RapidAPI-Host", host),
            None => request,
        }
    }

    fn submit_request(
        &self,
        submission: &Submission<'_>,
    ) -> Result<reqwest::Request, ExecutionError> {
        let url = self.endpoint("submissions").map_err(ExecutionError::Submit)?;
        let request = self
            .http
            .post(url)
            .query(&[("base64_encoded", "false"), ("wait", "false")])
            .json(submission);
        self.authorize(request)
            .build()
            .map_err(|e| ExecutionError::Submit(e.to_string()))
    }

    fn poll_request(&self, token: &str) -> Result<reqwest::Request, ExecutionError> {
        let url = self
            .endpoint(&format!("submissions/{}", token))
            .map_err(ExecutionError::Poll)?;
        let request = self.http.get(url).query(&[("base64_encoded", "false")]);
        self.authorize(request)
            .build()
            .map_err(|e| ExecutionError::Poll(e.to_string()))
    }

    /// Execute a prepared request, returning status and body text
    async fn send(
        &self,
        request: reqwest::Request,
        wrap: fn(String) -> ExecutionError,
    ) -> Result<(reqwest::StatusCode, String), ExecutionError> {
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| wrap(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| wrap(e.to_string()))?;
        Ok((status, text))
    }
}

fn rejected(status: reqwest::StatusCode, body: &str) -> String {
    format!("judge returned {}: {}", status, sanitize_api_response(body))
}

/// Interpret a submit response: the token, or why there isn't one
fn submit_token(status: reqwest::StatusCode, body: &str) -> Result<String, ExecutionError> {
    if !status.is_success() {
        return Err(ExecutionError::Submit(rejected(status, body)));
    }
    let parsed: SubmitResponse =
        serde_json::from_str(body).map_err(|e| ExecutionError::MalformedPayload(e.to_string()))?;
    parsed
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExecutionError::MalformedPayload("missing submission token".into()))
}

fn poll_result(status: reqwest::StatusCode, body: &str) -> Result<JudgeResult, ExecutionError> {
    if !status.is_success() {
        return Err(ExecutionError::Poll(rejected(status, body)));
    }
    serde_json::from_str(body).map_err(|e| ExecutionError::MalformedPayload(e.to_string()))
}

impl Judge for Judge0Client {
    async fn submit(&self, submission: &Submission<'_>) -> Result<String, ExecutionError> {
        let request = self.submit_request(submission)?;
        let (status, text) = self.send(request, ExecutionError::Submit).await?;
        submit_token(status, &text)
    }

    async fn poll(&self, token: &str) -> Result<JudgeResult, ExecutionError> {
        let request = self.poll_request(token)?;
        let (status, text) = self.send(request, ExecutionError::Poll).await?;
        poll_result(status, &text)
    }
}
