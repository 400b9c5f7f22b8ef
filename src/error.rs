use thiserror::Error;

/// Failure of a single file's analysis request.
///
/// Never escapes the orchestrator: each one is folded into a score-0 outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("no API key configured (run `codelens setup` or set GROQ_API_KEY)")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response body: {0}")]
    MalformedPayload(String),
}

/// Failure while talking to the remote judge
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("submission failed: {0}")]
    Submit(String),

    #[error("status check failed: {0}")]
    Poll(String),

    #[error("malformed judge response: {0}")]
    MalformedPayload(String),

    #[error("execution did not finish after {attempts} status checks")]
    TimedOut { attempts: u32 },
}
