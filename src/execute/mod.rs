//! Remote code execution through an asynchronous judge
//!
//! Submit once, then poll by token until the judge reports a terminal status.

pub mod judge;
pub mod poller;

pub use judge::{Judge, Judge0Client, JudgeResult, Submission};
pub use poller::{ExecutionReport, PollPolicy, Poller, RUNNING_PLACEHOLDER};

use serde::Serialize;

/// Highest judge status id that is still in progress (1 queued, 2 processing)
pub const LAST_PENDING_STATUS_ID: i64 = 2;
/// Judge status id for a run that finished normally
pub const ACCEPTED_STATUS_ID: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn from_judge_id(id: i64) -> Self {
        match id {
            i64::MIN..=1 => JobStatus::Queued,
            2 => JobStatus::Running,
            ACCEPTED_STATUS_ID => JobStatus::Succeeded,
            _ => JobStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionJob {
    pub source_code: String,
    pub language_id: u32,
    pub submission_token: Option<String>,
    pub status: JobStatus,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl ExecutionJob {
    pub fn new(source_code: impl Into<String>, language_id: u32) -> Self {
        Self {
            source_code: source_code.into(),
            language_id,
            submission_token: None,
            status: JobStatus::Queued,
            stdout: None,
            stderr: None,
        }
    }
}
