use super::judge::{Judge, JudgeResult, Submission};
use super::{ExecutionJob, JobStatus};
use crate::error::ExecutionError;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;

/// Shown in the output slot while a run is in flight
pub const RUNNING_PLACEHOLDER: &str = "Running...";

/// Timing of status checks after a submission.
///
/// `legacy()` reproduces the unbounded fixed-interval loop; the default adds
/// backoff and an attempt cap so a stuck job cannot poll forever.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(1),
            backoff_factor: 1.5,
            max_interval: Duration::from_secs(8),
            max_attempts: Some(60),
        }
    }
}

impl PollPolicy {
    pub fn legacy() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(1),
            backoff_factor: 1.0,
            max_interval: Duration::from_secs(1),
            max_attempts: None,
        }
    }

    /// Wait before the next check, given how many checks came back pending
    pub fn delay_after(&self, pending_polls: u32) -> Duration {
        let exponent = pending_polls.saturating_sub(1).min(32) as i32;
        let factor = self.backoff_factor.max(1.0).powi(exponent);
        let scaled = Duration::try_from_secs_f64(self.interval.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX);
        if self.backoff_factor > 1.0 {
            scaled.min(self.max_interval.max(self.interval))
        } else {
            scaled
        }
    }
}

/// Terminal result of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ExecutionReport {
    Output(String),
    Failed(String),
}

impl ExecutionReport {
    /// Text for the output slot; failures carry an `Error: ` prefix
    pub fn display(&self) -> String {
        match self {
            ExecutionReport::Output(text) => text.clone(),
            ExecutionReport::Failed(text) => format!("Error: {}", text),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionReport::Failed(_))
    }
}

fn non_blank(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|s| !s.trim().is_empty())
}

fn terminal_report(status: JobStatus, result: &JudgeResult) -> ExecutionReport {
    if let Some(stdout) = result.stdout.as_deref().filter(|s| !s.is_empty()) {
        return ExecutionReport::Output(stdout.to_string());
    }
    if let Some(err) = non_blank(&result.stderr).or_else(|| non_blank(&result.compile_output)) {
        return ExecutionReport::Failed(err.to_string());
    }
    if status == JobStatus::Succeeded {
        return ExecutionReport::Output(String::new());
    }
    let reason = result
        .status
        .description
        .clone()
        .unwrap_or_else(|| format!("judge status {}", result.status.id));
    ExecutionReport::Failed(reason)
}

pub struct Poller<J> {
    judge: J,
    policy: PollPolicy,
    output: watch::Sender<String>,
}

impl<J: Judge> Poller<J> {
    pub fn new(judge: J, policy: PollPolicy) -> Self {
        let (output, _) = watch::channel(String::new());
        Self {
            judge,
            policy,
            output,
        }
    }

    /// Observe the output slot
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.output.subscribe()
    }

    /// Current contents of the output slot
    pub fn output(&self) -> String {
        self.output.borrow().clone()
    }

    pub async fn run_execution(&self, source_code: &str, language_id: u32) -> ExecutionReport {
        let mut job = ExecutionJob::new(source_code, language_id);
        self.run_job(&mut job).await
    }

    /// Submit `job` and poll it to a terminal state, updating it along the way
    pub async fn run_job(&self, job: &mut ExecutionJob) -> ExecutionReport {
        self.output.send_replace(RUNNING_PLACEHOLDER.to_string());

        let report = match self.drive(job).await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!("execution failed: {}", err);
                job.status = JobStatus::Failed;
                ExecutionReport::Failed(err.to_string())
            }
        };

        self.output.send_replace(report.display());
        report
    }

    async fn drive(&self, job: &mut ExecutionJob) -> Result<ExecutionReport, ExecutionError> {
        let submission = Submission {
            source_code: &job.source_code,
            language_id: job.language_id,
            stdin: "",
        };
        let token = self.judge.submit(&submission).await?;
        tracing::debug!(%token, language_id = job.language_id, "submitted");
        job.submission_token = Some(token.clone());

        tokio::time::sleep(self.policy.initial_delay).await;
        let mut pending_polls = 0u32;
        loop {
            let result = self.judge.poll(&token).await?;
            let status = JobStatus::from_judge_id(result.status.id);
            job.status = status;

            if status.is_terminal() {
                job.stdout = result.stdout.clone();
                job.stderr = result.stderr.clone();
                tracing::debug!(%token, ?status, pending_polls, "execution settled");
                return Ok(terminal_report(status, &result));
            }

            pending_polls += 1;
            if self
                .policy
                .max_attempts
                .is_some_and(|max| pending_polls >= max)
            {
                return Err(ExecutionError::TimedOut {
                    attempts: pending_polls,
                });
            }
            tokio::time::sleep(self.policy.delay_after(pending_polls)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::judge::JudgeStatus;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Judge that replays a fixed script of status checks
    struct ScriptedJudge {
        submit: Result<String, ExecutionError>,
        polls: Mutex<VecDeque<Result<JudgeResult, ExecutionError>>>,
        poll_count: AtomicUsize,
    }

    impl ScriptedJudge {
        fn new(polls: Vec<Result<JudgeResult, ExecutionError>>) -> Self {
            Self {
                submit: Ok("tok-1".to_string()),
                polls: Mutex::new(polls.into()),
                poll_count: AtomicUsize::new(0),
            }
        }
    }

    impl Judge for ScriptedJudge {
        async fn submit(&self, submission: &Submission<'_>) -> Result<String, ExecutionError> {
            assert_eq!(submission.stdin, "");
            self.submit.clone()
        }

        async fn poll(&self, token: &str) -> Result<JudgeResult, ExecutionError> {
            assert_eq!(token, "tok-1");
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(status(1)))
        }
    }

    fn status(id: i64) -> JudgeResult {
        JudgeResult {
            status: JudgeStatus {
                id,
                description: None,
            },
            ..JudgeResult::default()
        }
    }

    fn finished(id: i64, stdout: Option<&str>, stderr: Option<&str>) -> JudgeResult {
        JudgeResult {
            stdout: stdout.map(str::to_string),
            stderr: stderr.map(str::to_string),
            ..status(id)
        }
    }

    fn instant_policy(max_attempts: Option<u32>) -> PollPolicy {
        PollPolicy {
            initial_delay: Duration::ZERO,
            interval: Duration::ZERO,
            backoff_factor: 1.0,
            max_interval: Duration::ZERO,
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_polls_until_terminal() {
        let judge = ScriptedJudge::new(vec![
            Ok(status(1)),
            Ok(status(1)),
            Ok(finished(3, Some("OK"), None)),
        ]);
        let poller = Poller::new(judge, instant_policy(None));
        let mut job = ExecutionJob::new("print('OK')", 71);

        let report = poller.run_job(&mut job).await;

        assert_eq!(report, ExecutionReport::Output("OK".to_string()));
        // Two pending checks plus the terminal one.
        assert_eq!(poller.judge.poll_count.load(Ordering::SeqCst), 3);
        assert_eq!(poller.output(), "OK");
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.submission_token.as_deref(), Some("tok-1"));
        assert_eq!(job.stdout.as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn test_stderr_surfaces_as_error() {
        let judge = ScriptedJudge::new(vec![
            Ok(status(2)),
            Ok(finished(11, Some(""), Some("NameError: x"))),
        ]);
        let poller = Poller::new(judge, instant_policy(None));

        let report = poller.run_execution("print(x)", 71).await;

        assert_eq!(report, ExecutionReport::Failed("NameError: x".to_string()));
        assert_eq!(poller.output(), "Error: NameError: x");
    }

    #[test]
    fn test_whitespace_stdout_is_still_output() {
        let result = finished(3, Some("   \n"), Some("warning: unused"));
        assert_eq!(
            terminal_report(JobStatus::Succeeded, &result),
            ExecutionReport::Output("   \n".to_string())
        );
    }

    #[tokio::test]
    async fn test_compile_output_when_no_stderr() {
        let judge = ScriptedJudge::new(vec![Ok(JudgeResult {
            compile_output: Some("main.c:1: error".to_string()),
            ..status(6)
        })]);
        let poller = Poller::new(judge, instant_policy(None));

        let report = poller.run_execution("int main(", 50).await;
        assert_eq!(report, ExecutionReport::Failed("main.c:1: error".to_string()));
    }

    #[tokio::test]
    async fn test_submit_failure_is_terminal() {
        let mut judge = ScriptedJudge::new(vec![]);
        judge.submit = Err(ExecutionError::Submit("judge returned 401".into()));
        let poller = Poller::new(judge, instant_policy(None));
        let mut job = ExecutionJob::new("x", 71);

        let report = poller.run_job(&mut job).await;

        assert!(report.is_failure());
        assert!(poller.output().starts_with("Error: submission failed"));
        assert_eq!(poller.judge.poll_count.load(Ordering::SeqCst), 0);
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.submission_token.is_none());
    }

    #[tokio::test]
    async fn test_attempt_cap_times_out() {
        let judge = ScriptedJudge::new(vec![]);
        let poller = Poller::new(judge, instant_policy(Some(4)));

        let report = poller.run_execution("loop {}", 73).await;

        assert_eq!(
            report,
            ExecutionReport::Failed(ExecutionError::TimedOut { attempts: 4 }.to_string())
        );
        assert_eq!(poller.judge.poll_count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_output_slot_holds_final_text() {
        let judge = ScriptedJudge::new(vec![Ok(finished(3, Some("done"), None))]);
        let poller = Poller::new(judge, instant_policy(None));
        let mut rx = poller.subscribe();

        poller.run_execution("x", 71).await;

        // The slot only keeps the latest value.
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "done");
    }

    #[test]
    fn test_delay_backoff_is_capped() {
        let policy = PollPolicy {
            initial_delay: Duration::ZERO,
            interval: Duration::from_millis(100),
            backoff_factor: 2.0,
            max_interval: Duration::from_millis(500),
            max_attempts: None,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40), Duration::from_millis(500));
    }

    #[test]
    fn test_legacy_policy_is_fixed_and_unbounded() {
        let policy = PollPolicy::legacy();
        assert_eq!(policy.delay_after(1), policy.delay_after(50));
        assert!(policy.max_attempts.is_none());
    }
}
