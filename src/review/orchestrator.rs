//! Batch fan-out of review requests
//!
//! One request per file, all driven concurrently from a single task and
//! bounded by a semaphore. A failing file becomes a score-0 outcome; it never
//! cancels its siblings. The batch ends only when every request has settled.

use super::client::ReviewBackend;
use super::AnalysisOutcome;
use crate::progress::ProgressTracker;
use crate::source::SourceFile;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

/// Default cap on in-flight requests
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

pub struct Orchestrator<B> {
    backend: B,
    max_concurrent: usize,
    progress: ProgressTracker,
}

impl<B: ReviewBackend> Orchestrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            progress: ProgressTracker::new(),
        }
    }

    /// Limit in-flight requests. Zero removes the limit.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Handle for observing the current batch from elsewhere
    pub fn progress(&self) -> ProgressTracker {
        self.progress.clone()
    }

    pub async fn analyze_batch(&self, files: &[SourceFile]) -> BatchReport {
        self.analyze_batch_with(files, |_| {}).await
    }

    /// Analyze every file, calling `on_outcome` as each one settles.
    ///
    /// Outcomes are reported (and stored) in settlement order.
    pub async fn analyze_batch_with<F>(&self, files: &[SourceFile], mut on_outcome: F) -> BatchReport
    where
        F: FnMut(&AnalysisOutcome),
    {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        if files.is_empty() {
            return BatchReport {
                batch_id,
                started_at,
                finished_at: started_at,
                outcomes: Vec::new(),
            };
        }

        let span = tracing::info_span!("batch", %batch_id, files = files.len());
        async {
            let keys = self.progress.begin(files.iter().map(|f| f.path.as_str()));
            let permits = match self.max_concurrent {
                0 => Semaphore::MAX_PERMITS,
                n => n,
            };
            let semaphore = Semaphore::new(permits);

            let mut pending: FuturesUnordered<_> = files
                .iter()
                .zip(&keys)
                .enumerate()
                .map(|(index, (file, key))| self.analyze_one(index, file, key, &semaphore))
                .collect();

            let mut outcomes = Vec::with_capacity(files.len());
            while let Some(outcome) = pending.next().await {
                on_outcome(&outcome);
                outcomes.push(outcome);
            }

            self.progress.finish();
            let report = BatchReport {
                batch_id,
                started_at,
                finished_at: Utc::now(),
                outcomes,
            };
            let summary = report.summary();
            tracing::info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                "batch complete"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn analyze_one(
        &self,
        index: usize,
        file: &SourceFile,
        key: &str,
        semaphore: &Semaphore,
    ) -> AnalysisOutcome {
        // The semaphore is never closed, so acquire only fails if it is.
        let _permit = semaphore.acquire().await.ok();
        self.progress.mark_analyzing(key, &file.path);
        tracing::debug!(path = %file.path, "dispatching review request");

        match self.backend.complete(file).await {
            Ok(raw) => {
                let outcome = AnalysisOutcome::from_response(index, file, &raw);
                self.progress.mark_done(key, outcome.score);
                outcome
            }
            Err(err) => {
                tracing::warn!(path = %file.path, "review failed: {}", err);
                self.progress.mark_failed(key, err.to_string());
                AnalysisOutcome::from_error(index, file, &err)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In settlement order
    pub outcomes: Vec<AnalysisOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub with_corrections: usize,
    /// Mean score of the files that were reviewed successfully
    pub average_score: Option<f64>,
}

impl BatchReport {
    /// Outcomes in input order
    pub fn sorted(&self) -> Vec<&AnalysisOutcome> {
        let mut sorted: Vec<&AnalysisOutcome> = self.outcomes.iter().collect();
        sorted.sort_by_key(|o| o.index);
        sorted
    }

    pub fn summary(&self) -> BatchSummary {
        let succeeded: Vec<&AnalysisOutcome> =
            self.outcomes.iter().filter(|o| !o.failed).collect();
        let average_score = if succeeded.is_empty() {
            None
        } else {
            let total: u32 = succeeded.iter().map(|o| u32::from(o.score)).sum();
            Some(f64::from(total) / succeeded.len() as f64)
        };

        BatchSummary {
            total: self.outcomes.len(),
            succeeded: succeeded.len(),
            failed: self.outcomes.len() - succeeded.len(),
            with_corrections: self.outcomes.iter().filter(|o| o.has_corrections).count(),
            average_score,
        }
    }
}
