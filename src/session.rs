//! Session state: the files queued for review and the latest results

use crate::review::{AnalysisOutcome, BatchReport, Orchestrator, ReviewBackend};
use crate::source::SourceFile;

#[derive(Debug, Default)]
pub struct ReviewSession {
    files: Vec<SourceFile>,
    last_report: Option<BatchReport>,
}

impl ReviewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_files(&mut self, files: impl IntoIterator<Item = SourceFile>) {
        self.files.extend(files);
    }

    /// Drop every queued file with this path. Returns how many were removed.
    pub fn remove(&mut self, path: &str) -> usize {
        let before = self.files.len();
        self.files.retain(|f| f.path != path);
        before - self.files.len()
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.last_report = None;
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn last_report(&self) -> Option<&BatchReport> {
        self.last_report.as_ref()
    }

    /// Review every queued file, replacing any earlier results
    pub async fn run_analysis<B: ReviewBackend>(
        &mut self,
        orchestrator: &Orchestrator<B>,
    ) -> &BatchReport {
        let report = orchestrator.analyze_batch(&self.files).await;
        self.last_report.insert(report)
    }

    /// Latest results in the order the files were queued
    pub fn results_sorted(&self) -> Vec<&AnalysisOutcome> {
        self.last_report
            .as_ref()
            .map(BatchReport::sorted)
            .unwrap_or_default()
    }
}
