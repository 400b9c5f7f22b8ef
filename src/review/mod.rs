//! Per-file model review: request, interpretation and batch orchestration

pub mod client;
pub mod orchestrator;
pub mod parse;
pub mod prompts;

pub use client::{ChatClient, ReviewBackend};
pub use orchestrator::{BatchReport, BatchSummary, Orchestrator};
pub use parse::{parse_response, ParsedResponse, Section, Sections};

use crate::error::AnalysisError;
use crate::source::SourceFile;
use serde::{Deserialize, Serialize};

/// Structured result of reviewing one file, success or synthetic failure.
///
/// Built exactly once per submitted file and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// Position of the file in the submitted batch
    pub index: usize,
    pub file_name: String,
    pub path: String,
    pub original_code: String,
    pub raw_narrative: String,
    pub score: u8,
    pub corrected_code: Option<String>,
    pub has_corrections: bool,
    #[serde(default)]
    pub sections: Sections,
    pub failed: bool,
}

impl AnalysisOutcome {
    pub fn from_response(index: usize, file: &SourceFile, raw: &str) -> Self {
        let parsed = parse_response(raw);
        Self {
            index,
            file_name: file.name.clone(),
            path: file.path.clone(),
            original_code: file.content.clone(),
            raw_narrative: parsed.narrative,
            score: parsed.score,
            corrected_code: parsed.corrected_code,
            has_corrections: parsed.has_corrections,
            sections: parsed.sections,
            failed: false,
        }
    }

    pub fn from_error(index: usize, file: &SourceFile, err: &AnalysisError) -> Self {
        let narrative = format!("Error analyzing {}: {}", file.path, err);
        let mut sections = Sections::new();
        sections.insert(Section::Analysis, vec![narrative.clone()]);
        Self {
            index,
            file_name: file.name.clone(),
            path: file.path.clone(),
            original_code: file.content.clone(),
            raw_narrative: narrative,
            score: 0,
            corrected_code: None,
            has_corrections: false,
            sections,
            failed: true,
        }
    }
}
