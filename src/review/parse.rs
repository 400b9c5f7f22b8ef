//! Interpretation of free-form review responses
//!
//! The model is asked for a `<SCORE:N>` tag and one fenced block holding the
//! corrected file. Everything else is prose that gets bucketed into sections.
//! Parsing never fails: a response with none of the markers is score 0, no
//! corrections, and a single `analysis` section.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

const MAX_SCORE: u64 = 100;

fn score_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<SCORE:(\d+)>").expect("valid score pattern"))
}

fn think_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think pattern"))
}

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[\w+#.-]*[ \t]*\r?\n?(.*?)```").expect("valid code block pattern")
    })
}

/// Narrative category. Declaration order is render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Analysis,
    Suggestions,
    Security,
    Performance,
}

impl Section {
    pub fn label(&self) -> &'static str {
        match self {
            Section::Analysis => "Analysis",
            Section::Suggestions => "Suggestions",
            Section::Security => "Security",
            Section::Performance => "Performance",
        }
    }

    /// Section a line switches to, if it carries a trigger keyword.
    ///
    /// Checked in fixed priority order; the first hit wins.
    fn triggered_by(line: &str) -> Option<Section> {
        const TRIGGERS: &[(Section, &[&str])] = &[
            (Section::Security, &["security", "vulnerab"]),
            (Section::Performance, &["performance", "optimi"]),
            (Section::Suggestions, &["suggest", "recommend"]),
        ];

        let lower = line.to_lowercase();
        TRIGGERS
            .iter()
            .find(|(_, stems)| stems.iter().any(|stem| lower.contains(stem)))
            .map(|(section, _)| *section)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Narrative lines bucketed by section. Sections without lines are absent.
pub type Sections = BTreeMap<Section, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub score: u8,
    pub corrected_code: Option<String>,
    pub has_corrections: bool,
    pub narrative: String,
    pub sections: Sections,
}

/// Parse one raw model response.
///
/// Thinking blocks are dropped first, so tags and fences inside the
/// scratchpad never count.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let visible = strip_thinking(raw);
    let score = extract_score(&visible);
    let corrected_code = extract_corrected_code(&visible);
    let narrative = narrative_from_visible(&visible);
    let sections = classify_sections(&narrative);

    ParsedResponse {
        score,
        has_corrections: corrected_code.is_some(),
        corrected_code,
        narrative,
        sections,
    }
}

/// Raw text with every `<think>...</think>` span removed
pub fn strip_thinking(raw: &str) -> String {
    think_re().replace_all(raw, "").into_owned()
}

/// First `<SCORE:N>` tag, clamped to 0..=100. Missing tag is 0.
pub fn extract_score(text: &str) -> u8 {
    let Some(caps) = score_re().captures(text) else {
        return 0;
    };
    // Only digits can match, so a parse failure means the value overflowed.
    let value = caps[1].parse::<u64>().unwrap_or(MAX_SCORE);
    value.min(MAX_SCORE) as u8
}

/// Trimmed interior of the first fenced block, if any
pub fn extract_corrected_code(text: &str) -> Option<String> {
    code_block_re()
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

/// Raw text minus thinking blocks, score tags and the first fenced block
pub fn narrative_text(raw: &str) -> String {
    narrative_from_visible(&strip_thinking(raw))
}

fn narrative_from_visible(visible: &str) -> String {
    let without_score = score_re().replace_all(visible, "");
    let without_code = code_block_re().replacen(&without_score, 1, "");
    without_code.trim().to_string()
}

/// Bucket narrative lines with a sticky cursor starting at `analysis`
pub fn classify_sections(narrative: &str) -> Sections {
    let mut sections = Sections::new();
    let mut current = Section::Analysis;

    for line in narrative.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(next) = Section::triggered_by(line) {
            current = next;
        }
        sections.entry(current).or_default().push(line.to_string());
    }

    sections
}
