use crate::source::SourceFile;

// ═══════════════════════════════════════════════════════════════════════════════
// PROMPTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed instruction sent with every file. The tags it asks for are what
/// `parse::parse_response` reads back, so keep the two in step.
pub const REVIEW_SYSTEM: &str = r#"You are an expert code reviewer.

Review the file you are given for:
- Errors and bugs
- Improvements to readability and structure
- Security issues and vulnerabilities
- Performance and optimization opportunities

OUTPUT FORMAT:
- Explain your findings in plain prose. Start lines about security, performance
  or suggestions with that word so they are easy to scan.
- Rate the overall quality from 0 to 100 and emit it exactly once as <SCORE:N>.
- If you propose changes, emit the complete corrected file in a single fenced
  code block. Emit no other code blocks before it."#;

/// User message for one file; the content is sent verbatim
pub fn user_prompt(file: &SourceFile) -> String {
    format!("Analyze this {} file:\n{}", file.extension, file.content)
}
