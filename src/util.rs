/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Truncate a string slice on a char boundary (Unicode-safe, no ellipsis)
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Sanitize a remote response body before it is quoted in an error message.
///
/// Bodies that look like they echo credentials are replaced wholesale.
pub fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "x-rapidapi-key",
        "sk-",
        "gsk_",
    ];

    let truncated = truncate_str(content.trim(), MAX_ERROR_CONTENT_LEN);
    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(response details redacted - may contain sensitive data)".to_string();
    }

    truncated.to_string()
}
