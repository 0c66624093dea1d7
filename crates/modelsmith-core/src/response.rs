/// Remove a surrounding markdown code fence and its language tag.
///
/// Text without a leading fence is returned trimmed and otherwise untouched.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = match body.split_once('\n') {
        Some((tag, rest)) if is_language_tag(tag) => rest,
        Some(_) => body,
        None => body,
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

fn is_language_tag(line: &str) -> bool {
    let line = line.trim();
    line.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.'))
}
