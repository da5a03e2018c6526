/// Removes a wrapping Markdown code fence from model output.
///
/// Strips a leading line made of three backticks plus an optional language
/// tag, and a trailing line made only of three backticks. Applied to a fixed
/// point, so feeding already-stripped text back in is a no-op. Safe to call
/// on a partially streamed reply.
pub fn strip_code_fences(text: &str) -> String {
    let mut current = text;
    loop {
        let next = strip_trailing_fence(strip_leading_fence(current));
        if next.len() == current.len() {
            return current.to_string();
        }
        current = next;
    }
}

fn strip_leading_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let (tag, remainder) = match rest.find('\n') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    };
    let tag = tag.trim_end_matches('\r');
    let is_language_tag = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.' | '#'));
    if is_language_tag {
        remainder
    } else {
        text
    }
}

fn strip_trailing_fence(text: &str) -> &str {
    let trimmed = text.trim_end();
    let Some(body) = trimmed.strip_suffix("```") else {
        return text;
    };
    if body.is_empty() {
        return body;
    }
    match body.strip_suffix('\n') {
        Some(body) => body.strip_suffix('\r').unwrap_or(body),
        None => text,
    }
}
