//! Fenced code block extraction

/// Opening fence for the plotting language
pub const FENCE_OPEN: &str = "```python";
/// Closing fence
pub const FENCE_CLOSE: &str = "```";

/// Extract the first ```` ```python ```` block from generated text.
///
/// Lines strictly between the fences are returned verbatim, joined with
/// `\n`. Returns an empty string when no block opens. An unterminated block
/// yields everything after the opening fence.
pub fn extract_code(text: &str) -> String {
    let mut in_code = false;
    let mut code_lines = Vec::new();

    for line in text.split('\n') {
        let trimmed = line.trim();
        if !in_code {
            if trimmed.starts_with(FENCE_OPEN) {
                in_code = true;
            }
        } else if trimmed == FENCE_CLOSE {
            break;
        } else {
            code_lines.push(line);
        }
    }

    code_lines.join("\n")
}
