//! Conversation titles derived from the first message

const MAX_TITLE_CHARS: usize = 50;
const TRUNCATION_SUFFIX: &str = "...";
pub const DEFAULT_TITLE: &str = "New Chat";

/// Title for a conversation started with `first_message`.
///
/// Takes the first 50 characters, marks truncation with `...`, collapses
/// newlines to spaces, and falls back to "New Chat" when nothing is left.
pub fn generate_title(first_message: &str) -> String {
    let head: String = first_message.chars().take(MAX_TITLE_CHARS).collect();
    let mut title = head.trim().to_string();
    if first_message.chars().count() > MAX_TITLE_CHARS {
        title.push_str(TRUNCATION_SUFFIX);
    }

    let title = title.replace(['\r', '\n'], " ");
    let title = title.trim();
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title.to_string()
    }
}
