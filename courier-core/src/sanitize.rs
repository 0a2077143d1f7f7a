//! Sanitization utilities for routed commands.
//!
//! Parameters extracted from free text end up concatenated into command
//! strings that downstream skills may hand to a shell. The blacklist here is
//! limited to shell and control metacharacters: path content such as `/` or
//! `..` is left alone and remains the executing skill's responsibility.

/// Characters removed by [`sanitize`].
pub const SHELL_METACHARACTERS: &[char] = &[';', '`', '$', '{', '}', '|', '<', '>', '&', '\\'];

/// Remove shell metacharacters from `input`, then trim surrounding whitespace.
///
/// Never fails; the result may be empty.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !SHELL_METACHARACTERS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Escape and truncate user input for safe inclusion in an LLM routing prompt.
///
/// - Truncates to `max_len` characters (by char count, not bytes)
/// - Replaces `<` and `>` with entities to prevent XML-tag injection
/// - Strips control characters (U+0000–U+001F) except `\n` and `\t`
pub fn escape_for_llm_prompt(input: &str, max_len: usize) -> String {
    let truncated: String = input.chars().take(max_len).collect();
    let mut result = String::with_capacity(truncated.len());
    for ch in truncated.chars() {
        match ch {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            c if c.is_control() && c != '\n' && c != '\t' => {}
            c => result.push(c),
        }
    }
    result
}
