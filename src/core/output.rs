//! Terminal rendering helpers for the text output format.

/// Collapse whitespace and bound length for a one-line preview.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Join agent descriptors for a table cell, `-` when there are none.
pub fn agent_cell(descriptors: &[String], max_chars: usize) -> String {
    if descriptors.is_empty() {
        return "-".to_string();
    }
    compact_line(&descriptors.join(", "), max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_lines_are_truncated() {
        assert_eq!(compact_line("a  b\nc", 10), "a b c");
        assert_eq!(compact_line("abcdefgh", 3), "abc...");
    }

    #[test]
    fn empty_agent_cell_renders_dash() {
        assert_eq!(agent_cell(&[], 20), "-");
        assert_eq!(agent_cell(&["user:1".to_string(), "project:p".to_string()], 40), "user:1, project:p");
    }
}
