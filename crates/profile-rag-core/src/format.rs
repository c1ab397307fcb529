//! Context formatter.
//!
//! A short window of a resume loses the document-level context it came
//! from once embedded on its own. Before storage each chunk is prefixed
//! with the document summary (when one exists) and its section heading:
//!
//! ```text
//! Summary: <summary>
//! Heading: <heading>
//!
//! <raw chunk text>
//! ```
//!
//! The `Summary:` line is omitted when no summary is available, and the
//! heading falls back to `No heading`.

/// Heading text rendered when a chunk has no heading.
pub const NO_HEADING: &str = "No heading";

/// Format a chunk's text with its context prefix.
///
/// Blank summaries and headings count as absent. Newlines inside the
/// summary are collapsed so the prefix is always one line per field.
///
/// # Example
///
/// ```rust
/// use profile_rag_core::format::format_chunk;
///
/// let text = format_chunk("Led the React migration.", None, Some("Frontend Experience"));
/// assert_eq!(text, "Heading: Frontend Experience\n\nLed the React migration.");
/// ```
pub fn format_chunk(raw_text: &str, summary: Option<&str>, heading: Option<&str>) -> String {
    let mut out = String::with_capacity(raw_text.len() + 64);

    if let Some(summary) = summary.map(collapse_whitespace).filter(|s| !s.is_empty()) {
        out.push_str("Summary: ");
        out.push_str(&summary);
        out.push('\n');
    }

    let heading = heading.map(str::trim).filter(|h| !h.is_empty());
    out.push_str("Heading: ");
    out.push_str(heading.unwrap_or(NO_HEADING));
    out.push_str("\n\n");
    out.push_str(raw_text);
    out
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_and_heading() {
        let text = format_chunk("body", Some("A backend engineer."), Some("Skills"));
        assert_eq!(text, "Summary: A backend engineer.\nHeading: Skills\n\nbody");
    }

    #[test]
    fn test_missing_heading_uses_placeholder() {
        let text = format_chunk("body", None, None);
        assert_eq!(text, "Heading: No heading\n\nbody");
    }

    #[test]
    fn test_blank_values_are_absent() {
        let text = format_chunk("body", Some("   "), Some(""));
        assert_eq!(text, "Heading: No heading\n\nbody");
    }

    #[test]
    fn test_multiline_summary_is_collapsed() {
        let text = format_chunk("body", Some("Line one.\nLine  two."), Some("H"));
        assert!(text.starts_with("Summary: Line one. Line two.\nHeading: H\n\n"));
    }

    #[test]
    fn test_deterministic() {
        let a = format_chunk("x", Some("s"), Some("h"));
        let b = format_chunk("x", Some("s"), Some("h"));
        assert_eq!(a, b);
    }
}
