//! Text hygiene for extracted page text and model output.

use regex::Regex;
use std::sync::LazyLock;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[\s\S]*?```").expect("valid code fence regex"));
static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("valid image regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid inline code regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+").expect("valid heading regex"));
static BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}>\s?").expect("valid blockquote regex"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+").expect("valid bullet regex"));
static RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*_]\s*){3,}$").expect("valid rule regex"));
static TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)[ \t]+$").expect("valid trailing space regex"));
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));
static LABEL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*([A-Za-z][^:\n]{0,60}):[ \t]*$").expect("valid label regex")
});
static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+").expect("valid line break regex"));
static REPEATED_PERIODS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\s*\.+").expect("valid period regex"));

/// Normalize line endings and blank lines while keeping paragraph structure intact.
///
/// NUL bytes become spaces, `\r\n`/`\r` become `\n`, trailing blanks are removed per line and
/// runs of three or more newlines collapse to a single blank line.
pub fn normalize_whitespace(text: &str) -> String {
    let unified = text
        .replace('\0', " ")
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    let trimmed = TRAILING_SPACE.replace_all(&unified, "");
    EXCESS_NEWLINES
        .replace_all(&trimmed, "\n\n")
        .trim()
        .to_string()
}

/// Collapse all whitespace runs to single spaces.
pub fn clean_page_text(text: &str) -> String {
    text.replace('\0', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Heuristic for scanned or protected PDFs whose text layer carries almost nothing.
///
/// Whitespace is collapsed first, so layout padding does not count as content.
pub fn is_low_information(text: &str) -> bool {
    let cleaned = clean_page_text(text);
    if cleaned.chars().count() < 200 {
        return true;
    }
    cleaned.chars().filter(|c| c.is_alphabetic()).count() < 50
}

/// Best-effort removal of markdown syntax from model output.
///
/// Readable text is kept; code fences and images are dropped entirely.
pub fn strip_markdown(text: &str) -> String {
    let text = CODE_FENCE.replace_all(text, " ");
    let text = IMAGE.replace_all(&text, " ");
    let text = LINK.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");
    let text = RULE.replace_all(&text, " ");
    let text = BULLET.replace_all(&text, "");
    text.replace("**", "").replace("__", "")
}

/// Markdown-free, whitespace-normalized text suitable for display and narration.
pub fn to_plain_text(text: &str) -> String {
    normalize_whitespace(&strip_markdown(text))
}

/// Plain text reshaped for narration: label lines end in a full stop and line breaks become
/// sentence breaks, leaving a single line.
pub fn to_speech_text(text: &str) -> String {
    let plain = to_plain_text(text);
    let labels = LABEL_LINE.replace_all(&plain, "$1.");
    let sentences = LINE_BREAKS.replace_all(&labels, ". ");
    let periods = REPEATED_PERIODS.replace_all(&sentences, ". ");
    clean_page_text(&periods)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_whitespace_keeps_paragraphs() {
        let raw = "Line one  \r\nLine two\r\n\r\n\r\n\r\nNext\0para";
        assert_eq!(normalize_whitespace(raw), "Line one\nLine two\n\nNext para");
    }

    #[test]
    fn clean_page_text_collapses_everything() {
        assert_eq!(clean_page_text("  a\n\n b\t c\0d "), "a b c d");
    }

    #[test]
    fn low_information_detects_short_and_symbol_heavy_text() {
        assert!(is_low_information("tiny"));
        assert!(is_low_information(&"1234 5678 ".repeat(40)));
        assert!(!is_low_information(&"Readable sentence here. ".repeat(20)));
    }

    #[test]
    fn strip_markdown_removes_common_syntax() {
        let raw = "# Title\n\n**Bold** text with [a link](http://x) and `code`.\n- item one\n2. item two\n```\nfn main() {}\n```";
        let plain = to_plain_text(raw);
        assert!(plain.starts_with("Title"));
        assert!(plain.contains("Bold text with a link and code."));
        assert!(plain.contains("item one"));
        assert!(plain.contains("item two"));
        assert!(!plain.contains("fn main"));
        assert!(!plain.contains('#'));
        assert!(!plain.contains("**"));
    }

    #[test]
    fn layout_padding_does_not_count_as_content() {
        let padded = format!("abc{}", " ".repeat(10)).repeat(20);
        assert!(padded.trim().chars().count() >= 200);
        assert!(is_low_information(&padded));
    }

    #[test]
    fn speech_text_turns_lists_into_sentences() {
        let summary = "## Key points\nAlpha:\n- First item\n- Second item.\n\nDone.";
        assert_eq!(
            to_speech_text(summary),
            "Key points. Alpha. First item. Second item. Done."
        );
        assert_eq!(to_speech_text("One line"), "One line");
    }

    #[test]
    fn strip_markdown_keeps_single_underscores() {
        assert_eq!(to_plain_text("snake_case_name"), "snake_case_name");
    }
}
