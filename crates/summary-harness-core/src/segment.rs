//! Paragraph-boundary text segmenter.
//!
//! Groups paragraphs into sections of roughly `max_section_length`
//! characters. Paragraphs are never split; the segmenter only decides how
//! many consecutive paragraphs share a section.
//!
//! # Algorithm
//!
//! 1. Split the input on blank lines (one or more lines that are empty
//!    after trimming). Trim each paragraph and drop empty ones.
//! 2. Append each paragraph to the running section, separated by `\n\n`.
//! 3. Once the running section's length reaches or exceeds
//!    `max_section_length`, emit it (including the paragraph just appended)
//!    and start a new one.
//! 4. Emit any non-empty remainder.
//!
//! # Example
//!
//! ```rust
//! use summary_harness_core::segment::segment;
//!
//! let sections = segment("alpha\n\nbeta\n\n\ngamma", 10);
//! assert_eq!(sections, vec!["alpha\n\nbeta", "gamma"]);
//! ```

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Split `text` into sections on paragraph boundaries.
///
/// Lengths are measured in characters. Empty or whitespace-only input
/// produces no sections.
pub fn segment(text: &str, max_section_length: usize) -> Vec<String> {
    segment_all(&[text], max_section_length)
}

/// Segment several texts as if their paragraphs were concatenated in
/// argument order.
pub fn segment_all<S: AsRef<str>>(texts: &[S], max_section_length: usize) -> Vec<String> {
    let mut sections = Vec::new();
    let mut section = String::new();
    let mut section_chars = 0usize;

    for paragraph in texts.iter().flat_map(|t| paragraphs(t.as_ref())) {
        if !section.is_empty() {
            section.push_str(PARAGRAPH_SEPARATOR);
            section_chars += PARAGRAPH_SEPARATOR.len();
        }
        section.push_str(&paragraph);
        section_chars += paragraph.chars().count();

        if section_chars >= max_section_length {
            sections.push(std::mem::take(&mut section));
            section_chars = 0;
        }
    }
    if !section.is_empty() {
        sections.push(section);
    }
    sections
}

/// Non-empty, trimmed paragraphs of `text` in order.
pub fn paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }
    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(segment("", 100).is_empty());
        assert!(segment("\n\n   \n\n", 100).is_empty());
    }

    #[test]
    fn test_single_paragraph() {
        assert_eq!(segment("  hello world  ", 100), vec!["hello world"]);
    }

    #[test]
    fn test_single_newline_stays_in_paragraph() {
        assert_eq!(paragraphs("line one\nline two"), vec!["line one\nline two"]);
    }

    #[test]
    fn test_blank_runs_and_whitespace_lines_split() {
        assert_eq!(
            paragraphs("a\n\n\n\nb\n   \nc\r\n\r\nd"),
            vec!["a", "b", "c", "d"]
        );
    }

    #[test]
    fn test_emits_section_including_paragraph_that_reaches_limit() {
        let first = "a".repeat(6000);
        let second = "b".repeat(5000);
        let text = format!("{}\n\n{}", first, second);

        let sections = segment(&text, 10_000);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0], format!("{}\n\n{}", first, second));
    }

    #[test]
    fn test_exact_limit_is_inclusive() {
        let sections = segment("abcde\n\nfghij", 5);
        assert_eq!(sections, vec!["abcde", "fghij"]);
    }

    #[test]
    fn test_remainder_emitted() {
        let sections = segment("aaaa\n\nbbbb\n\ncc", 10);
        assert_eq!(sections, vec!["aaaa\n\nbbbb", "cc"]);
    }

    #[test]
    fn test_sections_reproduce_paragraphs_in_order() {
        let text = "one\n\ntwo two\n\n\nthree three three\n\nfour\n\nfive five";
        for max in [1, 3, 8, 15, 1000] {
            let sections = segment(text, max);
            let rejoined: Vec<String> = sections.iter().flat_map(|s| paragraphs(s)).collect();
            assert_eq!(rejoined, paragraphs(text), "max={}", max);
        }
    }

    #[test]
    fn test_segment_all_concatenates_in_order() {
        let sections = segment_all(&["a\n\nb", "c"], 100);
        assert_eq!(sections, vec!["a\n\nb\n\nc"]);
    }
}
