//! Sentence segmentation for read-aloud runs.
//!
//! [`split_sentences`] is the strict splitter: a sentence ends at `.`, `!` or
//! `?` and an unterminated tail is dropped. [`segment`] adds the caller-side
//! policy used by the pipeline: when the text has no terminal punctuation at
//! all, every non-empty line becomes one segment instead.

/// Characters that end a sentence.
pub const TERMINATORS: [char; 3] = ['.', '!', '?'];

fn is_terminator(c: char) -> bool {
    TERMINATORS.contains(&c)
}

/// Collapse every whitespace run (including newlines) to a single space and trim.
///
/// Keeps each segment on one display line so line numbers match sentence indices.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into sentences ending in `.`, `!` or `?`.
///
/// The terminal punctuation stays with its sentence, and a run of terminators
/// (`"..."`, `"?!"`) stays together. Text after the last terminator is dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if !is_terminator(c) {
            continue;
        }
        while let Some(&next) = chars.peek() {
            if !is_terminator(next) {
                break;
            }
            current.push(next);
            chars.next();
        }
        let sentence = normalize_whitespace(&current);
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        current.clear();
    }

    if !current.trim().is_empty() {
        tracing::debug!(tail = %current.trim(), "Dropping unterminated trailing text");
    }

    sentences
}

/// Segments of one run, in speaking order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segments {
    segments: Vec<String>,
    from_lines: bool,
}

impl Segments {
    pub fn as_slice(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when the text had no terminal punctuation and lines were used.
    pub fn from_lines(&self) -> bool {
        self.from_lines
    }

    /// One segment per line; line `i` is highlighted for task index `i`.
    pub fn display_text(&self) -> String {
        self.segments.join("\n")
    }

    pub fn into_vec(self) -> Vec<String> {
        self.segments
    }
}

/// Segment text for a run.
///
/// Uses [`split_sentences`] when the text contains any terminal punctuation.
/// Otherwise each non-empty line is one segment. Indices are always contiguous
/// from zero, so the highlight index always names a line of [`Segments::display_text`].
pub fn segment(text: &str) -> Segments {
    let sentences = split_sentences(text);
    if !sentences.is_empty() {
        return Segments {
            segments: sentences,
            from_lines: false,
        };
    }

    let lines: Vec<String> = text
        .lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty())
        .collect();

    if !lines.is_empty() {
        tracing::debug!(
            lines = lines.len(),
            "No terminal punctuation, speaking line by line"
        );
    }

    Segments {
        segments: lines,
        from_lines: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_split_basic_scenario() {
        assert_eq!(
            split_sentences("Hello world. How are you? Fine!"),
            vec!["Hello world.", "How are you?", "Fine!"]
        );
    }

    #[test]
    fn test_split_drops_unterminated_tail() {
        assert_eq!(
            split_sentences("First one. Second one. and a dangling"),
            vec!["First one.", "Second one."]
        );
    }

    #[test]
    fn test_split_keeps_terminator_runs_together() {
        assert_eq!(
            split_sentences("Wait... Really?! Yes."),
            vec!["Wait...", "Really?!", "Yes."]
        );
    }

    #[test]
    fn test_split_collapses_internal_newlines() {
        assert_eq!(
            split_sentences("  A sentence\nthat wraps.\n\n Next  one!  "),
            vec!["A sentence that wraps.", "Next one!"]
        );
    }

    #[test]
    fn test_split_empty_and_whitespace() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   \n\t ").is_empty());
        assert!(split_sentences("no punctuation here").is_empty());
    }

    #[test]
    fn test_split_reconstructs_non_whitespace_content() {
        let inputs = [
            "Hello world. How are you? Fine!",
            "One.Two.Three.",
            "  Spaced   out .  Lines\nbreak!  tail",
            "Ends early?! then more text without end",
            "Numbers like 3.14 are split. Sadly.",
        ];
        for input in inputs {
            let last = input.rfind(TERMINATORS).unwrap();
            let expected = non_whitespace(&input[..=last]);
            let got = non_whitespace(&split_sentences(input).concat());
            assert_eq!(got, expected, "reconstruction failed for {input:?}");
        }
    }

    #[test]
    fn test_split_never_emits_empty_segments() {
        for s in split_sentences(". . ! ? hello. ") {
            assert!(!s.trim().is_empty());
        }
    }

    #[test]
    fn test_segment_prefers_sentences() {
        let segments = segment("Hello world. How are you?\nFine!");
        assert!(!segments.from_lines());
        assert_eq!(
            segments.as_slice(),
            &["Hello world.", "How are you?", "Fine!"]
        );
        assert_eq!(
            segments.display_text(),
            "Hello world.\nHow are you?\nFine!"
        );
    }

    #[test]
    fn test_segment_falls_back_to_lines_without_punctuation() {
        let segments = segment("first line\n\n   \n second   line \nthird");
        assert!(segments.from_lines());
        assert_eq!(
            segments.as_slice(),
            &["first line", "second line", "third"],
            "blank lines are skipped so indices stay contiguous"
        );
    }

    #[test]
    fn test_segment_with_punctuation_does_not_use_lines() {
        // The dangling second line is dropped rather than spoken as a line.
        let segments = segment("Done.\nstill typing");
        assert!(!segments.from_lines());
        assert_eq!(segments.into_vec(), vec!["Done.".to_string()]);
    }

    #[test]
    fn test_segment_empty_text() {
        let segments = segment("  \n ");
        assert!(segments.is_empty());
        assert_eq!(segments.len(), 0);
        assert_eq!(segments.display_text(), "");
    }
}
