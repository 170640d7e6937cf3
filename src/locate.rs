//! Finding literal blocks inside a target document.
//!
//! Matching is purely textual: no tokenizing, no whitespace folding. The only
//! transformation ever applied to a rule's literals is the optional line
//! ending adaptation selected by [`LineEndings::MatchFile`].

use crate::error::PreconditionError;
use serde::Deserialize;
use std::fmt;
use std::ops::Range;

/// Minimum normalized similarity for a line to be offered as a hint.
const HINT_THRESHOLD: f64 = 0.6;

/// How many occurrences of the old text a rule accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Exactly one occurrence, counting overlapping ones
    #[default]
    Unique,
    /// Replace the first occurrence, ignore the rest
    First,
    /// Replace every non-overlapping occurrence
    All,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Unique => write!(f, "unique"),
            MatchMode::First => write!(f, "first"),
            MatchMode::All => write!(f, "all"),
        }
    }
}

/// Line ending handling for a rule's literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineEndings {
    /// Match the literals byte-for-byte
    #[default]
    AsIs,
    /// Rewrite both literals to the document's dominant line ending first
    MatchFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eol {
    Lf,
    CrLf,
}

impl Eol {
    /// Dominant line ending of `content`. Ties go to CRLF; no newlines at all is LF.
    pub fn detect(content: &str) -> Self {
        let crlf = content.matches("\r\n").count();
        let bare_lf = content.matches('\n').count() - crlf;
        if crlf > 0 && crlf >= bare_lf {
            Eol::CrLf
        } else {
            Eol::Lf
        }
    }

    /// Rewrite every line break in `text` to this ending.
    pub fn apply(self, text: &str) -> String {
        let normalized = text.replace("\r\n", "\n");
        match self {
            Eol::Lf => normalized,
            Eol::CrLf => normalized.replace('\n', "\r\n"),
        }
    }
}

/// A line in the document resembling the first line of a missing block.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosestLine {
    /// 1-based line number
    pub line: usize,
    pub text: String,
    /// Normalized Levenshtein similarity in [0, 1]
    pub similarity: f64,
}

/// Result of locating a rule's old text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// Byte spans to replace, in document order
    pub spans: Vec<Range<usize>>,
    /// Old text as matched (after line ending adaptation)
    pub old_text: String,
    /// New text to splice in (after line ending adaptation)
    pub new_text: String,
}

/// Locate `old` in `content` according to `mode`.
///
/// Fails with a [`PreconditionError`] when the occurrence count does not fit
/// the mode. On a miss, reports whether `new` is already present and the
/// closest-looking line.
pub fn locate(
    content: &str,
    old: &str,
    new: &str,
    mode: MatchMode,
    line_endings: LineEndings,
) -> Result<Located, PreconditionError> {
    let (old_text, new_text) = match line_endings {
        LineEndings::AsIs => (old.to_string(), new.to_string()),
        LineEndings::MatchFile => {
            let eol = Eol::detect(content);
            (eol.apply(old), eol.apply(new))
        }
    };

    if old_text.is_empty() {
        return Err(PreconditionError::EmptyPattern);
    }

    let spans: Vec<Range<usize>> = match mode {
        MatchMode::Unique => match count_overlapping(content, &old_text) {
            0 => Vec::new(),
            1 => content
                .find(&old_text)
                .map(|start| start..start + old_text.len())
                .into_iter()
                .collect(),
            count => return Err(PreconditionError::Ambiguous { count }),
        },
        MatchMode::First => content
            .find(&old_text)
            .map(|start| start..start + old_text.len())
            .into_iter()
            .collect(),
        MatchMode::All => content
            .match_indices(&old_text)
            .map(|(start, m)| start..start + m.len())
            .collect(),
    };

    if spans.is_empty() {
        return Err(PreconditionError::NotFound {
            already_applied: !new_text.is_empty() && content.contains(&new_text),
            closest: closest_line(content, &old_text),
        });
    }

    Ok(Located {
        spans,
        old_text,
        new_text,
    })
}

/// Count occurrences of `needle`, including ones that overlap each other.
fn count_overlapping(haystack: &str, needle: &str) -> usize {
    // Advance by the needle's first char so every restart is a char boundary
    let step = needle.chars().next().map_or(1, char::len_utf8);
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        count += 1;
        from += pos + step;
    }
    count
}

/// Find the document line most similar to the first non-blank line of `old`.
pub fn closest_line(content: &str, old: &str) -> Option<ClosestLine> {
    let needle = old.lines().map(str::trim).find(|l| !l.is_empty())?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| ClosestLine {
            line: idx + 1,
            text: line.to_string(),
            similarity: strsim::normalized_levenshtein(needle, line.trim()),
        })
        .filter(|hint| hint.similarity >= HINT_THRESHOLD)
        .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(content: &str, old: &str, new: &str) -> Result<Located, PreconditionError> {
        locate(content, old, new, MatchMode::Unique, LineEndings::AsIs)
    }

    #[test]
    fn test_unique_match() {
        let located = unique("a OLD b", "OLD", "NEW").unwrap();
        assert_eq!(located.spans, vec![2..5]);
    }

    #[test]
    fn test_unique_rejects_duplicates() {
        let err = unique("OLD OLD OLD", "OLD", "NEW").unwrap_err();
        assert_eq!(err, PreconditionError::Ambiguous { count: 3 });
    }

    #[test]
    fn test_unique_counts_overlapping_occurrences() {
        let err = unique("aaa", "aa", "b").unwrap_err();
        assert_eq!(err, PreconditionError::Ambiguous { count: 2 });
    }

    #[test]
    fn test_first_and_all() {
        let first = locate("x-x-x", "x", "y", MatchMode::First, LineEndings::AsIs).unwrap();
        assert_eq!(first.spans, vec![0..1]);

        let all = locate("x-x-x", "x", "y", MatchMode::All, LineEndings::AsIs).unwrap();
        assert_eq!(all.spans, vec![0..1, 2..3, 4..5]);
    }

    #[test]
    fn test_empty_pattern() {
        let err = locate("anything", "", "new", MatchMode::All, LineEndings::AsIs).unwrap_err();
        assert_eq!(err, PreconditionError::EmptyPattern);
    }

    #[test]
    fn test_not_found_reports_already_applied() {
        let err = unique("a NEW b", "OLD", "NEW").unwrap_err();
        assert!(matches!(
            err,
            PreconditionError::NotFound {
                already_applied: true,
                ..
            }
        ));
    }

    #[test]
    fn test_not_found_offers_closest_line() {
        let content = "fn main() {\n    let total = compute(1);\n}\n";
        let err = unique(content, "    let totals = compute(1);\n", "").unwrap_err();

        match err {
            PreconditionError::NotFound {
                already_applied: false,
                closest: Some(hint),
            } => {
                assert_eq!(hint.line, 2);
                assert!(hint.similarity > 0.9);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_match_file_adapts_lf_rule_to_crlf_document() {
        let content = "one\r\ntwo\r\nthree\r\n";
        let located = locate(
            content,
            "two\nthree\n",
            "2\n3\n",
            MatchMode::Unique,
            LineEndings::MatchFile,
        )
        .unwrap();
        assert_eq!(located.old_text, "two\r\nthree\r\n");
        assert_eq!(located.new_text, "2\r\n3\r\n");
        assert_eq!(located.spans, vec![5..17]);
    }

    #[test]
    fn test_as_is_does_not_adapt_line_endings() {
        let err = unique("one\r\ntwo\r\n", "one\ntwo", "x").unwrap_err();
        assert!(matches!(err, PreconditionError::NotFound { .. }));
    }

    #[test]
    fn test_eol_detection() {
        assert_eq!(Eol::detect("a\r\nb\r\nc\n"), Eol::CrLf);
        assert_eq!(Eol::detect("a\nb\nc\r\n"), Eol::Lf);
        assert_eq!(Eol::detect("no newline"), Eol::Lf);
        assert_eq!(Eol::CrLf.apply("a\nb\r\n"), "a\r\nb\r\n");
    }

    #[test]
    fn test_count_overlapping_multibyte() {
        assert_eq!(count_overlapping("ééé", "éé"), 2);
        assert_eq!(count_overlapping("abc", "z"), 0);
    }
}
