use std::fs;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Spans longer than this are verified by hash instead of by copy.
const HASH_THRESHOLD: usize = 1024;

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Literal patch rules compile down to one or more of these. Locating the
/// span is the caller's job; an `Edit` only checks that the span still holds
/// what the caller saw and splices in the replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until applied to content"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to insert at [byte_start, byte_end)
    pub new_text: String,
    /// What we expect to find in the span before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (cheaper to carry for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using a hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > HASH_THRESHOLD {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("before-text verification failed at bytes [{byte_start}, {byte_end})")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        expected: String,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in content of length {len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("byte offset {offset} is not on a UTF-8 character boundary")]
    NotCharBoundary { offset: usize },

    #[error("overlapping edits: span ending at {first_end} overlaps span starting at {second_start}")]
    Overlap {
        first_end: usize,
        second_start: usize,
    },
}

impl Edit {
    /// Create a new edit with automatic verification generation.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl AsRef<str>,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before.as_ref()),
        }
    }

    /// Create an edit with explicit verification strategy.
    pub fn with_verification(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        verification: EditVerification,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: verification,
        }
    }

    /// Validate the edit against `content`.
    ///
    /// Returns the current text at [byte_start, byte_end) if validation succeeds.
    fn validate<'a>(&self, content: &'a str) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                len: content.len(),
            });
        }

        for offset in [self.byte_start, self.byte_end] {
            if !content.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }

        let current = &content[self.byte_start..self.byte_end];
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                expected: format!("{:?}", self.expected_before),
                found: current.to_string(),
            });
        }

        Ok(current)
    }

    /// Apply this edit to `content`, returning the new text.
    pub fn apply_to(&self, content: &str) -> Result<String, EditError> {
        self.validate(content)?;

        let span_len = self.byte_end - self.byte_start;
        let mut out = String::with_capacity(content.len() - span_len + self.new_text.len());
        out.push_str(&content[..self.byte_start]);
        out.push_str(&self.new_text);
        out.push_str(&content[self.byte_end..]);
        Ok(out)
    }

    /// Apply several edits to the same content in one pass.
    ///
    /// Every edit is validated against the original content first. Edits are
    /// then sorted by byte_start descending and applied bottom-to-top so
    /// earlier offsets stay valid.
    pub fn apply_all(content: &str, mut edits: Vec<Edit>) -> Result<String, EditError> {
        for edit in &edits {
            edit.validate(content)?;
        }

        edits.sort_by(|a, b| b.byte_start.cmp(&a.byte_start));

        // Sorted descending: the earlier span must end before the later one starts
        for window in edits.windows(2) {
            let (later, earlier) = (&window[0], &window[1]);
            if earlier.byte_end > later.byte_start {
                return Err(EditError::Overlap {
                    first_end: earlier.byte_end,
                    second_start: later.byte_start,
                });
            }
        }

        let mut out = content.to_string();
        for edit in &edits {
            out.replace_range(edit.byte_start..edit.byte_end, &edit.new_text);
        }
        Ok(out)
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// The temp file lives next to the target so the rename stays on one
/// filesystem. The target's permissions are carried over to the replacement.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(path)?.permissions();

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    fs::set_permissions(temp.path(), permissions)?;

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_verification_exact_match() {
        let text = "hello world";
        let verify = EditVerification::ExactMatch(text.to_string());
        assert!(verify.matches(text));
        assert!(!verify.matches("hello"));
    }

    #[test]
    fn test_edit_verification_hash() {
        let text = "hello world";
        let verify = EditVerification::Hash(xxh3_64(text.as_bytes()));
        assert!(verify.matches(text));
        assert!(!verify.matches("goodbye world"));
    }

    #[test]
    fn test_edit_verification_from_text_large() {
        let text = "x".repeat(2000);
        let verify = EditVerification::from_text(&text);
        assert!(matches!(verify, EditVerification::Hash(_)));
        assert!(verify.matches(&text));
        assert!(matches!(
            EditVerification::from_text("small"),
            EditVerification::ExactMatch(_)
        ));
    }

    #[test]
    fn test_shared_hash_verification_across_spans() {
        let block = "y".repeat(1500);
        let content = format!("{block}|{block}");
        let verification = EditVerification::from_text(&block);
        let edits = vec![
            Edit::with_verification(0, 1500, "A", verification.clone()),
            Edit::with_verification(1501, 3001, "B", verification),
        ];
        assert_eq!(Edit::apply_all(&content, edits).unwrap(), "A|B");

        let stale = Edit::with_verification(0, 1500, "A", EditVerification::from_text(&block));
        let err = stale.apply_to(&"z".repeat(1500)).unwrap_err();
        assert!(matches!(err, EditError::BeforeTextMismatch { .. }));
    }

    #[test]
    fn test_apply_to_splices_span() {
        let edit = Edit::new(6, 11, "there", "world");
        assert_eq!(edit.apply_to("hello world!").unwrap(), "hello there!");
    }

    #[test]
    fn test_apply_to_rejects_wrong_before_text() {
        let edit = Edit::new(0, 5, "HELLO", "howdy");
        let err = edit.apply_to("hello world").unwrap_err();
        assert!(matches!(err, EditError::BeforeTextMismatch { .. }));
    }

    #[test]
    fn test_invalid_ranges() {
        let past_end = Edit::new(5, 20, "x", "");
        assert!(matches!(
            past_end.apply_to("hello world"),
            Err(EditError::InvalidByteRange { .. })
        ));

        let inverted = Edit::new(10, 5, "x", "");
        assert!(matches!(
            inverted.apply_to("hello world"),
            Err(EditError::InvalidByteRange { .. })
        ));
    }

    #[test]
    fn test_rejects_split_character() {
        // "é" is two bytes; offset 1 falls inside it
        let edit = Edit::new(1, 2, "x", "\u{a9}");
        assert!(matches!(
            edit.apply_to("é"),
            Err(EditError::NotCharBoundary { offset: 1 })
        ));
    }

    #[test]
    fn test_apply_all_bottom_to_top() {
        let content = "line1\nline2\nline3\n";
        let edits = vec![
            Edit::new(0, 5, "LINE1", "line1"),
            Edit::new(12, 17, "THIRD LINE", "line3"),
            Edit::new(6, 11, "L2", "line2"),
        ];
        assert_eq!(
            Edit::apply_all(content, edits).unwrap(),
            "LINE1\nL2\nTHIRD LINE\n"
        );
    }

    #[test]
    fn test_apply_all_rejects_overlap() {
        let content = "abcdef";
        let edits = vec![Edit::new(0, 4, "x", "abcd"), Edit::new(2, 6, "y", "cdef")];
        assert!(matches!(
            Edit::apply_all(content, edits),
            Err(EditError::Overlap { .. })
        ));
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, b"original content").unwrap();

        atomic_write(&file_path, b"modified content").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "modified content");
    }

    #[test]
    #[cfg(unix)]
    fn test_atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("script.sh");
        fs::write(&file_path, b"echo one\n").unwrap();
        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o755)).unwrap();

        atomic_write(&file_path, b"echo two\n").unwrap();

        let mode = fs::metadata(&file_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
