use crate::locate::{LineEndings, MatchMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// A literal substitution: replace `old_text` with `new_text` in `target_path`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchRule {
    pub id: String,
    #[serde(rename = "file")]
    pub target_path: PathBuf,
    #[serde(rename = "old")]
    pub old_text: String,
    #[serde(rename = "new")]
    pub new_text: String,
    #[serde(default)]
    pub occurrences: MatchMode,
    #[serde(default)]
    pub line_endings: LineEndings,
}

impl PatchRule {
    /// Create a rule with the default policies (unique match, literal line endings).
    ///
    /// The id defaults to the target path.
    pub fn new(
        target_path: impl Into<PathBuf>,
        old_text: impl Into<String>,
        new_text: impl Into<String>,
    ) -> Self {
        let target_path = target_path.into();
        Self {
            id: target_path.display().to_string(),
            target_path,
            old_text: old_text.into(),
            new_text: new_text.into(),
            occurrences: MatchMode::default(),
            line_endings: LineEndings::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_occurrences(mut self, mode: MatchMode) -> Self {
        self.occurrences = mode;
        self
    }

    pub fn with_line_endings(mut self, line_endings: LineEndings) -> Self {
        self.line_endings = line_endings;
        self
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let rule = PatchRule::new("src/App.tsx", "old", "new");
        assert_eq!(rule.id, "src/App.tsx");
        assert_eq!(rule.occurrences, MatchMode::Unique);
        assert_eq!(rule.line_endings, LineEndings::AsIs);

        let rule = rule
            .with_id("swap-header")
            .with_occurrences(MatchMode::All)
            .with_line_endings(LineEndings::MatchFile);
        assert_eq!(rule.id, "swap-header");
        assert_eq!(rule.occurrences, MatchMode::All);
        assert_eq!(rule.line_endings, LineEndings::MatchFile);
        assert_eq!(rule.target_path(), Path::new("src/App.tsx"));
    }
}
