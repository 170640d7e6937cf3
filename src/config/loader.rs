//! Reading rule files from TOML.
//!
//! A single file is parsed and validated on its own. [`load_all`] merges
//! several files into one [`RuleSet`] and rejects ids that two files share,
//! since every report and log line names a rule by id alone.

use crate::config::schema::{PatchConfig, ValidationError};
use crate::rule::PatchRule;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read patch rules from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse patch rules TOML{}: {source}", origin(.path))]
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },

    #[error("invalid patch rules{}: {source}", origin(.path))]
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },

    #[error(
        "patch id '{id}' is defined in both {} and {}",
        .first.display(),
        .second.display()
    )]
    DuplicateId {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },
}

fn origin(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

/// Rule files loaded together, in load order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub files: Vec<(PathBuf, PatchConfig)>,
}

impl RuleSet {
    /// Every rule from every file, file by file in load order.
    pub fn rules(&self) -> Vec<PatchRule> {
        self.files
            .iter()
            .flat_map(|(_, config)| config.patches.iter().cloned())
            .collect()
    }
}

fn parse(input: &str, path: Option<&Path>) -> Result<PatchConfig, ConfigError> {
    let owned = || path.map(Path::to_path_buf);
    let config: PatchConfig = toml_edit::de::from_str(input).map_err(|source| {
        ConfigError::Toml {
            path: owned(),
            source,
        }
    })?;
    config.validate().map_err(|source| ConfigError::Validation {
        path: owned(),
        source,
    })?;
    Ok(config)
}

pub fn load_from_str(input: &str) -> Result<PatchConfig, ConfigError> {
    parse(input, None)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, Some(path))
}

/// Load several rule files into one set.
///
/// Fails on the first file that does not load, or on the first id that an
/// earlier file already defined.
pub fn load_all<I, P>(paths: I) -> Result<RuleSet, ConfigError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut files = Vec::new();

    for path in paths {
        let path = path.as_ref().to_path_buf();
        let config = load_from_path(&path)?;

        for rule in &config.patches {
            if let Some(first) = seen.get(&rule.id) {
                return Err(ConfigError::DuplicateId {
                    id: rule.id.clone(),
                    first: first.clone(),
                    second: path,
                });
            }
            seen.insert(rule.id.clone(), path.clone());
        }

        files.push((path, config));
    }

    Ok(RuleSet { files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ValidationIssue;
    use crate::locate::{LineEndings, MatchMode};

    fn rule_file(id: &str, file: &str) -> String {
        format!("[[patches]]\nid = \"{id}\"\nfile = \"{file}\"\nold = \"x\"\nnew = \"y\"\n")
    }

    #[test]
    fn test_load_minimal_rule() {
        let config = load_from_str(&rule_file("swap", "a.txt")).unwrap();

        let rule = &config.patches[0];
        assert_eq!(rule.occurrences, MatchMode::Unique);
        assert_eq!(rule.line_endings, LineEndings::AsIs);
        assert_eq!(config.meta.name, "");
    }

    #[test]
    fn test_validation_collects_every_issue() {
        let err = load_from_str(
            r#"
[[patches]]
id = "dup"
file = "a.txt"
old = "x"
new = "x"

[[patches]]
id = "dup"
file = ""
old = ""
new = "y"
"#,
        )
        .unwrap_err();

        let source = match err {
            ConfigError::Validation { source, path: None } => source,
            other => panic!("expected validation error, got {other}"),
        };
        assert!(source.issues.contains(&ValidationIssue::DuplicateId("dup".into())));
        assert!(source.issues.contains(&ValidationIssue::MissingField {
            patch_id: Some("dup".into()),
            field: "file",
        }));
        assert!(source.issues.contains(&ValidationIssue::MissingField {
            patch_id: Some("dup".into()),
            field: "old",
        }));
        assert!(source
            .issues
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::InvalidCombo { .. })));
    }

    #[test]
    fn test_empty_config_is_invalid() {
        let err = load_from_str("[meta]\nname = \"nothing\"\n").unwrap_err();
        assert!(err.to_string().contains("contains no patches"));
        assert!(err.to_string().starts_with("invalid patch rules: "));
    }

    #[test]
    fn test_unknown_rule_field_is_rejected() {
        let err = load_from_str(
            r#"
[[patches]]
id = "typo"
file = "a.txt"
old = "x"
new = "y"
ocurrences = "all"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Toml { path: None, .. }));
    }

    #[test]
    fn test_load_from_path_attaches_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "[[patches]\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { path: Some(_), .. }));
        assert!(err.to_string().contains("broken.toml"));

        let missing = load_from_path(temp_dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
        assert!(std::error::Error::source(&missing).is_some());
    }

    #[test]
    fn test_load_all_merges_files_in_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first = temp_dir.path().join("10-header.toml");
        let second = temp_dir.path().join("20-footer.toml");
        fs::write(&first, rule_file("header", "Header.tsx")).unwrap();
        fs::write(&second, rule_file("footer", "Footer.tsx")).unwrap();

        let set = load_all([&first, &second]).unwrap();

        assert_eq!(set.files.len(), 2);
        assert_eq!(set.files[0].0, first);
        let ids: Vec<String> = set.rules().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["header", "footer"]);
    }

    #[test]
    fn test_load_all_rejects_id_shared_across_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first = temp_dir.path().join("a.toml");
        let second = temp_dir.path().join("b.toml");
        fs::write(&first, rule_file("copy-fix", "Header.tsx")).unwrap();
        fs::write(&second, rule_file("copy-fix", "Footer.tsx")).unwrap();

        let err = load_all([&first, &second]).unwrap_err();

        match &err {
            ConfigError::DuplicateId {
                id,
                first: f,
                second: s,
            } => {
                assert_eq!(id, "copy-fix");
                assert_eq!(f, &first);
                assert_eq!(s, &second);
            }
            other => panic!("expected duplicate id error, got {other}"),
        }
        assert!(err.to_string().contains("a.toml"));
        assert!(err.to_string().contains("b.toml"));
    }

    #[test]
    fn test_load_all_stops_at_broken_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let good = temp_dir.path().join("good.toml");
        fs::write(&good, rule_file("ok", "a.txt")).unwrap();

        let err = load_all([good, temp_dir.path().join("absent.toml")]).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
