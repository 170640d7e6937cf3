//! Plan-then-commit application of literal patch rules.
//!
//! Every rule is read, verified and applied in memory before anything touches
//! the disk. Only when all rules planned cleanly are files written, each one
//! through [`atomic_write`] after a fingerprint check that the file has not
//! changed since it was read.

use crate::edit::{atomic_write, Edit, EditVerification};
use crate::error::{PatchError, PreconditionError};
use crate::locate::locate;
use crate::rule::PatchRule;
use crate::safety::RootGuard;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Replacement count for one rule within a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleReport {
    pub id: String,
    pub replacements: usize,
}

/// In-memory result of applying every rule that targets one file.
#[derive(Debug, Clone)]
#[must_use = "FilePlan does nothing until committed"]
pub struct FilePlan {
    pub path: PathBuf,
    pub original: String,
    pub patched: String,
    pub rules: Vec<RuleReport>,
    fingerprint: u64,
}

impl FilePlan {
    pub fn replacements(&self) -> usize {
        self.rules.iter().map(|r| r.replacements).sum()
    }

    pub fn is_noop(&self) -> bool {
        self.original == self.patched
    }
}

/// Result of writing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub file: PathBuf,
    pub replacements: usize,
}

/// Applies patch rules, optionally confined to a root directory.
#[derive(Debug, Clone, Default)]
pub struct Patcher {
    guard: Option<RootGuard>,
}

impl Patcher {
    /// A patcher with no root: relative paths resolve against the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A patcher whose targets must live under `root`.
    pub fn with_root(root: impl AsRef<Path>) -> Result<Self, PatchError> {
        Ok(Self {
            guard: Some(RootGuard::new(root)?),
        })
    }

    /// Canonical root that targets are confined to, if any.
    pub fn root(&self) -> Option<&Path> {
        self.guard.as_ref().map(RootGuard::root)
    }

    fn resolve(&self, target: &Path) -> Result<PathBuf, PatchError> {
        match &self.guard {
            Some(guard) => Ok(guard.validate_path(target)?),
            None => target
                .canonicalize()
                .map_err(|source| PatchError::read(target, source)),
        }
    }

    /// Resolve every rule's target, failing on the first bad path.
    fn group<'a>(
        &self,
        rules: &'a [PatchRule],
    ) -> Result<Vec<(PathBuf, Vec<&'a PatchRule>)>, PatchError> {
        let mut resolved = Vec::with_capacity(rules.len());
        for rule in rules {
            resolved.push((self.resolve(&rule.target_path)?, rule));
        }
        Ok(group_by_path(resolved))
    }

    /// Read, verify and apply every rule in memory. Never writes.
    ///
    /// Rules targeting the same file apply in order, each seeing the output of
    /// the previous one. The first failing rule aborts the whole plan.
    pub fn plan(&self, rules: &[PatchRule]) -> Result<Vec<FilePlan>, PatchError> {
        self.group(rules)?
            .into_iter()
            .map(|(path, rules)| plan_file(path, &rules))
            .collect()
    }

    /// Evaluate every rule without writing, collecting a result per rule.
    ///
    /// Unlike [`Patcher::plan`] this does not stop at the first failure: a
    /// failing rule leaves the in-memory text untouched and evaluation moves on.
    pub fn check(&self, rules: &[PatchRule]) -> Vec<(String, Result<RuleReport, PatchError>)> {
        let mut results = Vec::with_capacity(rules.len());

        // Resolve individually so one bad path does not hide the other rules
        let mut resolved = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            match self.resolve(&rule.target_path) {
                Ok(path) => resolved.push((path, (index, rule))),
                Err(e) => results.push((index, rule.id.clone(), Err(e))),
            }
        }

        for (path, rules) in group_by_path(resolved) {
            let mut text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(source) => {
                    // std::io::Error is not Clone; rebuild one per rule from kind + message
                    let kind = source.kind();
                    let msg = source.to_string();
                    for (index, rule) in rules {
                        results.push((
                            index,
                            rule.id.clone(),
                            Err(PatchError::read(&path, std::io::Error::new(kind, msg.clone()))),
                        ));
                    }
                    continue;
                }
            };

            for (index, rule) in rules {
                match apply_rule(&path, &text, rule) {
                    Ok((patched, report)) => {
                        text = patched;
                        results.push((index, rule.id.clone(), Ok(report)));
                    }
                    Err(e) => results.push((index, rule.id.clone(), Err(e))),
                }
            }
        }

        // Restore rule order; grouping by file reorders results and ids may repeat
        results.sort_by_key(|(index, _, _)| *index);

        results
            .into_iter()
            .map(|(_, id, result)| (id, result))
            .collect()
    }

    /// Write every plan to disk.
    ///
    /// Each file is re-validated against the root and re-fingerprinted right
    /// before its write; the first mismatch stops the commit.
    pub fn commit(&self, plans: &[FilePlan]) -> Result<Vec<PatchOutcome>, PatchError> {
        plans.iter().map(|plan| self.commit_plan(plan)).collect()
    }

    fn commit_plan(&self, plan: &FilePlan) -> Result<PatchOutcome, PatchError> {
        if let Some(guard) = &self.guard {
            guard.revalidate(&plan.path)?;
        }

        let current = fs::read(&plan.path).map_err(|source| PatchError::read(&plan.path, source))?;
        if xxh3_64(&current) != plan.fingerprint {
            warn!(file = %plan.path.display(), "file changed since it was read");
            return Err(PatchError::Precondition {
                file: plan.path.clone(),
                source: PreconditionError::ChangedSinceRead,
            });
        }

        atomic_write(&plan.path, plan.patched.as_bytes())
            .map_err(|source| PatchError::write(&plan.path, source))?;

        info!(
            file = %plan.path.display(),
            replacements = plan.replacements(),
            bytes = plan.patched.len(),
            "patched"
        );

        Ok(PatchOutcome {
            file: plan.path.clone(),
            replacements: plan.replacements(),
        })
    }

    /// Plan and commit `rules`. Nothing is written unless every rule plans cleanly.
    pub fn apply(&self, rules: &[PatchRule]) -> Result<Vec<PatchOutcome>, PatchError> {
        let plans = self.plan(rules)?;
        self.commit(&plans)
    }
}

/// Replace the single occurrence of `old` in the file at `target` with `new`.
///
/// Fails with a precondition error, without writing, when `old` is missing or
/// occurs more than once.
pub fn apply_patch(
    target: impl AsRef<Path>,
    old: &str,
    new: &str,
) -> Result<PatchOutcome, PatchError> {
    let patcher = Patcher::new();
    let rule = PatchRule::new(target.as_ref(), old, new);
    let path = patcher.resolve(&rule.target_path)?;
    let plan = plan_file(path, &[&rule])?;
    patcher.commit_plan(&plan)
}

/// Group resolved rules by target, keeping first-seen file order.
fn group_by_path<T>(resolved: Vec<(PathBuf, T)>) -> Vec<(PathBuf, Vec<T>)> {
    let mut order = Vec::new();
    let mut groups: HashMap<PathBuf, Vec<T>> = HashMap::new();

    for (path, rule) in resolved {
        if !groups.contains_key(&path) {
            order.push(path.clone());
        }
        groups.entry(path).or_default().push(rule);
    }

    order
        .into_iter()
        .map(|path| {
            let rules = groups.remove(&path).unwrap_or_default();
            (path, rules)
        })
        .collect()
}

fn read_target(path: &Path) -> Result<String, PatchError> {
    let text = fs::read_to_string(path).map_err(|source| PatchError::read(path, source))?;
    debug!(file = %path.display(), bytes = text.len(), "read target");
    Ok(text)
}

fn plan_file(path: PathBuf, rules: &[&PatchRule]) -> Result<FilePlan, PatchError> {
    let original = read_target(&path)?;
    let fingerprint = xxh3_64(original.as_bytes());

    let mut text = original.clone();
    let mut reports = Vec::with_capacity(rules.len());
    for rule in rules {
        let (patched, report) = apply_rule(&path, &text, rule)?;
        text = patched;
        reports.push(report);
    }

    Ok(FilePlan {
        path,
        original,
        patched: text,
        rules: reports,
        fingerprint,
    })
}

fn apply_rule(
    path: &Path,
    content: &str,
    rule: &PatchRule,
) -> Result<(String, RuleReport), PatchError> {
    let located = locate(
        content,
        &rule.old_text,
        &rule.new_text,
        rule.occurrences,
        rule.line_endings,
    )
    .map_err(|source| {
        warn!(rule = %rule.id, file = %path.display(), %source, "precondition failed");
        PatchError::Precondition {
            file: path.to_path_buf(),
            source,
        }
    })?;

    debug!(
        rule = %rule.id,
        file = %path.display(),
        matches = located.spans.len(),
        "located old text"
    );

    // Every span holds the same old text, so verify them all against one digest
    let verification = EditVerification::from_text(&located.old_text);
    let edits = located
        .spans
        .iter()
        .map(|span| {
            Edit::with_verification(
                span.start,
                span.end,
                located.new_text.as_str(),
                verification.clone(),
            )
        })
        .collect();

    let patched = Edit::apply_all(content, edits).map_err(|source| PatchError::Edit {
        file: path.to_path_buf(),
        source,
    })?;

    Ok((
        patched,
        RuleReport {
            id: rule.id.clone(),
            replacements: located.spans.len(),
        },
    ))
}
