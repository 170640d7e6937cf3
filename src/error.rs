use crate::edit::EditError;
use crate::locate::ClosestLine;
use crate::safety::SafetyError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Which side of the read/write cycle an I/O failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Read,
    Write,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileAction::Read => write!(f, "read"),
            FileAction::Write => write!(f, "write"),
        }
    }
}

/// The target document is not in the state a patch rule expects.
///
/// Raised before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub enum PreconditionError {
    /// The rule's old text is empty, which would match everywhere
    EmptyPattern,
    /// The old text does not occur in the document
    NotFound {
        /// The new text is already present, so the patch was probably applied
        already_applied: bool,
        /// Most similar line to the start of the old text, if any is close
        closest: Option<ClosestLine>,
    },
    /// The old text occurs more often than the rule allows
    Ambiguous { count: usize },
    /// The file on disk no longer matches what was planned against
    ChangedSinceRead,
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionError::EmptyPattern => write!(f, "old text is empty"),
            PreconditionError::NotFound {
                already_applied: true,
                ..
            } => write!(
                f,
                "expected text not found (replacement text is already present)"
            ),
            PreconditionError::NotFound { .. } => write!(f, "expected text not found"),
            PreconditionError::Ambiguous { count } => {
                write!(f, "expected text occurs {count} times (expected exactly 1)")
            }
            PreconditionError::ChangedSinceRead => {
                write!(f, "file changed on disk after it was read")
            }
        }
    }
}

impl std::error::Error for PreconditionError {}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("precondition failed for {}: {source}", .file.display())]
    Precondition {
        file: PathBuf,
        source: PreconditionError,
    },

    #[error("cannot {action} {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        action: FileAction,
        source: io::Error,
    },

    #[error(transparent)]
    OutsideRoot(SafetyError),

    #[error("edit failed for {}: {source}", .file.display())]
    Edit { file: PathBuf, source: EditError },
}

impl PatchError {
    pub(crate) fn read(path: &Path, source: io::Error) -> Self {
        PatchError::FileAccess {
            path: path.to_path_buf(),
            action: FileAction::Read,
            source,
        }
    }

    pub(crate) fn write(path: &Path, source: io::Error) -> Self {
        PatchError::FileAccess {
            path: path.to_path_buf(),
            action: FileAction::Write,
            source,
        }
    }

    /// True when the document was reachable but not in the expected state.
    pub fn is_precondition(&self) -> bool {
        matches!(self, PatchError::Precondition { .. })
    }

    /// True when the failing rule looks like it has already been applied.
    pub fn is_already_applied(&self) -> bool {
        matches!(
            self,
            PatchError::Precondition {
                source: PreconditionError::NotFound {
                    already_applied: true,
                    ..
                },
                ..
            }
        )
    }

    /// Process exit code for this failure: 2 for preconditions, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_precondition() {
            2
        } else {
            1
        }
    }
}

impl From<SafetyError> for PatchError {
    fn from(err: SafetyError) -> Self {
        match err {
            SafetyError::Canonicalize { path, source } => PatchError::FileAccess {
                path,
                action: FileAction::Read,
                source,
            },
            other => PatchError::OutsideRoot(other),
        }
    }
}
