//! Block Patcher: literal block replacement for source files
//!
//! Replaces a known block of text in a file with a new block, and refuses to
//! touch the file when the expected block is not there.
//!
//! # Architecture
//!
//! Patch rules ([`PatchRule`]) name a target file, the literal text expected
//! in it, and its replacement. The [`locate`] module turns a rule into byte
//! spans, every span compiles down to a verified [`Edit`], and the
//! [`Patcher`] plans all rules in memory before committing any file.
//!
//! # Safety
//!
//! - Precondition failures abort before any write
//! - Exactly one occurrence required unless a rule opts into `first` or `all`
//! - Atomic file writes (tempfile + fsync + rename), permissions preserved
//! - Files changed between read and write are detected, not overwritten
//! - Optional root boundary enforcement
//!
//! # Example
//!
//! ```no_run
//! use block_patcher::apply_patch;
//!
//! match apply_patch("src/components/Footer.tsx", "<p>Old</p>", "<p>New</p>") {
//!     Ok(outcome) => println!("patched {}", outcome.file.display()),
//!     Err(e) => eprintln!("patch failed: {}", e),
//! }
//! ```

pub mod config;
pub mod edit;
pub mod error;
pub mod locate;
pub mod patcher;
pub mod rule;
pub mod safety;

// Re-exports
pub use config::{load_all, load_from_path, load_from_str, ConfigError, PatchConfig, RuleSet};
pub use edit::{Edit, EditError, EditVerification};
pub use error::{FileAction, PatchError, PreconditionError};
pub use locate::{ClosestLine, LineEndings, MatchMode};
pub use patcher::{apply_patch, FilePlan, PatchOutcome, Patcher, RuleReport};
pub use rule::PatchRule;
pub use safety::{RootGuard, SafetyError};
