pub mod loader;
pub mod schema;

pub use loader::{load_all, load_from_path, load_from_str, ConfigError, RuleSet};
pub use schema::{Metadata, PatchConfig, ValidationError, ValidationIssue};
