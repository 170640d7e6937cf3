use anyhow::Result;
use block_patcher::config::{load_all, RuleSet};
use block_patcher::{FilePlan, PatchError, Patcher, PreconditionError};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "block-patcher")]
#[command(about = "Replace literal blocks in source files, refusing to write when the expected text is absent", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch rules to files under a root
    Apply {
        /// Rule files to apply (otherwise applies all in <root>/patches/)
        configs: Vec<PathBuf>,

        /// Directory relative targets resolve against (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report whether each rule can be applied, without writing
    Check {
        /// Rule files to check (otherwise checks all in <root>/patches/)
        configs: Vec<PathBuf>,

        /// Directory relative targets resolve against (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// List patch rules and their targets
    List {
        /// Rule files to list (otherwise lists all in <root>/patches/)
        configs: Vec<PathBuf>,

        /// Directory holding the patches/ folder (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Apply {
            configs,
            root,
            dry_run,
            diff,
        } => cmd_apply(configs, root, dry_run, diff),

        Commands::Check { configs, root } => cmd_check(configs, root),

        Commands::List { configs, root } => cmd_list(configs, root),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve the patch root: explicit flag, else the current directory.
fn resolve_root(cli_root: Option<PathBuf>) -> Result<PathBuf> {
    match cli_root {
        Some(path) => Ok(path.canonicalize()?),
        None => Ok(env::current_dir()?),
    }
}

/// Helper: Discover all .toml rule files in `<root>/patches`.
fn discover_patch_files(root: &Path) -> Result<Vec<PathBuf>> {
    let patches_dir = root.join("patches");

    let mut files = Vec::new();
    if patches_dir.is_dir() {
        for entry in WalkDir::new(&patches_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    files.sort();

    if files.is_empty() {
        anyhow::bail!("No .toml rule files found in {}", patches_dir.display());
    }

    Ok(files)
}

/// Load every rule file, either the explicit list or the discovered ones.
fn load_configs(configs: Vec<PathBuf>, root: &Path) -> Result<RuleSet> {
    let files = if configs.is_empty() {
        discover_patch_files(root)?
    } else {
        configs
    };

    Ok(load_all(files)?)
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", format!("{}", hunk.header()).cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

/// Print a failure with whatever hint the error carries.
fn report_failure(label: &str, err: &PatchError) {
    eprintln!("{} {}: {}", "✗".red(), label, err);

    let PatchError::Precondition { source, .. } = err else {
        return;
    };

    match source {
        PreconditionError::NotFound {
            already_applied: true,
            ..
        } => {
            eprintln!("  The replacement text is already present; this patch looks applied.");
        }
        PreconditionError::NotFound { closest, .. } => {
            eprintln!("  {}", "CONFLICT: expected text not found".red());
            eprintln!("  The file has diverged from the state this rule was written against.");
            if let Some(hint) = closest {
                eprintln!(
                    "  Closest line {} ({:.0}% similar): {}",
                    hint.line,
                    hint.similarity * 100.0,
                    hint.text.trim().dimmed()
                );
            }
        }
        PreconditionError::Ambiguous { count } => {
            eprintln!(
                "  {}",
                format!("CONFLICT: expected text matched {} locations (expected 1)", count).red()
            );
            eprintln!("  Action: extend the old text, or set occurrences = \"first\" or \"all\"");
        }
        PreconditionError::ChangedSinceRead => {
            eprintln!("  Another process modified the file; re-run once it is idle.");
        }
        PreconditionError::EmptyPattern => {}
    }
}

fn report_plans(plans: &[FilePlan], verb: &str, show_diff: bool) {
    for plan in plans {
        for rule in &plan.rules {
            println!(
                "{} {}: {} {} ({} replacement{})",
                "✓".green(),
                rule.id,
                verb,
                plan.path.display(),
                rule.replacements,
                if rule.replacements == 1 { "" } else { "s" }
            );
        }
        if show_diff && !plan.is_noop() {
            display_diff(&plan.path, &plan.original, &plan.patched);
        }
    }
}

fn cmd_apply(
    configs: Vec<PathBuf>,
    root: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let root = resolve_root(root)?;
    let set = load_configs(configs, &root)?;
    let rules = set.rules();
    let patcher = Patcher::with_root(&root)?;

    println!("Root: {}", patcher.root().unwrap_or(root.as_path()).display());
    for (path, config) in &set.files {
        println!("Loaded {} rule(s) from {}", config.patches.len(), path.display());
    }
    println!();

    // Plan everything first; any failure means nothing is written
    let plans = match patcher.plan(&rules) {
        Ok(plans) => plans,
        Err(e) => {
            report_failure("plan", &e);
            eprintln!("\n{}", "No files were modified.".bold());
            std::process::exit(e.exit_code());
        }
    };

    if dry_run {
        println!("{}", "[DRY RUN - showing what would be applied]".cyan());
        report_plans(&plans, "Would patch", show_diff);
    } else {
        if let Err(e) = patcher.commit(&plans) {
            report_failure("commit", &e);
            std::process::exit(e.exit_code());
        }
        report_plans(&plans, "Patched", show_diff);
    }

    let replacements: usize = plans.iter().map(FilePlan::replacements).sum();
    println!();
    println!("{}", "Summary:".bold());
    println!("  {} file(s)", format!("{}", plans.len()).green());
    println!("  {} replacement(s)", format!("{}", replacements).green());

    Ok(())
}

fn cmd_check(configs: Vec<PathBuf>, root: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(root)?;
    let set = load_configs(configs, &root)?;
    let rules = set.rules();
    let patcher = Patcher::with_root(&root)?;

    println!("{}", "Checking patch rules...".bold());
    println!("Root: {}", patcher.root().unwrap_or(root.as_path()).display());
    println!();

    let mut ready = 0;
    let mut applied = 0;
    let mut failed = 0;
    let mut worst_exit = 0;

    for (id, result) in patcher.check(&rules) {
        match result {
            Ok(report) => {
                println!(
                    "{} {}: ready ({} replacement{})",
                    "✓".green(),
                    id,
                    report.replacements,
                    if report.replacements == 1 { "" } else { "s" }
                );
                ready += 1;
            }
            Err(e) if e.is_already_applied() => {
                println!("{} {}: already applied", "⊙".yellow(), id);
                applied += 1;
                worst_exit = worst_exit.max(e.exit_code());
            }
            Err(e) => {
                report_failure(&id, &e);
                failed += 1;
                worst_exit = worst_exit.max(e.exit_code());
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} ready", format!("{}", ready).green());
    println!("  {} already applied", format!("{}", applied).yellow());
    println!("  {} failed", format!("{}", failed).red());

    if worst_exit > 0 {
        std::process::exit(worst_exit);
    }

    Ok(())
}

fn cmd_list(configs: Vec<PathBuf>, root: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(root)?;
    let set = load_configs(configs, &root)?;

    for (path, config) in &set.files {
        let name = if config.meta.name.is_empty() {
            path.display().to_string()
        } else {
            config.meta.name.clone()
        };
        println!("{} ({})", name.bold(), path.display().to_string().dimmed());
        if let Some(description) = &config.meta.description {
            println!("  {}", description);
        }
        for rule in &config.patches {
            println!(
                "  - {} -> {} [occurrences: {}]",
                rule.id,
                rule.target_path.display(),
                rule.occurrences
            );
        }
        println!();
    }

    Ok(())
}
