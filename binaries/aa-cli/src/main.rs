//! aa-tools CLI
//!
//! Imports upstream AppArmor profiles into the local policy tree and merges
//! duplicate file rules in place.

mod logging;

use std::io::IsTerminal;
use std::path::PathBuf;

use aa_config::AaConfig;
use aa_core::{BackupStore, Mode, SafeWriter, WriteOutcome};
use aa_import::{fetcher_for, Importer, Selector};
use aa_merge::DedupeRun;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "aa-tools")]
#[command(about = "Import upstream AppArmor profiles and merge duplicate rules")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/aa-tools/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import upstream profiles (source: AA_SOURCE_REPO, destination: AA_DEST_ROOT)
    Import {
        /// Also select every file under abstractions/ and abi/
        #[arg(long)]
        abstractions_only: bool,

        /// Comma-separated keywords, replacing the configured list
        #[arg(long, value_delimiter = ',')]
        keywords: Option<Vec<String>>,

        /// Target enforcement mode
        #[arg(long)]
        mode: Option<Mode>,

        /// Branch to clone
        #[arg(long)]
        branch: Option<String>,

        /// Report what would be written without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Merge consecutive duplicate file rules (dry run unless --apply)
    Dedupe {
        /// Policy directory to scan
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Write changes (with backups)
        #[arg(long)]
        apply: bool,

        /// Suffix appended to backup file names
        #[arg(long)]
        backup_suffix: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(logging::LogOptions {
        verbose: cli.verbose,
        ansi: std::io::stderr().is_terminal(),
    });

    let mut config = AaConfig::load(cli.config.as_deref())?;
    config.apply_env();

    let code = match cli.command {
        Commands::Import {
            abstractions_only,
            keywords,
            mode,
            branch,
            dry_run,
        } => cmd_import(config, abstractions_only, keywords, mode, branch, dry_run)?,
        Commands::Dedupe {
            dir,
            apply,
            backup_suffix,
            json,
        } => cmd_dedupe(config, dir, apply, backup_suffix, json)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn outcome_label(outcome: &WriteOutcome) -> String {
    match outcome {
        WriteOutcome::Unchanged => "unchanged".to_string(),
        WriteOutcome::Planned => "would write".to_string(),
        WriteOutcome::Created => "created".to_string(),
        WriteOutcome::Updated { backup } => format!("updated (backup: {})", backup.display()),
    }
}

fn cmd_import(
    mut config: AaConfig,
    abstractions_only: bool,
    keywords: Option<Vec<String>>,
    mode: Option<Mode>,
    branch: Option<String>,
    dry_run: bool,
) -> Result<i32> {
    let settings = &mut config.import;
    if let Some(keywords) = keywords {
        settings.keywords = keywords;
    }
    if let Some(mode) = mode {
        settings.mode = mode;
    }
    if branch.is_some() {
        settings.branch = branch;
    }
    settings.abstractions_only |= abstractions_only;

    let tree = fetcher_for(&settings.source_repo, settings.branch.clone())
        .fetch()
        .with_context(|| format!("Failed to fetch {}", settings.source_repo))?;

    let selector = Selector::new(
        &settings.keywords,
        &settings.exclude,
        settings.abstractions_only,
    );
    let writer = SafeWriter::new(
        BackupStore::timestamped(&config.backup.root, config.backup.suffix.clone()),
        dry_run,
    );
    let importer = Importer::new(
        settings.source_subdir.clone(),
        settings.dest_root.clone(),
        settings.mode,
        selector,
        writer,
    );

    let report = importer.run(tree.root())?;

    println!();
    println!("  IMPORT ({})", settings.mode);
    println!("  ============");
    for (path, outcome) in &report.imported {
        println!("  {:<48} {}", path.display(), outcome_label(outcome));
    }
    if !report.dependency_copies.copied.is_empty() {
        println!();
        println!("  DEPENDENCIES");
        for (path, outcome) in &report.dependency_copies.copied {
            println!("  {:<48} {}", path.display(), outcome_label(outcome));
        }
    }
    for missing in &report.dependency_copies.missing {
        println!("  {:<48} missing upstream", missing);
    }
    let failures = report
        .failures
        .iter()
        .chain(report.dependency_copies.failures.iter());
    for failure in failures {
        eprintln!("  FAILED {}: {}", failure.path.display(), failure.error);
    }
    println!();

    info!(
        imported = report.imported.len(),
        dependencies = report.dependencies.len(),
        failures = report.failure_count(),
        "import finished"
    );
    Ok(report.exit_code())
}

fn cmd_dedupe(
    config: AaConfig,
    dir: Option<PathBuf>,
    apply: bool,
    backup_suffix: Option<String>,
    json: bool,
) -> Result<i32> {
    let target = dir.unwrap_or(config.dedupe.target_dir);
    if !target.is_dir() {
        anyhow::bail!("Target directory {} does not exist", target.display());
    }

    let suffix = backup_suffix.unwrap_or(config.backup.suffix);
    let writer = SafeWriter::new(
        BackupStore::timestamped(&config.backup.root, suffix),
        !apply,
    );
    let report = DedupeRun::new(&target, writer).run();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.exit_code());
    }

    println!();
    if report.changed.is_empty() {
        println!(
            "  No duplicate rules in {} ({} files scanned)",
            target.display(),
            report.scanned
        );
    } else if report.dry_run {
        println!("  Files with mergeable rules (dry run, use --apply to write):");
        for changed in &report.changed {
            println!("    {}", changed.path.display());
        }
    } else {
        println!("  Merged duplicate rules:");
        for changed in &report.changed {
            println!(
                "    {}  ->  {}",
                changed.path.display(),
                outcome_label(&changed.outcome)
            );
        }
    }
    for skipped in &report.skipped {
        println!("  skipped (not UTF-8): {}", skipped.display());
    }
    for failure in &report.failures {
        eprintln!("  FAILED {}: {}", failure.path.display(), failure.error);
    }
    println!();

    Ok(report.exit_code())
}
