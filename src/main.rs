//! vaultsync CLI - bidirectional configuration sync
//!
//! Usage: vaultsync <COMMAND>
//!
//! Commands:
//!   pull     Materialize the remote configuration into the working directory
//!   push     Apply local changes to the remote
//!   package  Build, submit, and validate a deployment package
//!   patch    Render local changes as a unified diff against the remote
//!   clean    Remove the local checksum state

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use vaultsync::package::{PackageOutcome, ValidationOutcome};
use vaultsync::patch::{render_json_manifest, render_patch};
use vaultsync::{
    ChecksumState, FileSession, HttpGateway, IgnoreRules, PackageBuilder, PatchGenerator,
    PullOrchestrator, PushOrchestrator, VaultConfig,
};

/// vaultsync - checksum-driven sync between a source tree and a remote vault
#[derive(Parser, Debug)]
#[command(name = "vaultsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Working directory (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the remote configuration and delete local orphans
    Pull,

    /// Apply local changes and deletions to the remote
    Push {
        /// Log intended actions without calling the remote or touching state
        #[arg(long)]
        dry_run: bool,
    },

    /// Build a deployment package from changed components and validate it
    Package,

    /// Render changed components as a unified diff against the remote
    Patch {
        /// Emit a JSON manifest of original/modified file pairs instead
        #[arg(long)]
        json: bool,

        /// Write the patch to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete the checksum state, forcing full re-detection next run
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let workdir = match cli.dir {
        Some(dir) => dir,
        None => env::current_dir().context("cannot resolve the current directory")?,
    };

    match cli.command {
        Commands::Pull => cmd_pull(&workdir),
        Commands::Push { dry_run } => cmd_push(&workdir, dry_run),
        Commands::Package => cmd_package(&workdir),
        Commands::Patch { json, output } => cmd_patch(&workdir, json, output.as_deref()),
        Commands::Clean => cmd_clean(&workdir),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "vaultsync=info",
        1 => "vaultsync=debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn connect(workdir: &Path) -> Result<(HttpGateway<FileSession>, VaultConfig)> {
    let config = VaultConfig::load(workdir)?;
    let session = FileSession::new(config.clone(), workdir);
    let gateway = HttpGateway::new(&config, session);
    Ok((gateway, config))
}

fn cmd_pull(workdir: &Path) -> Result<()> {
    let (gateway, _) = connect(workdir)?;
    let mut state = ChecksumState::load(workdir)?;
    let ignore = IgnoreRules::load(workdir)?;

    let report = PullOrchestrator::new(&gateway, workdir).run(&mut state, &ignore)?;
    println!(
        "Pull complete: {} updated, {} deleted",
        report.updated, report.deleted
    );
    if report.failed_adapters > 0 {
        anyhow::bail!(
            "{} adapter(s) failed to enumerate; their files were left untouched",
            report.failed_adapters
        );
    }
    Ok(())
}

fn cmd_push(workdir: &Path, dry_run: bool) -> Result<()> {
    let (gateway, _) = connect(workdir)?;
    let mut state = ChecksumState::load(workdir)?;
    let ignore = IgnoreRules::load(workdir)?;

    let report = PushOrchestrator::new(&gateway, workdir).run(&mut state, &ignore, dry_run)?;
    if dry_run {
        println!(
            "Dry run: {} change(s) would be applied, {} skipped",
            report.applied, report.skipped
        );
        return Ok(());
    }
    println!(
        "Push complete: {} applied, {} failed, {} skipped",
        report.applied, report.failed, report.skipped
    );
    if report.failed > 0 {
        anyhow::bail!("{} item(s) failed to apply", report.failed);
    }
    Ok(())
}

fn cmd_package(workdir: &Path) -> Result<()> {
    let (gateway, config) = connect(workdir)?;
    let state = ChecksumState::load(workdir)?;
    let ignore = IgnoreRules::load(workdir)?;
    let author = config.username.as_deref().unwrap_or("vaultsync");

    let outcome = PackageBuilder::new(&gateway, workdir).run(&state, &ignore, author)?;
    match outcome {
        PackageOutcome::NoChanges => {
            println!("No changed components; nothing to package");
            Ok(())
        }
        PackageOutcome::Built {
            package_id,
            validation,
        } => {
            println!("Package imported: {}", package_id);
            match validation {
                ValidationOutcome::Passed => {
                    println!("Validation passed");
                    Ok(())
                }
                ValidationOutcome::Failed(detail) => {
                    anyhow::bail!("package {} failed validation: {}", package_id, detail)
                }
            }
        }
    }
}

fn cmd_patch(workdir: &Path, json: bool, output: Option<&Path>) -> Result<()> {
    let (gateway, _) = connect(workdir)?;
    let state = ChecksumState::load(workdir)?;
    let ignore = IgnoreRules::load(workdir)?;

    let pairs = PatchGenerator::new(&gateway, workdir).collect(&state, &ignore)?;
    if pairs.is_empty() {
        println!("No diffable changes");
        return Ok(());
    }

    let rendered = if json {
        render_json_manifest(workdir, &pairs)?
    } else {
        render_patch(&pairs)
    };

    match output {
        Some(path) => {
            fs::write(path, &rendered)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("Patch written to {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn cmd_clean(workdir: &Path) -> Result<()> {
    if ChecksumState::clear_backing(workdir)? {
        println!("Checksum state removed");
    } else {
        println!("No checksum state to remove");
    }
    Ok(())
}
