//! Command-line access to the `.testtree/` store.
//!
//! Scaffolds the store, validates it, merges result files offline and prints
//! a status summary with a machine-readable exit code.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use testtree::exit_codes;
use testtree::io::layout::{InitOptions, init_store};
use testtree::merge::merge_fragment;
use testtree::summary::summarize;
use testtree::validate::validate_store;

#[derive(Parser)]
#[command(name = "testtree", version, about = "Hierarchical test-result tree")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.testtree/` with schema, default config and an empty snapshot.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
        /// Framework id recorded in the snapshot.
        #[arg(long, default_value = "default")]
        framework: String,
    },
    /// Check config and snapshot against schema and invariants.
    Validate,
    /// Print suite statuses; exits 2 when the framework is failing.
    Summary,
    /// Merge a runner result file into a suite and rewrite the snapshot.
    Merge {
        /// Test file the result belongs to; also the suite id.
        suite: PathBuf,
        /// JSON result fragment.
        fragment: PathBuf,
        /// Remove children missing from the fragment (full run).
        #[arg(long)]
        cleanup: bool,
    },
}

fn main() {
    testtree::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = Path::new(".");
    match cli.command {
        Command::Init { force, framework } => {
            init_store(root, &InitOptions { force, framework })?;
            Ok(exit_codes::OK)
        }
        Command::Validate => {
            validate_store(root)?;
            Ok(exit_codes::OK)
        }
        Command::Summary => {
            validate_store(root)?;
            let summary = summarize(root)?;
            print!("{summary}");
            if summary.is_failing() {
                Ok(exit_codes::FAILED)
            } else {
                Ok(exit_codes::OK)
            }
        }
        Command::Merge {
            suite,
            fragment,
            cleanup,
        } => {
            let summary = merge_fragment(root, &suite, &fragment, cleanup)?;
            println!(
                "{}: {}{} (+{} -{})",
                summary.id,
                summary.status,
                if summary.partial { " partial" } else { "" },
                summary.added.len(),
                summary.removed.len()
            );
            Ok(exit_codes::OK)
        }
    }
}
