//! Binary entry point for strata.
//!
//! A thin command surface over the memory store for hooks, scripts and
//! humans.

// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use strata::cli::{Context, consolidate, maintenance, memory};
use strata::observability::{LoggingConfig, init_logging};

/// Strata - a durable, self-consolidating project knowledge base.
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project directory.
    #[arg(short, long, global = true, env = "STRATA_PROJECT_DIR", default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Name and describe the project.
    Init {
        /// Project name (defaults to the directory name).
        #[arg(short, long)]
        name: Option<String>,

        /// One-line description.
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Add a memory.
    Add {
        /// The content to remember.
        content: String,

        /// Memory type: architecture, decision, pattern, gotcha, progress, context.
        #[arg(short = 't', long = "type", default_value = "context")]
        memory_type: String,

        /// Tags (comma-separated).
        #[arg(long)]
        tags: Option<String>,

        /// Id of a memory this one replaces.
        #[arg(long)]
        supersedes: Option<String>,

        /// Description of the memory this one replaces, matched against
        /// active memories of the same type.
        #[arg(long, conflicts_with = "supersedes")]
        supersedes_matching: Option<String>,
    },

    /// Delete a memory by id.
    Delete {
        /// Memory id.
        id: String,
    },

    /// List memories.
    List {
        /// Filter by type.
        #[arg(short = 't', long = "type")]
        memory_type: Option<String>,

        /// Filter by any of these tags (comma-separated).
        #[arg(long)]
        tags: Option<String>,

        /// Include superseded and archived memories.
        #[arg(short, long)]
        all: bool,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search memories.
    Search {
        /// The search query.
        query: String,

        /// Maximum number of results.
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Find memories sharing any tag.
    Related {
        /// Tags (comma-separated).
        #[arg(long)]
        tags: String,

        /// Filter by type.
        #[arg(short = 't', long = "type")]
        memory_type: Option<String>,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Recompute confidence of progress and context memories.
    Decay,

    /// Show record counts.
    Stats {
        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Render the digest into the host document.
    Digest {
        /// Print instead of writing the host document.
        #[arg(long)]
        stdout: bool,
    },

    /// Record one extraction run.
    Extraction,

    /// Consolidate memories.
    Consolidate {
        #[command(subcommand)]
        action: ConsolidateAction,
    },
}

/// Consolidation steps.
#[derive(Subcommand)]
enum ConsolidateAction {
    /// Show whether consolidation is due.
    Status,

    /// Print proposal groups as JSON.
    Prepare,

    /// Apply a plan for one type.
    Apply {
        /// Type of the group the plan answers.
        #[arg(short = 't', long = "type")]
        memory_type: String,

        /// Plan file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        plan: PathBuf,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = init_logging(&LoggingConfig::from_env(cli.verbose)) {
        eprintln!("Warning: logging disabled: {e}");
    }

    match run(cli) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn run(cli: Cli) -> anyhow::Result<String> {
    let ctx = Context::load(&cli.project, cli.config.as_deref())
        .context("failed to load configuration")?;

    let output = match cli.command {
        Commands::Init { name, description } => {
            memory::init(&ctx, name.as_deref(), description.as_deref())
        },
        Commands::Add {
            content,
            memory_type,
            tags,
            supersedes,
            supersedes_matching,
        } => memory::add(
            &ctx,
            &memory_type,
            &content,
            tags.as_deref(),
            supersedes.as_deref(),
            supersedes_matching.as_deref(),
        ),
        Commands::Delete { id } => memory::delete(&ctx, &id),
        Commands::List {
            memory_type,
            tags,
            all,
            json,
        } => memory::list(&ctx, memory_type.as_deref(), tags.as_deref(), all, json),
        Commands::Search { query, limit, json } => memory::search(&ctx, &query, limit, json),
        Commands::Related {
            tags,
            memory_type,
            json,
        } => memory::related(&ctx, &tags, memory_type.as_deref(), json),
        Commands::Decay => maintenance::decay(&ctx),
        Commands::Stats { json } => memory::stats(&ctx, json),
        Commands::Digest { stdout } => maintenance::digest(&ctx, stdout),
        Commands::Extraction => memory::extraction(&ctx),
        Commands::Consolidate { action } => match action {
            ConsolidateAction::Status => consolidate::status(&ctx),
            ConsolidateAction::Prepare => consolidate::prepare(&ctx),
            ConsolidateAction::Apply { memory_type, plan } => {
                let plan_json = consolidate::read_plan(&plan)?;
                consolidate::apply(&ctx, &memory_type, &plan_json)
            },
        },
    }?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_supersedes_flags_conflict() {
        let parsed = Cli::try_parse_from([
            "strata", "add", "Moved to Fly", "--supersedes", "m-1", "--supersedes-matching",
            "Heroku",
        ]);
        assert!(parsed.is_err());

        let cli = Cli::try_parse_from(["strata", "add", "Moved to Fly", "--supersedes-matching", "Heroku"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Add { supersedes_matching: Some(ref text), .. } if text == "Heroku"
        ));
    }

    #[test]
    fn test_parses_consolidate_apply() {
        let cli = Cli::try_parse_from([
            "strata", "-p", "/tmp/proj", "consolidate", "apply", "--type", "decision", "--plan",
            "plan.json",
        ])
        .unwrap();
        assert_eq!(cli.project, PathBuf::from("/tmp/proj"));
        assert!(matches!(
            cli.command,
            Commands::Consolidate {
                action: ConsolidateAction::Apply { .. }
            }
        ));
    }
}
