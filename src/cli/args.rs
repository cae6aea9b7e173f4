//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Only log errors; no summaries

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// flatweave - Build flat clinical compositions from source documents
#[derive(Parser, Debug)]
#[command(name = "flatweave")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub debug: bool,

    /// Only log errors; no summaries
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build compositions from a JSON source document
    #[command(
        name = "generate",
        long_about = "Build compositions from a JSON source document.\n\n\
            Facts are extracted from the input using the source patterns named in \
            the mapping config, assigned to template addresses, completed with \
            template defaults, and printed as flat JSON, one composition per line.",
        after_help = "\
WORKFLOW EXAMPLES:
    # One composition from one document
    flatweave generate record.json -t template.json -c mapping.toml

    # One composition per element of a top-level array
    flatweave generate export.json -t template.json -c mapping.toml --relative-root '/records/*'

    # Print only the flat JSON
    flatweave generate record.json -t template.json -c mapping.toml --skip-ehr-id"
    )]
    Generate {
        /// Source JSON document
        input: PathBuf,

        /// Web template (JSON)
        #[arg(short, long, value_name = "FILE")]
        template: PathBuf,

        /// Mapping config (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Build one composition per node matching this pattern
        #[arg(long, value_name = "PATTERN")]
        relative_root: Option<String>,

        /// Do not print the ehr id before each composition
        #[arg(long)]
        skip_ehr_id: bool,
    },

    /// Show where a node id occurs in a template
    #[command(name = "inspect")]
    Inspect {
        /// Template node id to look for
        #[arg(required_unless_present = "tree")]
        node_id: Option<String>,

        /// Web template (JSON)
        #[arg(short, long, value_name = "FILE")]
        template: PathBuf,

        /// Render the whole template tree instead
        #[arg(long)]
        tree: bool,

        /// Print addresses with `:*` on repeatable steps
        #[arg(long)]
        wildcard: bool,
    },

    /// Print a mapping config skeleton for a template
    #[command(
        name = "skeleton",
        after_help = "\
WORKFLOW EXAMPLES:
    # Start a mapping config
    flatweave skeleton -t template.json > mapping.toml"
    )]
    Skeleton {
        /// Web template (JSON)
        #[arg(short, long, value_name = "FILE")]
        template: PathBuf,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        long_about = "Generate shell completion scripts for tab-completion.\n\n\
            Outputs a completion script for the specified shell. Add the output \
            to your shell's configuration to enable tab-completion for flatweave commands.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Bash (add to ~/.bashrc)
    flatweave completion bash >> ~/.bashrc

    # Zsh (add to ~/.zshrc)
    flatweave completion zsh >> ~/.zshrc

    # Fish
    flatweave completion fish > ~/.config/fish/completions/flatweave.fish

    # PowerShell
    flatweave completion powershell >> $PROFILE"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

impl From<Shell> for clap_complete::Shell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => Self::Bash,
            Shell::Zsh => Self::Zsh,
            Shell::Fish => Self::Fish,
            Shell::PowerShell => Self::PowerShell,
        }
    }
}
