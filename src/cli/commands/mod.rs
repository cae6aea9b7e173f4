//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Loads the files named on the command line
//! 2. Calls into [`crate::core`] or [`crate::engine`]
//! 3. Prints results to stdout
//!
//! Handlers never log results they also print; logs go to stderr.

mod completion;
mod generate;
mod inspect;
mod skeleton;

pub use completion::completion;
pub use generate::generate;
pub use inspect::inspect;
pub use skeleton::skeleton;

use std::path::Path;

use anyhow::{Context as _, Result};

use crate::cli::args::Command;
use crate::core::template::Template;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Generate {
            input,
            template,
            config,
            relative_root,
            skip_ehr_id,
        } => generate::generate(
            &input,
            &template,
            &config,
            relative_root.as_deref(),
            skip_ehr_id,
        ),
        Command::Inspect {
            node_id,
            template,
            tree,
            wildcard,
        } => inspect::inspect(&template, node_id.as_deref(), tree, wildcard),
        Command::Skeleton { template } => skeleton::skeleton(&template),
        Command::Completion { shell } => completion::completion(shell),
    }
}

/// Read and parse a web template file.
pub(crate) fn load_template(path: &Path) -> Result<Template> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    Template::parse(&text).with_context(|| format!("Invalid template {}", path.display()))
}
