//! cli
//!
//! Command-line interface layer for flatweave.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the log subscriber
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It reads files, hands their contents to
//! [`crate::core`] and [`crate::engine`], and prints the results. Logs go to
//! stderr so stdout stays machine-readable.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Flags shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    /// Debug logging enabled.
    pub debug: bool,
    /// Quiet mode (errors only).
    pub quiet: bool,
}

impl Context {
    /// Default filter directive for these flags.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let ctx = Context {
        debug: cli.debug,
        quiet: cli.quiet,
    };

    init_logging(&ctx);
    commands::dispatch(cli.command)
}

/// Log to stderr; `RUST_LOG` overrides the flag-derived level.
fn init_logging(ctx: &Context) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(ctx.log_level()));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_follows_flags() {
        assert_eq!(Context::default().log_level(), "info");
        assert_eq!(
            Context {
                debug: true,
                quiet: false
            }
            .log_level(),
            "debug"
        );
        assert_eq!(
            Context {
                debug: false,
                quiet: true
            }
            .log_level(),
            "error"
        );
    }
}
