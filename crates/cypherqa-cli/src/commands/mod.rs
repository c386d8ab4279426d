/// CLI command modules, one per subcommand
pub mod ask;
pub mod repl;
pub mod schema;
pub mod translate;

use anyhow::Result;
use clap::ArgMatches;
use cypherqa_core::config::QaConfig;
use owo_colors::OwoColorize;

/// Trait for CLI command handlers
#[allow(async_fn_in_trait)]
pub trait CommandHandler {
    /// Execute the command with the given arguments and configuration
    async fn execute(&self, matches: &ArgMatches, config: &QaConfig) -> Result<()>;
}

/// Terminal styling shared by the handlers.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    color: bool,
}

impl Output {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self::new(!matches.get_flag("no-color"))
    }

    pub fn label(&self, text: &str) -> String {
        if self.color {
            text.cyan().bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn query(&self, text: &str) -> String {
        if self.color {
            text.green().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn dim(&self, text: &str) -> String {
        if self.color {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }
}

pub(crate) fn question_arg(matches: &ArgMatches) -> &str {
    matches
        .get_one::<String>("question")
        .map(String::as_str)
        .unwrap_or_default()
}
