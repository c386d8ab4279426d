use std::io::Write;

use anyhow::Result;
use clap::ArgMatches;
use cypherqa_core::config::QaConfig;
use cypherqa_core::formatter::{wrap_text, AnswerFormatter};
use cypherqa_core::{Pipeline, QaError};
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CommandHandler, Output};
use crate::pipeline_builder::build_pipeline;

pub const PROMPT: &str = "? ";

const HELP: &str = "Type a question, or one of:\n  :schema   print the schema\n  :refresh  reload the schema from the database\n  :help     show this help\n  :quit     exit";

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Question(String),
    Refresh,
    Schema,
    Help,
    Quit,
    Blank,
    Unknown(String),
}

pub fn parse_line(line: &str) -> ReplInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplInput::Blank;
    }
    match trimmed {
        ":quit" | ":q" | ":exit" => ReplInput::Quit,
        ":refresh" => ReplInput::Refresh,
        ":schema" => ReplInput::Schema,
        ":help" | ":h" => ReplInput::Help,
        command if command.starts_with(':') => ReplInput::Unknown(command.to_string()),
        question => ReplInput::Question(question.to_string()),
    }
}

/// Reply to one input. `None` ends the session.
pub async fn respond(pipeline: &mut Pipeline, input: ReplInput, out: Output, verbose: bool) -> Option<String> {
    let wrap_width = pipeline.formatter().wrap_width();
    let reply = match input {
        ReplInput::Quit => return None,
        ReplInput::Blank => String::new(),
        ReplInput::Help => HELP.to_string(),
        ReplInput::Unknown(command) => format!("Unknown command {}. Type :help for the list.", command),
        ReplInput::Refresh => match pipeline.refresh_schema().await {
            Ok(schema) => format!(
                "Schema reloaded: {} node labels, {} relationship types.",
                schema.node_labels.len(),
                schema.relationship_types.len()
            ),
            Err(e) => pipeline.formatter().format_error(&e).into_string(),
        },
        ReplInput::Schema => {
            let loaded = if pipeline.schema().is_some() {
                Ok(())
            } else {
                pipeline.refresh_schema().await.map(|_| ())
            };
            match (loaded, pipeline.schema()) {
                (Ok(()), Some(schema)) => wrap_text(&schema.to_prompt_text(), wrap_width),
                (Err(e), _) => pipeline.formatter().format_error(&e).into_string(),
                (Ok(()), None) => pipeline
                    .formatter()
                    .format_error(&QaError::Internal("schema missing after refresh".to_string()))
                    .into_string(),
            }
        }
        ReplInput::Question(question) => {
            let report = pipeline.ask_detailed(&question).await;
            match (&report.statement, verbose) {
                (Some(statement), true) => format!(
                    "{}\n{}\n\n{}",
                    out.label("Generated query:"),
                    out.query(statement),
                    report.answer
                ),
                _ => report.answer.into_string(),
            }
        }
    };
    Some(reply)
}

pub struct ReplCommand;

impl ReplCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReplCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler for ReplCommand {
    async fn execute(&self, matches: &ArgMatches, config: &QaConfig) -> Result<()> {
        let out = Output::from_matches(matches);
        let verbose = matches.get_flag("verbose");

        let mut pipeline = match build_pipeline(config).await {
            Ok(pipeline) => pipeline,
            Err(e @ QaError::Config(_)) => return Err(e.into()),
            Err(e) => {
                println!("{}", AnswerFormatter::new(config.answer.wrap_width).format_error(&e));
                return Ok(());
            }
        };

        // Load once up front so the first question does not pay for it.
        if let Err(e) = pipeline.refresh_schema().await {
            println!("{}", pipeline.formatter().format_error(&e));
        }

        println!("{}", out.dim("Ask a question, :help for commands, :quit to exit."));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{}", out.label(PROMPT));
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                debug!("stdin closed");
                break;
            };
            match respond(&mut pipeline, parse_line(&line), out, verbose).await {
                Some(reply) if reply.is_empty() => {}
                Some(reply) => println!("{}\n", reply),
                None => break,
            }
        }
        info!("Interactive session ended");
        Ok(())
    }
}
