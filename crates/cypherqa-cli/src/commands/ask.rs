use anyhow::Result;
use clap::ArgMatches;
use cypherqa_core::config::QaConfig;
use cypherqa_core::formatter::AnswerFormatter;
use cypherqa_core::types::validate_question;
use cypherqa_core::{AskReport, ErrorKind, QaError};
use log::warn;
use serde_json::json;

use super::{question_arg, CommandHandler, Output};
use crate::pipeline_builder::build_pipeline;

pub struct AskCommand;

impl AskCommand {
    pub fn new() -> Self {
        Self
    }

    fn print_report(report: &AskReport, matches: &ArgMatches) -> Result<()> {
        if matches.get_flag("json") {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }
        let out = Output::from_matches(matches);
        if matches.get_flag("verbose") {
            if let Some(statement) = &report.statement {
                println!("{}", out.label("Generated query:"));
                println!("{}", out.query(statement));
                println!(
                    "{}",
                    out.dim(&format!("attempts: {}", report.attempts))
                );
                println!();
            }
        }
        println!("{}", report.answer);
        Ok(())
    }

    /// Failures before the pipeline runs still produce an answer, in the same
    /// shape as a report.
    fn print_early_failure(error: &QaError, formatter: &AnswerFormatter, matches: &ArgMatches) -> Result<()> {
        let answer = formatter.format_error(error);
        if matches.get_flag("json") {
            let kind: ErrorKind = error.kind();
            let value = json!({
                "answer": answer,
                "statement": null,
                "attempts": 0,
                "outcome": { "status": "failed", "kind": kind },
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("{}", answer);
        }
        Ok(())
    }
}

impl Default for AskCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler for AskCommand {
    async fn execute(&self, matches: &ArgMatches, config: &QaConfig) -> Result<()> {
        let formatter = AnswerFormatter::new(config.answer.wrap_width);
        let question = question_arg(matches);

        // Rejected input never opens a connection.
        if let Err(e) = validate_question(question) {
            return Self::print_early_failure(&QaError::from(e), &formatter, matches);
        }

        let mut pipeline = match build_pipeline(config).await {
            Ok(pipeline) => pipeline,
            Err(e @ QaError::Config(_)) => return Err(e.into()),
            Err(e) => {
                warn!("Could not set up the pipeline: {}", e);
                return Self::print_early_failure(&e, &formatter, matches);
            }
        };

        let report = pipeline.ask_detailed(question).await;
        Self::print_report(&report, matches)
    }
}
