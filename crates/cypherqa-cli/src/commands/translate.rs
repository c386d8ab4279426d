use anyhow::Result;
use clap::ArgMatches;
use cypherqa_core::config::QaConfig;
use cypherqa_core::formatter::AnswerFormatter;
use cypherqa_core::types::{validate_question, TranslationResult};
use cypherqa_core::QaError;

use super::{question_arg, CommandHandler, Output};
use crate::pipeline_builder::build_pipeline;

/// Prints the guarded statement a question translates to. Nothing is executed.
pub struct TranslateCommand;

impl TranslateCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TranslateCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler for TranslateCommand {
    async fn execute(&self, matches: &ArgMatches, config: &QaConfig) -> Result<()> {
        let out = Output::from_matches(matches);
        let formatter = AnswerFormatter::new(config.answer.wrap_width);
        let question = question_arg(matches);

        if let Err(e) = validate_question(question) {
            println!("{}", formatter.format_error(&QaError::from(e)));
            return Ok(());
        }

        let mut pipeline = match build_pipeline(config).await {
            Ok(pipeline) => pipeline,
            Err(e @ QaError::Config(_)) => return Err(e.into()),
            Err(e) => {
                println!("{}", formatter.format_error(&e));
                return Ok(());
            }
        };

        match pipeline.translate_question(question).await {
            Ok(TranslationResult::Query(statement)) => println!("{}", out.query(statement.as_str())),
            Ok(TranslationResult::Rejected(rejection)) => {
                println!("{}", formatter.format_rejection(&rejection))
            }
            Err(e) => println!("{}", formatter.format_error(&e)),
        }
        Ok(())
    }
}
