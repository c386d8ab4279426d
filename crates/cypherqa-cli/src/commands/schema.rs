use std::time::Duration;

use anyhow::Result;
use clap::ArgMatches;
use cypherqa_core::config::QaConfig;
use cypherqa_core::error::StoreError;
use cypherqa_core::formatter::{wrap_text, AnswerFormatter};
use cypherqa_core::redaction::redact_secrets_in_text;
use cypherqa_core::QaError;
use log::info;

use super::{CommandHandler, Output};
use crate::pipeline_builder::{connect_store, schema_describer};

/// Schema inspection and connection check
pub struct SchemaCommand;

impl SchemaCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SchemaCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler for SchemaCommand {
    async fn execute(&self, matches: &ArgMatches, config: &QaConfig) -> Result<()> {
        let out = Output::from_matches(matches);
        let formatter = AnswerFormatter::new(config.answer.wrap_width);

        let store = match connect_store(config).await {
            Ok(store) => store,
            Err(e @ QaError::Config(_)) => return Err(e.into()),
            Err(e) => {
                println!("{}", formatter.format_error(&e));
                return Ok(());
            }
        };

        if matches.get_flag("check") {
            let timeout = Duration::from_millis(config.limits.store_timeout_ms);
            let outcome = match tokio::time::timeout(timeout, store.ping()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout {
                    after_ms: config.limits.store_timeout_ms,
                }),
            };
            match outcome {
                Ok(()) => println!(
                    "{} {} (database {})",
                    out.label("Connected:"),
                    redact_secrets_in_text(&config.store.uri),
                    config.store.database
                ),
                Err(e) => println!("{}", formatter.format_error(&QaError::Store(e))),
            }
            return Ok(());
        }

        match schema_describer(config, store).describe().await {
            Ok(description) => {
                info!("Schema has {} node labels", description.node_labels.len());
                println!("{}", out.label("Schema:"));
                println!(
                    "{}",
                    wrap_text(&description.to_prompt_text(), formatter.wrap_width())
                );
            }
            Err(e) => println!("{}", formatter.format_error(&e)),
        }
        Ok(())
    }
}
