// crates/cypherqa-engines/src/lib.rs
use cypherqa_core::config::EngineConfig;
use cypherqa_core::error::{ConfigError, QaResult};
use cypherqa_core::traits::Engine;
use log::debug;

pub mod anthropic;
mod http;
pub mod openai;

pub use anthropic::AnthropicEngine;
pub use openai::OpenAIEngine;

/// Build the backend named by `config.engine`.
pub fn create_engine(config: &EngineConfig) -> QaResult<Box<dyn Engine>> {
    debug!("Creating engine '{}' ({})", config.name, config.engine);
    match config.engine.to_lowercase().as_str() {
        "openai" => Ok(Box::new(OpenAIEngine::new(config.clone())?)),
        "anthropic" => Ok(Box::new(AnthropicEngine::new(config.clone())?)),
        other => Err(ConfigError::UnsupportedEngine(other.to_string()).into()),
    }
}
