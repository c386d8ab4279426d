use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid override '{0}', expected KEY=VALUE")]
    InvalidOverride(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}
