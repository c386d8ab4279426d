// crates/cypherqa-core/src/lib.rs
pub mod config;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod guard;
pub mod neo4j;
pub mod pipeline;
pub mod prompt;
pub mod redaction;
pub mod schema;
pub mod traits;
pub mod translator;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ErrorKind, QaError, QaResult};
pub use pipeline::{AskReport, Outcome, Pipeline};
