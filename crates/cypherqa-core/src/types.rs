// crates/cypherqa-core/src/types.rs
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BackendError, ErrorKind, QaResult, ValidationError};
use crate::guard::{GuardViolation, ReadOnlyStatement};
use crate::schema::SchemaDescription;

/// Upper bound on question length accepted by the pipeline
pub const MAX_QUESTION_LENGTH: usize = 4_000;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Request {
    pub flowname: String,
    pub payload: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Response {
    pub content: String,
    pub usage: Usage,
    pub model: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One result row: column name to value, in the order the statement returned them.
pub type Record = Map<String, Value>;

/// Named parameters passed alongside a statement.
pub type QueryParams = Map<String, Value>;

/// A few-shot pair steering the model's output format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptExample {
    pub question: String,
    pub query: String,
}

impl PromptExample {
    pub fn new(question: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            query: query.into(),
        }
    }
}

/// Everything the composer needs for one translation, fixed at construction.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    question: String,
    schema: Arc<SchemaDescription>,
    examples: Arc<[PromptExample]>,
}

impl TranslationRequest {
    pub fn new(
        question: &str,
        schema: Arc<SchemaDescription>,
        examples: Arc<[PromptExample]>,
    ) -> QaResult<Self> {
        let question = validate_question(question)?;
        Ok(Self {
            question,
            schema,
            examples,
        })
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    pub fn examples(&self) -> &[PromptExample] {
        &self.examples
    }
}

/// Trim a question and reject empty or oversized input.
pub fn validate_question(question: &str) -> Result<String, ValidationError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyQuestion);
    }
    let length = trimmed.chars().count();
    if length > MAX_QUESTION_LENGTH {
        return Err(ValidationError::TooLong {
            length,
            max_length: MAX_QUESTION_LENGTH,
        });
    }
    Ok(trimmed.to_string())
}

/// Why the translator refused to hand a statement to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Backend(BackendError),
    UnparsableOutput(String),
    UnsafeQuery(GuardViolation),
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Rejection::Backend(_) => ErrorKind::Backend,
            Rejection::UnparsableOutput(_) => ErrorKind::UnparsableOutput,
            Rejection::UnsafeQuery(_) => ErrorKind::UnsafeQuery,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Backend(e) => write!(f, "backend error: {}", e),
            Rejection::UnparsableOutput(reason) => write!(f, "unparsable output: {}", reason),
            Rejection::UnsafeQuery(violation) => write!(f, "unsafe query: {}", violation),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationResult {
    Query(ReadOnlyStatement),
    Rejected(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Syntax,
    Timeout,
    Connectivity,
    ResourceExceeded,
    /// The store answered with an error outside the other kinds.
    Failed,
}

impl From<FailureKind> for ErrorKind {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Syntax => ErrorKind::Syntax,
            FailureKind::Timeout => ErrorKind::Timeout,
            FailureKind::Connectivity => ErrorKind::Connectivity,
            FailureKind::ResourceExceeded => ErrorKind::ResourceExceeded,
            FailureKind::Failed => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    /// Store-side detail; kept for logs and correction prompts, never shown to users.
    pub message: String,
    /// Rows received before a row cap was hit.
    pub partial: Vec<Record>,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            partial: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Rows(Vec<Record>),
    Failure(ExecutionFailure),
}

/// User-facing answer; never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerText(String);

impl AnswerText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for AnswerText {
    fn from(text: String) -> Self {
        AnswerText(text)
    }
}

impl fmt::Display for AnswerText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
