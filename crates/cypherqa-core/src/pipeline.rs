//! Question answering over a graph store.
//!
//! [`Pipeline::ask`] runs schema description, prompt composition, translation,
//! execution and formatting in sequence. Every failure is turned into an
//! [`AnswerText`] at this boundary. The only retry is a single re-translation
//! after the store rejects a statement as a syntax error.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{AnswerMode, QaConfig};
use crate::error::{ErrorKind, QaError, QaResult};
use crate::executor::QueryExecutor;
use crate::formatter::{wrap_text, AnswerFormatter};
use crate::prompt::PromptComposer;
use crate::schema::{SchemaDescriber, SchemaDescription};
use crate::traits::{Engine, GraphStore};
use crate::translator::{QueryTranslator, ANSWER_FLOW};
use crate::types::{
    validate_question, AnswerText, ExecutionResult, FailureKind, PromptExample,
    TranslationRequest, TranslationResult,
};

/// First translation plus the one permitted retry.
pub const MAX_TRANSLATION_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Rows { count: usize },
    Failed { kind: ErrorKind },
}

impl From<&ExecutionResult> for Outcome {
    fn from(result: &ExecutionResult) -> Self {
        match result {
            ExecutionResult::Rows(rows) => Outcome::Rows { count: rows.len() },
            ExecutionResult::Failure(failure) => Outcome::Failed {
                kind: failure.kind.into(),
            },
        }
    }
}

/// The answer together with how it was reached.
#[derive(Debug, Clone, Serialize)]
pub struct AskReport {
    pub answer: AnswerText,
    /// Last statement sent to the store, if any
    pub statement: Option<String>,
    /// Translation attempts made
    pub attempts: u32,
    pub outcome: Outcome,
}

impl AskReport {
    fn failed(answer: AnswerText, kind: ErrorKind, attempts: u32) -> Self {
        AskReport {
            answer,
            statement: None,
            attempts,
            outcome: Outcome::Failed { kind },
        }
    }
}

pub struct Pipeline {
    describer: SchemaDescriber,
    composer: PromptComposer,
    translator: QueryTranslator,
    executor: QueryExecutor,
    formatter: AnswerFormatter,
    examples: Arc<[PromptExample]>,
    answer_mode: AnswerMode,
    schema: Option<Arc<SchemaDescription>>,
}

impl Pipeline {
    pub fn new(config: &QaConfig, engine: Arc<dyn Engine>, store: Arc<dyn GraphStore>) -> Self {
        let store_timeout = Duration::from_millis(config.limits.store_timeout_ms);
        let backend_timeout = Duration::from_millis(config.limits.backend_timeout_ms);

        let describer = SchemaDescriber::new(store.clone(), store_timeout)
            .with_relationship_sample(config.schema.relationship_sample)
            .with_type_filter(
                config.schema.include_types.clone(),
                config.schema.exclude_types.clone(),
            );
        let composer = match &config.prompt.instructions {
            Some(instructions) => PromptComposer::with_instructions(instructions.clone()),
            None => PromptComposer::new(),
        };

        Pipeline {
            describer,
            composer,
            translator: QueryTranslator::new(engine, backend_timeout),
            executor: QueryExecutor::new(store, store_timeout, config.limits.row_cap),
            formatter: AnswerFormatter::new(config.answer.wrap_width),
            examples: config.prompt.examples().into(),
            answer_mode: config.answer.mode,
            schema: None,
        }
    }

    /// Cached snapshot, if one has been loaded.
    pub fn schema(&self) -> Option<&SchemaDescription> {
        self.schema.as_deref()
    }

    pub fn formatter(&self) -> &AnswerFormatter {
        &self.formatter
    }

    /// Load a fresh snapshot and swap it in. On failure the previous snapshot
    /// is kept.
    pub async fn refresh_schema(&mut self) -> QaResult<Arc<SchemaDescription>> {
        let fresh = Arc::new(self.describer.describe().await?);
        self.schema = Some(fresh.clone());
        Ok(fresh)
    }

    async fn ensure_schema(&mut self) -> QaResult<Arc<SchemaDescription>> {
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }
        self.refresh_schema().await
    }

    /// Translate without executing.
    pub async fn translate_question(&mut self, question: &str) -> QaResult<TranslationResult> {
        let question = validate_question(question)?;
        let schema = self.ensure_schema().await?;
        let request = TranslationRequest::new(&question, schema, self.examples.clone())?;
        let prompt = self.composer.compose_request(&request);
        Ok(self.translator.translate(&prompt).await)
    }

    pub async fn ask(&mut self, question: &str) -> AnswerText {
        self.ask_detailed(question).await.answer
    }

    pub async fn ask_detailed(&mut self, question: &str) -> AskReport {
        // Input is checked before any I/O.
        let question = match validate_question(question) {
            Ok(q) => q,
            Err(e) => {
                let error = QaError::from(e);
                return AskReport::failed(self.formatter.format_error(&error), error.kind(), 0);
            }
        };

        let schema = match self.ensure_schema().await {
            Ok(schema) => schema,
            Err(e) => {
                warn!("Schema unavailable: {}", e);
                return AskReport::failed(self.formatter.format_error(&e), e.kind(), 0);
            }
        };

        let request = match TranslationRequest::new(&question, schema, self.examples.clone()) {
            Ok(request) => request,
            Err(e) => return AskReport::failed(self.formatter.format_error(&e), e.kind(), 0),
        };

        let mut prompt = self.composer.compose_request(&request);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let statement = match self.translator.translate(&prompt).await {
                TranslationResult::Query(statement) => statement,
                TranslationResult::Rejected(rejection) => {
                    info!("Translation rejected on attempt {}: {}", attempts, rejection);
                    return AskReport::failed(
                        self.formatter.format_rejection(&rejection),
                        rejection.kind(),
                        attempts,
                    );
                }
            };
            debug!("Attempt {} generated: {}", attempts, statement);

            let result = self.executor.execute(&statement).await;
            if let ExecutionResult::Failure(failure) = &result {
                if failure.kind == FailureKind::Syntax && attempts < MAX_TRANSLATION_ATTEMPTS {
                    info!("Store rejected the statement, translating once more");
                    prompt = self.composer.compose_with_correction(
                        &request,
                        statement.as_str(),
                        &failure.message,
                    );
                    continue;
                }
            }

            let answer = self.render_answer(request.question(), &result).await;
            return AskReport {
                answer,
                statement: Some(statement.into_string()),
                attempts,
                outcome: Outcome::from(&result),
            };
        }
    }

    async fn render_answer(&self, question: &str, result: &ExecutionResult) -> AnswerText {
        let rendered = self.formatter.format(result);
        let rows_present = matches!(result, ExecutionResult::Rows(rows) if !rows.is_empty());
        if self.answer_mode != AnswerMode::Summary || !rows_present {
            return rendered;
        }

        let prompt = self.composer.compose_answer(question, rendered.as_str());
        match self.translator.complete(ANSWER_FLOW, &prompt).await {
            Ok(text) => AnswerText::from(wrap_text(text.trim(), self.formatter.wrap_width())),
            Err(e) => {
                warn!("Answer synthesis failed, using row rendering: {}", e);
                rendered
            }
        }
    }
}
