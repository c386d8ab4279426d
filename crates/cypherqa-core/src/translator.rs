use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{BackendError, QaError};
use crate::guard::{ReadOnlyStatement, StatementError, CLAUSE_WORDS, MUTATING_KEYWORDS};
use crate::traits::Engine;
use crate::types::{Rejection, Request, TranslationResult};

pub const GENERATION_FLOW: &str = "cypher_generation";
pub const ANSWER_FLOW: &str = "cypher_answer";

static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:[A-Za-z0-9_+-]*[ \t]*\r?\n)?([\s\S]*?)```").expect("valid regex")
});

static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:cypher(?:\s+query)?|query|statement)\s*:\s*").expect("valid regex")
});

static PROSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Z][a-z']+(?:\s+[A-Za-z'][a-z',]*){2,}|[A-Z][a-z]+:)").expect("valid regex")
});

static INLINE_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:OPTIONAL MATCH|MATCH|UNWIND|CALL|CREATE|MERGE|DELETE|DETACH|REMOVE|DROP)\b")
        .expect("valid regex")
});

fn first_word(line: &str) -> String {
    line.trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase()
}

fn opens_clause(line: &str) -> bool {
    let word = first_word(line);
    !word.is_empty() && (CLAUSE_WORDS.contains(&word.as_str()) || matches!(word.as_str(), "AND" | "OR" | "NOT"))
}

fn has_cypher_punctuation(line: &str) -> bool {
    line.contains(|c: char| matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '$' | '='))
}

/// A line opens the statement when it starts with a statement keyword and is
/// not a sentence introducing one: it does not end in `:`, and a keyword not
/// written in capitals must be followed by Cypher punctuation.
fn starts_statement(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.ends_with(':') {
        return false;
    }
    let raw: String = trimmed.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let word = raw.to_uppercase();
    let keyword = matches!(
        word.as_str(),
        "MATCH" | "OPTIONAL" | "WITH" | "UNWIND" | "CALL" | "RETURN" | "USE" | "EXPLAIN" | "PROFILE" | "SHOW"
    ) || MUTATING_KEYWORDS.contains(&word.as_str());
    keyword && (raw == word || has_cypher_punctuation(trimmed))
}

/// Commentary after an unfenced statement: a sentence, or a line closing with
/// sentence punctuation.
fn is_commentary(line: &str) -> bool {
    !opens_clause(line)
        && (PROSE_RE.is_match(line) || line.ends_with(|c: char| matches!(c, '.' | '!' | '?')))
}

/// Pull the statement out of a raw completion: code fences, labels such as
/// `Cypher:`, and surrounding commentary are dropped. Returns `None` when no
/// statement-like text remains.
pub fn extract_statement(raw: &str) -> Option<String> {
    let (body, fenced) = match FENCE_RE.captures(raw) {
        Some(caps) => (caps.get(1).map(|m| m.as_str()).unwrap_or_default(), true),
        None => (raw, false),
    };

    let lines: Vec<String> = body
        .lines()
        .map(|line| LABEL_RE.replace(line, "").into_owned())
        .collect();

    let mut collected: Vec<&str> = Vec::new();
    if let Some(start) = lines.iter().position(|line| starts_statement(line)) {
        for line in &lines[start..] {
            let trimmed = line.trim();
            if !fenced {
                if trimmed.is_empty() {
                    break;
                }
                if is_commentary(trimmed) {
                    break;
                }
            }
            collected.push(line.trim_end());
        }
    } else if let Some(found) = INLINE_START_RE.find(body) {
        let rest = &body[found.start()..];
        let paragraph = rest.split("\n\n").next().unwrap_or(rest);
        collected.extend(paragraph.lines().map(str::trim_end));
    }

    let statement = collected.join("\n");
    let statement = statement.trim().trim_end_matches(';').trim_end();
    if statement.is_empty() {
        None
    } else {
        Some(statement.to_string())
    }
}

/// Classify raw model output into exactly one [`TranslationResult`].
pub fn classify_output(raw: &str) -> TranslationResult {
    let Some(statement) = extract_statement(raw) else {
        return TranslationResult::Rejected(Rejection::UnparsableOutput(
            "no Cypher statement found in model output".to_string(),
        ));
    };
    match ReadOnlyStatement::parse(&statement) {
        Ok(statement) => TranslationResult::Query(statement),
        Err(StatementError::Unsafe(violation)) => {
            warn!("Refusing generated statement: {}", violation);
            TranslationResult::Rejected(Rejection::UnsafeQuery(violation))
        }
        Err(StatementError::Malformed(reason)) => {
            TranslationResult::Rejected(Rejection::UnparsableOutput(reason.to_string()))
        }
    }
}

/// Sends prompts to the text-generation backend and classifies the reply.
pub struct QueryTranslator {
    engine: Arc<dyn Engine>,
    timeout: Duration,
}

impl QueryTranslator {
    pub fn new(engine: Arc<dyn Engine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// Backend failures become `Rejected(Backend)`. There is no retry here.
    pub async fn translate(&self, prompt: &str) -> TranslationResult {
        match self.complete(GENERATION_FLOW, prompt).await {
            Ok(text) => {
                debug!("Raw generation output: {}", text);
                classify_output(&text)
            }
            Err(e) => {
                warn!("Generation backend failed: {}", e);
                TranslationResult::Rejected(Rejection::Backend(e))
            }
        }
    }

    /// One bounded completion call. Dropping the future cancels the request.
    pub async fn complete(&self, flow: &str, prompt: &str) -> Result<String, BackendError> {
        let request = Request {
            flowname: flow.to_string(),
            payload: prompt.to_string(),
        };
        let call = Pin::from(self.engine.execute(&request));

        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(BackendError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }),
            Ok(Err(QaError::Backend(e))) => Err(e),
            Ok(Err(other)) => Err(BackendError::InvalidRequest(other.to_string())),
            Ok(Ok(response)) => {
                debug!(
                    "{} completion from {}: {} tokens",
                    flow, response.model, response.usage.total_tokens
                );
                if response.content.trim().is_empty() {
                    Err(BackendError::MalformedResponse(
                        "empty completion".to_string(),
                    ))
                } else {
                    Ok(response.content)
                }
            }
        }
    }
}
