//! Rendering of results, rejections and errors as user-facing text

use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{BackendError, ErrorKind, QaError, StoreError, ValidationError};
use crate::guard::GuardViolation;
use crate::types::{AnswerText, ExecutionFailure, ExecutionResult, FailureKind, Record, Rejection};

pub const NO_RESULTS: &str = "No results found.";
pub const DEFAULT_WRAP_WIDTH: usize = 60;

#[derive(Debug, Clone)]
pub struct AnswerFormatter {
    wrap_width: usize,
}

impl Default for AnswerFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_WRAP_WIDTH)
    }
}

impl AnswerFormatter {
    pub fn new(wrap_width: usize) -> Self {
        Self {
            wrap_width: wrap_width.max(1),
        }
    }

    pub fn wrap_width(&self) -> usize {
        self.wrap_width
    }

    /// Deterministic; never returns an empty answer.
    pub fn format(&self, result: &ExecutionResult) -> AnswerText {
        match result {
            ExecutionResult::Rows(rows) => self.format_rows(rows),
            ExecutionResult::Failure(failure) => self.format_failure(failure),
        }
    }

    pub fn format_rows(&self, rows: &[Record]) -> AnswerText {
        if rows.is_empty() {
            return AnswerText::from(NO_RESULTS.to_string());
        }
        AnswerText::from(self.render_rows(rows))
    }

    fn render_rows(&self, rows: &[Record]) -> String {
        let mut lines = vec![if rows.len() == 1 {
            "1 result:".to_string()
        } else {
            format!("{} results:", rows.len())
        }];
        for (index, row) in rows.iter().enumerate() {
            let prefix = format!("{}. ", index + 1);
            let body = row
                .iter()
                .map(|(column, value)| format!("{}: {}", column, render_value(value)))
                .collect::<Vec<_>>()
                .join(", ");
            let indent = " ".repeat(prefix.len());
            lines.extend(wrap_with_indent(
                &format!("{}{}", prefix, body),
                self.wrap_width,
                &indent,
            ));
        }
        lines.join("\n")
    }

    fn format_failure(&self, failure: &ExecutionFailure) -> AnswerText {
        let text = match failure.kind {
            FailureKind::ResourceExceeded if !failure.partial.is_empty() => {
                let shown = failure.partial.len();
                let label = wrap_text(
                    &format!(
                        "Result truncated: the query matched more than {} rows; showing the first {}.",
                        shown, shown
                    ),
                    self.wrap_width,
                );
                format!("{}\n{}", label, self.render_rows(&failure.partial))
            }
            FailureKind::ResourceExceeded => wrap_text(
                "The query needed more resources than the database allows. Try a narrower question.",
                self.wrap_width,
            ),
            FailureKind::Syntax => wrap_text(
                "The database rejected the generated query as invalid. Try rephrasing the question.",
                self.wrap_width,
            ),
            FailureKind::Timeout => wrap_text(
                "The query did not finish in time. Try a more specific question.",
                self.wrap_width,
            ),
            FailureKind::Connectivity => wrap_text(
                "The graph database could not be reached. Please try again later.",
                self.wrap_width,
            ),
            FailureKind::Failed => wrap_text(
                "The graph database could not answer the query. Please try again later.",
                self.wrap_width,
            ),
        };
        AnswerText::from(text)
    }

    pub fn format_rejection(&self, rejection: &Rejection) -> AnswerText {
        let text = match rejection {
            Rejection::Backend(error) => backend_message(error).to_string(),
            Rejection::UnparsableOutput(_) => {
                "No query could be derived from the question. Try rephrasing it.".to_string()
            }
            Rejection::UnsafeQuery(GuardViolation::Mutation { keyword }) => format!(
                "The generated query was refused because it would modify the database ({}).",
                keyword
            ),
            Rejection::UnsafeQuery(GuardViolation::WriteProcedure { procedure }) => format!(
                "The generated query was refused because it calls the write procedure {}.",
                procedure
            ),
        };
        AnswerText::from(wrap_text(&text, self.wrap_width))
    }

    pub fn format_error(&self, error: &QaError) -> AnswerText {
        let text = match error {
            QaError::Validation(ValidationError::EmptyQuestion) => {
                "Please enter a question.".to_string()
            }
            QaError::Validation(ValidationError::TooLong { max_length, .. }) => format!(
                "The question is too long. Please keep it under {} characters.",
                max_length
            ),
            QaError::Backend(e) => backend_message(e).to_string(),
            QaError::Store(StoreError::Failed(_)) => {
                "The graph database could not answer the query. Please try again later.".to_string()
            }
            other => match other.kind() {
                ErrorKind::Connectivity => {
                    "The graph database could not be reached. Please try again later.".to_string()
                }
                ErrorKind::Timeout => "The graph database did not respond in time.".to_string(),
                ErrorKind::Syntax => {
                    "The database rejected a schema query. Please check the server version.".to_string()
                }
                ErrorKind::ResourceExceeded => {
                    "The database ran out of resources while answering.".to_string()
                }
                ErrorKind::Config => "The service is not configured correctly.".to_string(),
                _ => "Something went wrong while answering the question.".to_string(),
            },
        };
        AnswerText::from(wrap_text(&text, self.wrap_width))
    }
}

fn backend_message(error: &BackendError) -> &'static str {
    match error {
        BackendError::Timeout { .. } => "The language model did not respond in time. Please try again.",
        BackendError::RateLimited { .. } => {
            "The language model is rate limited right now. Please try again shortly."
        }
        BackendError::Unauthorized(_) => "The language model rejected the configured credentials.",
        BackendError::Unreachable(_) => "The language model could not be reached.",
        _ => "The language model request failed. Please try again later.",
    }
}

/// Scalars print bare; strings have their whitespace collapsed; maps print
/// with sorted keys.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.split_whitespace().collect::<Vec<_>>().join(" "),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(render_value).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}: {}", k, render_value(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
    }
}

/// Greedy word wrap, measuring width in grapheme clusters. Each input line
/// is wrapped on its own.
pub fn wrap_text(text: &str, width: usize) -> String {
    text.lines()
        .flat_map(|line| wrap_with_indent(line, width, ""))
        .collect::<Vec<_>>()
        .join("\n")
}

fn grapheme_len(s: &str) -> usize {
    s.graphemes(true).count()
}

fn wrap_with_indent(line: &str, width: usize, indent: &str) -> Vec<String> {
    let width = width.max(1);
    let indent = if grapheme_len(indent) >= width { "" } else { indent };

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in line.split_whitespace() {
        let word_len = grapheme_len(word);
        let prefix_len = if lines.is_empty() { 0 } else { grapheme_len(indent) };

        if current_len > 0 && current_len + 1 + word_len <= width - prefix_len {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
            continue;
        }

        if current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }

        let prefix_len = if lines.is_empty() { 0 } else { grapheme_len(indent) };
        let available = width - prefix_len;
        if word_len <= available {
            current.push_str(word);
            current_len = word_len;
            continue;
        }

        // Break words longer than a whole line.
        let graphemes: Vec<&str> = word.graphemes(true).collect();
        let mut start = 0;
        while start < graphemes.len() {
            let available = width - if lines.is_empty() { 0 } else { grapheme_len(indent) };
            let end = (start + available).min(graphemes.len());
            let chunk = graphemes[start..end].concat();
            if end == graphemes.len() {
                current_len = end - start;
                current = chunk;
            } else {
                lines.push(chunk);
            }
            start = end;
        }
    }

    if current_len > 0 || lines.is_empty() {
        lines.push(current);
    }

    lines
        .into_iter()
        .enumerate()
        .map(|(i, l)| if i == 0 { l } else { format!("{}{}", indent, l) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn count_rendered(text: &str) -> usize {
        text.lines()
            .filter(|line| {
                let digits: String = line.chars().take_while(|c| c.is_ascii_digit()).collect();
                !digits.is_empty() && line[digits.len()..].starts_with(". ")
            })
            .count()
    }

    #[test]
    fn empty_rows_say_so() {
        let answer = AnswerFormatter::default().format(&ExecutionResult::Rows(vec![]));
        assert_eq!(answer.as_str(), NO_RESULTS);
    }

    #[test]
    fn single_count_row() {
        let answer = AnswerFormatter::default().format(&ExecutionResult::Rows(rows(vec![
            json!({"NumberOfNotifications": 12}),
        ])));
        assert_eq!(answer.as_str(), "1 result:\n1. NumberOfNotifications: 12");
    }

    #[test]
    fn rendered_rows_can_be_counted_back() {
        let records = rows(
            (0..7)
                .map(|i| json!({"DashboardName": format!("ITSM Dashboard number {} with a long descriptive name", i), "order": i}))
                .collect(),
        );
        let answer = AnswerFormatter::new(30).format(&ExecutionResult::Rows(records));
        assert!(answer.as_str().starts_with("7 results:"));
        assert_eq!(count_rendered(answer.as_str()), 7);
        assert!(answer
            .as_str()
            .lines()
            .all(|line| line.graphemes(true).count() <= 30));
    }

    #[test]
    fn truncation_is_labelled() {
        let failure = ExecutionFailure {
            kind: FailureKind::ResourceExceeded,
            message: "more than 2 rows".to_string(),
            partial: rows(vec![json!({"n": 1}), json!({"n": 2})]),
        };
        let answer = AnswerFormatter::default().format(&ExecutionResult::Failure(failure));
        assert!(answer.as_str().starts_with("Result truncated:"));
        assert_eq!(count_rendered(answer.as_str()), 2);
    }

    #[test]
    fn failures_do_not_leak_store_messages() {
        let failure = ExecutionFailure::new(
            FailureKind::Syntax,
            "Neo.ClientError.Statement.SyntaxError: Invalid input 'RETRUN' (line 1, column 12)",
        );
        let answer = AnswerFormatter::default().format(&ExecutionResult::Failure(failure));
        assert!(!answer.as_str().contains("Neo.ClientError"));
        assert!(!answer.as_str().is_empty());
    }

    #[test]
    fn store_failure_is_not_reported_as_unreachable() {
        let formatter = AnswerFormatter::default();
        let failure = ExecutionFailure::new(FailureKind::Failed, "Failed to convert row to JSON");
        let answer = formatter.format(&ExecutionResult::Failure(failure));
        assert!(answer.as_str().contains("could not answer the query"));
        assert!(!answer.as_str().contains("could not be reached"));

        let answer = formatter.format_error(&QaError::Store(StoreError::Failed("boom".into())));
        assert!(answer.as_str().contains("could not answer the query"));
    }

    #[test]
    fn rejection_names_the_keyword() {
        let answer = AnswerFormatter::default().format_rejection(&Rejection::UnsafeQuery(
            GuardViolation::Mutation {
                keyword: "DELETE".to_string(),
            },
        ));
        assert!(answer.as_str().contains("DELETE"));
    }

    #[test]
    fn values_render_stably() {
        assert_eq!(
            render_value(&json!({"b": 1, "a": ["x", null, true]})),
            "{a: [x, null, true], b: 1}"
        );
        assert_eq!(render_value(&json!("two\n  lines")), "two lines");
    }

    #[test]
    fn wraps_long_words() {
        let wrapped = wrap_text("abcdefghij", 4);
        assert_eq!(wrapped, "abcd\nefgh\nij");
        assert_eq!(wrap_text("one two three", 7), "one two\nthree");
    }
}
