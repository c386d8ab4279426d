//! Prompt assembly for statement generation and answer synthesis.
//!
//! A prompt is a sequence of sections, each opened by a `### NAME` line.
//! Content lines that would read as a section header are escaped with a
//! leading backslash, so the delimiters never occur inside schema text,
//! examples or the question.

use crate::error::QaResult;
use crate::schema::SchemaDescription;
use crate::types::{validate_question, PromptExample, TranslationRequest};

pub const SECTION_MARKER: &str = "###";

pub const DEFAULT_INSTRUCTIONS: &str = "\
Task: translate the question into a Cypher statement for a Neo4j graph database.
Use only the node labels, relationship types and properties listed in the schema.
The statement must only read data. Never create, merge, set, delete, remove or drop anything.
Respond with exactly one query statement, no prose. Do not add explanations or apologies.";

pub const CORRECTION_INSTRUCTIONS: &str = "\
The previous statement was rejected by the database. Write a corrected statement \
that answers the same question.";

pub const ANSWER_INSTRUCTIONS: &str = "\
You turn database results into a short answer that a person can read.
The information section is authoritative. Do not correct it from your own knowledge.
Answer the question directly and do not mention that the answer comes from a database.
If the information is empty, say that you do not know the answer.";

/// Built-in few-shot examples for an ITSM knowledge graph.
pub fn default_examples() -> Vec<PromptExample> {
    vec![
        PromptExample::new(
            "How many transform maps are there in itsm framework?",
            "MATCH (tm:TransformMap)\nRETURN COUNT(tm) AS NumberOfTransformMaps",
        ),
        PromptExample::new(
            "how many notifications are there?",
            "MATCH (n:NotificationEmailScript)\nRETURN COUNT(n) AS NumberOfNotifications",
        ),
        PromptExample::new(
            "how many dashboards are there in itsm framework?",
            "MATCH (d:Dashboard)\nRETURN COUNT(d) AS NumberOfDashboards",
        ),
        PromptExample::new(
            "Name the dashboards",
            "MATCH (d:Dashboard)\nRETURN d.name AS DashboardName, COUNT(d) AS NumberOfDashboards",
        ),
        PromptExample::new(
            "Name the available notifications",
            "MATCH (n:NotificationEmailScript)\nRETURN n.name AS NotificationName",
        ),
        PromptExample::new(
            "What aspects of the ITSM Ace framework help in improving efficiency, effectiveness, and visibility?",
            "MATCH (d:Dashboard)\n\
             WHERE d.name IN [\"ITSM Agent Dashboard\", \"ITSM Group Manager Dashboard\", \"ITSM Director Dashboard\", \"ITSM CXO Dashboard\"]\n\
             RETURN d",
        ),
    ]
}

/// Builds generation and answer prompts. Pure; holds only the instruction text.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    instructions: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }
}

impl PromptComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instructions(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Fails with an invalid-input error for a blank question.
    pub fn compose(
        &self,
        question: &str,
        schema: &SchemaDescription,
        examples: &[PromptExample],
    ) -> QaResult<String> {
        let question = validate_question(question)?;
        Ok(self.render(&question, schema, examples, None))
    }

    pub fn compose_request(&self, request: &TranslationRequest) -> String {
        self.render(request.question(), request.schema(), request.examples(), None)
    }

    /// Generation prompt for the retry after the store rejected `failed_statement`.
    pub fn compose_with_correction(
        &self,
        request: &TranslationRequest,
        failed_statement: &str,
        store_message: &str,
    ) -> String {
        self.render(
            request.question(),
            request.schema(),
            request.examples(),
            Some((failed_statement, store_message)),
        )
    }

    /// Prompt asking the backend to phrase `information` as an answer.
    pub fn compose_answer(&self, question: &str, information: &str) -> String {
        let mut out = String::new();
        push_section(&mut out, "INSTRUCTIONS", ANSWER_INSTRUCTIONS);
        push_section(&mut out, "INFORMATION", information);
        push_section(&mut out, "QUESTION", question.trim());
        out.trim_end().to_string()
    }

    fn render(
        &self,
        question: &str,
        schema: &SchemaDescription,
        examples: &[PromptExample],
        correction: Option<(&str, &str)>,
    ) -> String {
        let mut out = String::new();
        push_section(&mut out, "INSTRUCTIONS", &self.instructions);
        push_section(&mut out, "SCHEMA", &schema.to_prompt_text());
        push_section(&mut out, "EXAMPLES", &render_examples(examples));
        if let Some((statement, message)) = correction {
            push_section(&mut out, "PREVIOUS ATTEMPT", statement);
            push_section(
                &mut out,
                "STORE ERROR",
                &format!("{}\n{}", message.trim(), CORRECTION_INSTRUCTIONS),
            );
        }
        push_section(&mut out, "QUESTION", question);
        out.trim_end().to_string()
    }
}

fn render_examples(examples: &[PromptExample]) -> String {
    if examples.is_empty() {
        return "(none)".to_string();
    }
    examples
        .iter()
        .map(|example| {
            let question = example.question.split_whitespace().collect::<Vec<_>>().join(" ");
            format!("# {}\n{}", question, example.query.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn push_section(out: &mut String, name: &str, body: &str) {
    out.push_str(SECTION_MARKER);
    out.push(' ');
    out.push_str(name);
    out.push('\n');
    out.push_str(&escape_body(body));
    out.push_str("\n\n");
}

fn escape_body(body: &str) -> String {
    body.trim_end()
        .lines()
        .map(|line| {
            if line.trim_start().starts_with(SECTION_MARKER) {
                format!("\\{}", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
