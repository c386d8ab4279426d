//! Read-only guard for generated Cypher
//!
//! A [`ReadOnlyStatement`] can only be built from text that is a single,
//! lexically well-formed Cypher statement with no data-mutating clause and no
//! call to a write procedure. The executor accepts nothing else.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Whole-word clause keywords that modify the graph or its schema.
pub const MUTATING_KEYWORDS: &[&str] = &[
    "CREATE", "DELETE", "DETACH", "MERGE", "SET", "REMOVE", "DROP", "FOREACH",
];

/// Keywords a read statement may start with.
const READ_CLAUSE_STARTS: &[&str] = &[
    "MATCH", "OPTIONAL", "WITH", "UNWIND", "CALL", "RETURN", "USE", "EXPLAIN", "PROFILE", "SHOW",
];

/// Words that can open a Cypher clause. Write clauses are included so that a
/// mutating line is attributed to the guard, not to the structure check.
pub const CLAUSE_WORDS: &[&str] = &[
    "MATCH", "OPTIONAL", "WITH", "UNWIND", "CALL", "RETURN", "USE", "EXPLAIN", "PROFILE", "SHOW",
    "WHERE", "ORDER", "SKIP", "LIMIT", "UNION", "YIELD", "CREATE", "DELETE", "DETACH", "MERGE",
    "SET", "REMOVE", "DROP", "FOREACH",
];

/// Words that continue an expression or clause begun on an earlier line.
const CONTINUATION_WORDS: &[&str] = &[
    "AND", "OR", "XOR", "NOT", "AS", "IN", "IS", "CASE", "WHEN", "THEN", "ELSE", "END", "BY",
    "ASC", "ASCENDING", "DESC", "DESCENDING", "DISTINCT", "STARTS", "ENDS", "CONTAINS", "ALL",
];

/// Procedure namespaces that run Cypher passed in as a string.
const STRING_CYPHER_NAMESPACES: &[&str] = &["apoc.cypher.", "apoc.do."];

/// Procedure name segments that indicate a write.
const WRITE_PROCEDURE_SEGMENTS: &[&str] = &[
    "create", "delete", "merge", "remove", "drop", "set", "write", "import", "refactor",
    "periodic",
];

static MUTATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(create|delete|detach|merge|set|remove|drop|foreach)\b")
        .expect("valid regex")
});

static CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bCALL\s+([A-Za-z_][A-Za-z0-9_]*(?:\s*\.\s*[A-Za-z_][A-Za-z0-9_]*)*)")
        .expect("valid regex")
});

static RETURN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bRETURN\b").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardViolation {
    /// A data-mutating keyword appears in the statement
    Mutation { keyword: String },

    /// A procedure call that can write or administer the store
    WriteProcedure { procedure: String },
}

impl fmt::Display for GuardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardViolation::Mutation { keyword } => {
                write!(f, "statement contains mutating keyword {}", keyword)
            }
            GuardViolation::WriteProcedure { procedure } => {
                write!(f, "statement calls write procedure {}", procedure)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    Empty,
    UnterminatedString,
    UnterminatedComment,
    UnbalancedBrackets,
    MultipleStatements,
    NoLeadingClause(String),
    /// A line that belongs to no clause, such as trailing commentary
    StrayText(String),
    MissingReturn,
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureError::Empty => write!(f, "empty statement"),
            StructureError::UnterminatedString => write!(f, "unterminated string literal"),
            StructureError::UnterminatedComment => write!(f, "unterminated block comment"),
            StructureError::UnbalancedBrackets => write!(f, "unbalanced brackets"),
            StructureError::MultipleStatements => write!(f, "more than one statement"),
            StructureError::NoLeadingClause(word) => {
                write!(f, "statement does not start with a read clause (found '{}')", word)
            }
            StructureError::StrayText(text) => write!(f, "text outside any clause: '{}'", text),
            StructureError::MissingReturn => write!(f, "statement has no RETURN clause"),
        }
    }
}

/// Error returned by [`ReadOnlyStatement::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementError {
    Malformed(StructureError),
    Unsafe(GuardViolation),
}

/// A statement that passed the read-only guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadOnlyStatement(String);

impl ReadOnlyStatement {
    /// Strip comments, then check safety before structure so that a mutating
    /// statement is always reported as unsafe.
    pub fn parse(text: &str) -> Result<Self, StatementError> {
        let cleaned = strip_comments(text).map_err(StatementError::Malformed)?;
        let cleaned = cleaned.trim().trim_end_matches(';').trim_end().to_string();
        if cleaned.is_empty() {
            return Err(StatementError::Malformed(StructureError::Empty));
        }
        check_read_only(&cleaned).map_err(StatementError::Unsafe)?;
        check_structure(&cleaned).map_err(StatementError::Malformed)?;
        Ok(ReadOnlyStatement(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ReadOnlyStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reject mutating keywords outside literals, write or admin procedure calls,
/// and procedures that execute Cypher held in a string.
pub fn check_read_only(statement: &str) -> Result<(), GuardViolation> {
    let code = mask_literals(statement);

    if let Some(found) = MUTATION_RE.find(&code) {
        return Err(GuardViolation::Mutation {
            keyword: found.as_str().to_uppercase(),
        });
    }

    for caps in CALL_RE.captures_iter(&code) {
        let procedure: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
        let lower = procedure.to_lowercase();
        let writes = lower.starts_with("dbms.")
            || STRING_CYPHER_NAMESPACES
                .iter()
                .any(|namespace| lower.starts_with(namespace))
            || lower.split('.').any(|segment| {
                WRITE_PROCEDURE_SEGMENTS
                    .iter()
                    .any(|verb| segment.starts_with(verb))
            });
        if writes {
            return Err(GuardViolation::WriteProcedure { procedure });
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum LexState {
    Code,
    Single,
    Double,
    Backtick,
    LineComment,
    BlockComment,
}

/// Blank out the contents of string literals and escaped identifiers, keeping
/// the delimiters and every byte offset.
fn mask_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = LexState::Code;
    let mut chars = text.chars();

    let blank = |out: &mut String, c: char| {
        if c == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat(' ').take(c.len_utf8()));
        }
    };

    while let Some(c) = chars.next() {
        match state {
            LexState::Code => {
                out.push(c);
                match c {
                    '\'' => state = LexState::Single,
                    '"' => state = LexState::Double,
                    '`' => state = LexState::Backtick,
                    _ => {}
                }
            }
            LexState::Single | LexState::Double => {
                if c == '\\' {
                    blank(&mut out, c);
                    if let Some(escaped) = chars.next() {
                        blank(&mut out, escaped);
                    }
                } else if (c == '\'' && state == LexState::Single)
                    || (c == '"' && state == LexState::Double)
                {
                    out.push(c);
                    state = LexState::Code;
                } else {
                    blank(&mut out, c);
                }
            }
            LexState::Backtick => {
                if c == '`' {
                    out.push(c);
                    state = LexState::Code;
                } else {
                    blank(&mut out, c);
                }
            }
            LexState::LineComment | LexState::BlockComment => out.push(c),
        }
    }
    out
}

/// Remove `//` and `/* */` comments outside literals.
pub fn strip_comments(text: &str) -> Result<String, StructureError> {
    let mut out = String::with_capacity(text.len());
    let mut state = LexState::Code;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            LexState::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = LexState::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push(' ');
                    state = LexState::BlockComment;
                }
                '\'' => {
                    out.push(c);
                    state = LexState::Single;
                }
                '"' => {
                    out.push(c);
                    state = LexState::Double;
                }
                '`' => {
                    out.push(c);
                    state = LexState::Backtick;
                }
                _ => out.push(c),
            },
            LexState::Single | LexState::Double => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if (c == '\'' && state == LexState::Single)
                    || (c == '"' && state == LexState::Double)
                {
                    state = LexState::Code;
                }
            }
            LexState::Backtick => {
                out.push(c);
                if c == '`' {
                    state = LexState::Code;
                }
            }
            LexState::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = LexState::Code;
                }
            }
            LexState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = LexState::Code;
                }
            }
        }
    }

    match state {
        LexState::Single | LexState::Double | LexState::Backtick => {
            Err(StructureError::UnterminatedString)
        }
        LexState::BlockComment => Err(StructureError::UnterminatedComment),
        LexState::Code | LexState::LineComment => Ok(out),
    }
}

/// Check that comment-free text reads as one Cypher statement made of clauses.
pub fn check_structure(statement: &str) -> Result<(), StructureError> {
    let first_word: String = statement
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if first_word.is_empty() {
        return Err(StructureError::NoLeadingClause(
            statement.trim_start().chars().take(12).collect(),
        ));
    }
    let leading = first_word.to_uppercase();
    if !READ_CLAUSE_STARTS.contains(&leading.as_str()) {
        return Err(StructureError::NoLeadingClause(first_word));
    }

    let mut stack = Vec::new();
    let mut line_breaks = Vec::new();
    let mut state = LexState::Code;
    let mut chars = statement.char_indices();
    while let Some((at, c)) = chars.next() {
        match state {
            LexState::Code => match c {
                '\n' if stack.is_empty() => line_breaks.push(at + 1),
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if stack.pop() != Some(expected) {
                        return Err(StructureError::UnbalancedBrackets);
                    }
                }
                ';' => return Err(StructureError::MultipleStatements),
                '\'' => state = LexState::Single,
                '"' => state = LexState::Double,
                '`' => state = LexState::Backtick,
                _ => {}
            },
            LexState::Single | LexState::Double => {
                if c == '\\' {
                    chars.next();
                } else if (c == '\'' && state == LexState::Single)
                    || (c == '"' && state == LexState::Double)
                {
                    state = LexState::Code;
                }
            }
            LexState::Backtick => {
                if c == '`' {
                    state = LexState::Code;
                }
            }
            LexState::LineComment | LexState::BlockComment => {}
        }
    }
    if state != LexState::Code {
        return Err(StructureError::UnterminatedString);
    }
    if !stack.is_empty() {
        return Err(StructureError::UnbalancedBrackets);
    }

    check_lines(statement, &line_breaks)?;

    let standalone = matches!(leading.as_str(), "CALL" | "SHOW");
    if !standalone && !RETURN_RE.is_match(&mask_literals(statement)) {
        return Err(StructureError::MissingReturn);
    }

    Ok(())
}

fn leading_word(line: &str) -> String {
    line.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase()
}

fn trailing_word(line: &str) -> String {
    let word: String = line
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    word.chars().rev().collect::<String>().to_uppercase()
}

fn is_keyword(word: &str) -> bool {
    CLAUSE_WORDS.contains(&word) || CONTINUATION_WORDS.contains(&word)
}

/// A line ending in an operator, an opening bracket, a comma or a keyword
/// expects its operand on the next line.
fn expects_more(line: &str) -> bool {
    match line.chars().last() {
        Some(c) if ",+-*/%^=<>|.([{".contains(c) => true,
        Some(_) => is_keyword(&trailing_word(line)),
        None => false,
    }
}

/// Every top-level line must open a clause, continue the previous line, or
/// start with punctuation. A top-level line ending in `:` is never Cypher.
fn check_lines(statement: &str, line_breaks: &[usize]) -> Result<(), StructureError> {
    let mut bounds = Vec::with_capacity(line_breaks.len() + 2);
    bounds.push(0);
    bounds.extend_from_slice(line_breaks);
    bounds.push(statement.len());

    let mut previous: Option<&str> = None;
    for span in bounds.windows(2) {
        let line = statement[span[0]..span[1]].trim();
        if line.is_empty() {
            continue;
        }
        let stray = || StructureError::StrayText(line.chars().take(40).collect());
        if line.ends_with(':') {
            return Err(stray());
        }

        let word = leading_word(line);
        let accepted = word.is_empty()
            || is_keyword(&word)
            || previous.map(expects_more).unwrap_or(false);
        if !accepted {
            return Err(stray());
        }
        previous = Some(line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_read_queries() {
        let stmt = ReadOnlyStatement::parse(
            "MATCH (n:NotificationEmailScript)\nRETURN COUNT(n) AS NumberOfNotifications;",
        )
        .unwrap();
        assert_eq!(
            stmt.as_str(),
            "MATCH (n:NotificationEmailScript)\nRETURN COUNT(n) AS NumberOfNotifications"
        );
    }

    #[test]
    fn rejects_every_mutating_keyword_in_any_case() {
        for keyword in MUTATING_KEYWORDS {
            for variant in [keyword.to_string(), keyword.to_lowercase()] {
                let text = format!("MATCH (n) {} n RETURN n", variant);
                assert!(
                    matches!(
                        ReadOnlyStatement::parse(&text),
                        Err(StatementError::Unsafe(GuardViolation::Mutation { .. }))
                    ),
                    "{} was accepted",
                    text
                );
            }
        }
    }

    #[test]
    fn keywords_inside_identifiers_are_not_mutations() {
        assert!(ReadOnlyStatement::parse("MATCH (n) RETURN n.created_at, n.settings").is_ok());
    }

    #[test]
    fn comments_are_removed_before_scanning() {
        let stmt = ReadOnlyStatement::parse("MATCH (n) // set of nodes\nRETURN n").unwrap();
        assert!(!stmt.as_str().contains("set"));
    }

    #[test]
    fn rejects_write_and_admin_procedures() {
        assert!(matches!(
            check_read_only("CALL apoc.periodic.iterate('a', 'b', {})"),
            Err(GuardViolation::WriteProcedure { .. })
        ));
        assert!(matches!(
            check_read_only("CALL dbms.security.listUsers()"),
            Err(GuardViolation::WriteProcedure { .. })
        ));
        assert!(check_read_only("CALL db.labels() YIELD label RETURN label").is_ok());
        assert!(check_read_only("CALL apoc.coll.toSet([1,1]) YIELD value RETURN value").is_ok());
    }

    #[test]
    fn structure_errors() {
        assert_eq!(
            check_structure("MATCH (n RETURN n"),
            Err(StructureError::UnbalancedBrackets)
        );
        assert_eq!(
            check_structure("MATCH (n) RETURN n; MATCH (m) RETURN m"),
            Err(StructureError::MultipleStatements)
        );
        assert_eq!(
            check_structure("MATCH (n) WHERE n.name = 'x"),
            Err(StructureError::UnterminatedString)
        );
        assert_eq!(check_structure("MATCH (n)"), Err(StructureError::MissingReturn));
        assert!(matches!(
            check_structure("Sorry, I cannot help"),
            Err(StructureError::NoLeadingClause(_))
        ));
        assert!(check_structure("CALL db.labels()").is_ok());
    }

    #[test]
    fn trailing_or_leading_sentences_are_stray_text() {
        assert!(matches!(
            check_structure("MATCH (n:Dashboard) RETURN COUNT(n) AS total\nI hope this helps!"),
            Err(StructureError::StrayText(_))
        ));
        assert!(matches!(
            check_structure("Match all dashboards:\nMATCH (d:Dashboard) RETURN d.name"),
            Err(StructureError::StrayText(_))
        ));
    }

    #[test]
    fn multi_line_statements_keep_their_continuations() {
        assert!(check_structure(
            "MATCH (n:Incident)\nWHERE n.priority = 1 AND\n  n.state = 'open'\nRETURN n.name AS name,\n  n.opened_at AS opened\nORDER BY opened DESC\nLIMIT 5"
        )
        .is_ok());
        assert!(check_structure("MATCH (n)\nRETURN n.name\nUNION\nMATCH (m)\nRETURN m.name").is_ok());
    }

    #[test]
    fn keywords_inside_string_literals_are_data() {
        for text in [
            "MATCH (d:Dashboard) WHERE d.name = 'Create Incident' RETURN d",
            "MATCH (a:Action) WHERE a.label = \"Set Priority\" RETURN a.label",
            "MATCH (n:`Delete Requests`) RETURN count(n)",
        ] {
            assert!(ReadOnlyStatement::parse(text).is_ok(), "{} was refused", text);
        }
    }

    #[test]
    fn string_cypher_procedures_are_refused() {
        for text in [
            "CALL apoc.cypher.runWrite('CREATE (n)', {}) YIELD value RETURN value",
            "CALL apoc.cypher.doIt('MERGE (n:X)', {}) YIELD value RETURN value",
            "CALL apoc.do.when(true, 'DELETE n', '', {}) YIELD value RETURN value",
            "CALL apoc.cypher.run('MATCH (n) RETURN n', {}) YIELD value RETURN value",
        ] {
            assert!(
                matches!(check_read_only(text), Err(GuardViolation::WriteProcedure { .. })),
                "{} was accepted",
                text
            );
        }
    }

    #[test]
    fn semicolons_in_literals_are_fine() {
        assert!(check_structure("MATCH (n) WHERE n.name = 'a;b' RETURN n").is_ok());
    }

    #[test]
    fn unterminated_literal_is_malformed() {
        assert!(matches!(
            ReadOnlyStatement::parse("MATCH (n) WHERE n.name = \"open RETURN n"),
            Err(StatementError::Malformed(StructureError::UnterminatedString))
        ));
    }
}
