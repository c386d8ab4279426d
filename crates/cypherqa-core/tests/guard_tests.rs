use cypherqa_core::guard::{check_read_only, ReadOnlyStatement, MUTATING_KEYWORDS};
use cypherqa_core::translator::classify_output;
use cypherqa_core::types::{Rejection, TranslationResult};
use once_cell::sync::Lazy;
use regex::Regex;

static WHOLE_WORD_MUTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(create|delete|merge|set|remove)\b").unwrap()
});

fn variants(word: &str) -> Vec<String> {
    let lower = word.to_lowercase();
    let mut capitalized = lower.clone();
    capitalized[..1].make_ascii_uppercase();
    vec![word.to_uppercase(), lower, capitalized]
}

#[test]
fn test_translate_never_yields_mutating_queries() {
    let templates = [
        "{} (n:Dashboard {name: 'x'}) RETURN n",
        "MATCH (n:Dashboard) {} n",
        "MATCH (n) {} n.name = 'y' RETURN n",
        "```cypher\nMATCH (n)\n{} n\n```",
        "Here you go:\nMATCH (n) WITH n {} n RETURN count(*)",
        "MATCH (n) RETURN n; {} (m)",
    ];
    for keyword in MUTATING_KEYWORDS {
        for variant in variants(keyword) {
            for template in &templates {
                let raw = template.replace("{}", &variant);
                match classify_output(&raw) {
                    TranslationResult::Query(statement) => {
                        assert!(
                            !WHOLE_WORD_MUTATION.is_match(statement.as_str()),
                            "mutating statement accepted: {}",
                            statement
                        );
                    }
                    TranslationResult::Rejected(_) => {}
                }
            }
        }
    }
}

#[test]
fn test_unsafe_rejection_for_delete() {
    assert!(matches!(
        classify_output("MATCH (n) DETACH DELETE n"),
        TranslationResult::Rejected(Rejection::UnsafeQuery(_))
    ));
}

#[test]
fn test_default_example_queries_are_read_only() {
    for example in cypherqa_core::prompt::default_examples() {
        assert!(
            ReadOnlyStatement::parse(&example.query).is_ok(),
            "{}",
            example.query
        );
    }
}

#[test]
fn test_read_procedures_are_allowed() {
    assert!(check_read_only("CALL db.schema.nodeTypeProperties()").is_ok());
    assert!(check_read_only("CALL apoc.create.node(['X'], {})").is_err());
    assert!(check_read_only("CALL dbms.killQuery('q-1')").is_err());
}

#[test]
fn test_mutating_words_inside_literals_are_accepted() {
    for keyword in MUTATING_KEYWORDS {
        for variant in variants(keyword) {
            let raw = format!(
                "MATCH (r:CatalogItem) WHERE r.name = '{} Request' RETURN r.name AS name",
                variant
            );
            assert!(
                matches!(classify_output(&raw), TranslationResult::Query(_)),
                "literal refused: {}",
                raw
            );
        }
    }
}

#[test]
fn test_string_cypher_procedures_are_refused() {
    assert!(check_read_only("CALL apoc.cypher.runWrite('CREATE (n)', {}) YIELD value RETURN value").is_err());
    assert!(check_read_only("CALL apoc.do.case([true, 'SET n.x = 1'], '', {}) YIELD value RETURN value").is_err());
}
