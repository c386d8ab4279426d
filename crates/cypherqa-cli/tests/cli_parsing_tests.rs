use std::collections::HashMap;
use std::fs;

use cypherqa_cli::cli::{collect_overrides, innermost, resolve_config};
use cypherqa_cli::commands::repl::{parse_line, ReplInput};
use cypherqa_cli::{build_cli, CliError};
use tempfile::TempDir;

const JSON_CONFIG: &str = r#"{
  "store": {
    "uri": "neo4j://graph.internal:7687",
    "user": "reader",
    "password": "CREDENTIAL_NEO4J_PASSWORD"
  },
  "backend": {
    "name": "anthropic",
    "engine": "anthropic",
    "connection": {
      "protocol": "https",
      "hostname": "api.anthropic.com",
      "port": 443,
      "request_path": "/v1/messages"
    },
    "parameters": {
      "modelName": "claude-3-5-haiku-latest",
      "bearer_token": "ENV_ANTHROPIC_API_KEY"
    }
  },
  "answer": { "mode": "summary" }
}"#;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn parses_every_subcommand() {
    for args in [
        vec!["cypherqa", "ask", "how many dashboards are there?"],
        vec!["cypherqa", "translate", "list the incidents"],
        vec!["cypherqa", "schema", "--check"],
        vec!["cypherqa", "repl"],
    ] {
        let matches = build_cli().try_get_matches_from(&args);
        assert!(matches.is_ok(), "{:?} failed to parse", args);
    }
}

#[test]
fn subcommand_is_required() {
    assert!(build_cli().try_get_matches_from(["cypherqa"]).is_err());
    assert!(build_cli().try_get_matches_from(["cypherqa", "ask"]).is_err());
}

#[test]
fn global_flags_reach_the_subcommand() {
    let matches = build_cli()
        .try_get_matches_from([
            "cypherqa",
            "--config",
            "qa.yaml",
            "ask",
            "-o",
            "limits.row_cap=50",
            "--verbose",
            "--json",
            "count the notifications",
        ])
        .unwrap();
    let sub = innermost(&matches);
    assert_eq!(sub.get_one::<String>("config").unwrap(), "qa.yaml");
    assert!(sub.get_flag("verbose"));
    assert!(sub.get_flag("json"));
    assert_eq!(
        collect_overrides(sub).unwrap(),
        vec![("limits.row_cap".to_string(), "50".to_string())]
    );
}

#[test]
fn malformed_override_is_rejected() {
    let matches = build_cli()
        .try_get_matches_from(["cypherqa", "repl", "-o", "row_cap"])
        .unwrap();
    match collect_overrides(innermost(&matches)) {
        Err(CliError::InvalidOverride(pair)) => assert_eq!(pair, "row_cap"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn explicit_config_file_is_resolved() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("qa.json");
    fs::write(&path, JSON_CONFIG).unwrap();

    let config = resolve_config(
        Some(path.to_str().unwrap()),
        &[("limits.row_cap".to_string(), "50".to_string())],
        &env(&[
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("CREDENTIAL_NEO4J_PASSWORD", "s3cret"),
        ]),
    )
    .unwrap();

    assert_eq!(config.store.password, "s3cret");
    assert_eq!(config.backend.parameters["bearer_token"], "sk-ant-test");
    assert_eq!(config.limits.row_cap, 50);
    assert_eq!(config.store.database, "neo4j");
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");
    let err = resolve_config(Some(path.to_str().unwrap()), &[], &HashMap::new()).unwrap_err();
    assert!(err.to_string().contains("Configuration file not found"));
}

#[test]
fn environment_fallback_without_a_file() {
    let config = resolve_config(
        None,
        &[],
        &env(&[
            ("NEO4J_URI", "neo4j://localhost:7687"),
            ("NEO4J_USERNAME", "neo4j"),
            ("NEO4J_PASSWORD", "password"),
            ("OPENAI_API_KEY", "sk-test"),
        ]),
    )
    .unwrap();
    assert_eq!(config.backend.engine, "openai");
    assert_eq!(config.store.user, "neo4j");

    let missing = resolve_config(None, &[], &env(&[("NEO4J_URI", "neo4j://localhost:7687")]));
    assert!(missing.is_err());
}

#[test]
fn repl_lines() {
    assert_eq!(parse_line(":schema"), ReplInput::Schema);
    assert_eq!(parse_line("   "), ReplInput::Blank);
}
