use cypherqa_core::config::{load_config, AnswerMode, QaConfig};
use cypherqa_core::error::{ConfigError, ErrorKind, QaError};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

const YAML_CONFIG: &str = r#"
store:
  uri: ENV_NEO4J_URI
  user: neo4j
  password: CREDENTIAL_NEO4J_PASSWORD
backend:
  name: openai
  engine: openai
  connection:
    protocol: https
    hostname: api.openai.com
    port: 443
    request_path: /v1/chat/completions
  parameters:
    modelName: gpt-4o-mini
    bearer_token: ${OPENAI_API_KEY}
limits:
  row_cap: 25
prompt:
  examples:
    - question: how many dashboards are there?
      query: MATCH (d:Dashboard) RETURN COUNT(d) AS NumberOfDashboards
"#;

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

fn env() -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("NEO4J_URI".to_string(), "neo4j://localhost:7687".to_string());
    env.insert("OPENAI_API_KEY".to_string(), "sk-test".to_string());
    env
}

fn credentials() -> HashMap<String, String> {
    let mut creds = HashMap::new();
    creds.insert("NEO4J_PASSWORD".to_string(), "secret".to_string());
    creds
}

#[test]
fn test_load_yaml_config_resolves_variables() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "cypherqa.yaml", YAML_CONFIG);

    let config = load_config(&path, &[], &env(), &credentials()).unwrap();

    assert_eq!(config.store.uri, "neo4j://localhost:7687");
    assert_eq!(config.store.password, "secret");
    assert_eq!(config.store.database, "neo4j");
    assert_eq!(config.backend.parameters["bearer_token"], "sk-test");
    assert_eq!(config.limits.row_cap, 25);
    assert_eq!(config.limits.store_timeout_ms, 15_000);
    assert_eq!(config.answer.mode, AnswerMode::Rows);
    assert_eq!(config.prompt.examples().len(), 1);
}

#[test]
fn test_default_examples_when_none_configured() {
    let dir = TempDir::new().unwrap();
    let yaml = YAML_CONFIG.split("prompt:").next().unwrap();
    let path = write(&dir, "cypherqa.yml", yaml);

    let config = load_config(&path, &[], &env(), &credentials()).unwrap();
    let examples = config.prompt.examples();
    assert_eq!(examples.len(), 6);
    assert_eq!(examples[1].question, "how many notifications are there?");
}

#[test]
fn test_load_json_config_with_overrides() {
    let dir = TempDir::new().unwrap();
    let json = r#"{
        "store": {"uri": "bolt://db:7687", "user": "neo4j", "password": "pw"},
        "backend": {
            "name": "claude",
            "engine": "anthropic",
            "connection": {"protocol": "https", "hostname": "api.anthropic.com", "port": 443, "request_path": "/v1/messages"},
            "parameters": {"modelName": "claude-3-5-haiku-latest"}
        }
    }"#;
    let path = write(&dir, "cypherqa.json", json);

    let config = load_config(
        &path,
        &[
            ("limits.row_cap".to_string(), "10".to_string()),
            ("answer.mode".to_string(), "summary".to_string()),
            ("schema.exclude_types".to_string(), r#"["Chunk"]"#.to_string()),
        ],
        &HashMap::new(),
        &HashMap::new(),
    )
    .unwrap();

    assert_eq!(config.limits.row_cap, 10);
    assert_eq!(config.answer.mode, AnswerMode::Summary);
    assert_eq!(config.schema.exclude_types, vec!["Chunk".to_string()]);
}

#[test]
fn test_missing_file_is_reported() {
    let err = load_config("/definitely/not/here.json", &[], &HashMap::new(), &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, QaError::Config(ConfigError::FileNotFound(_))));
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_unresolved_variable_fails() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "cypherqa.yaml", YAML_CONFIG);
    let err = load_config(&path, &[], &HashMap::new(), &credentials()).unwrap_err();
    assert!(matches!(err, QaError::Config(ConfigError::EnvironmentResolution(_))));
}

#[test]
fn test_validation_rejects_zero_limits_and_unknown_engines() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "cypherqa.yaml", YAML_CONFIG);

    let err = load_config(
        &path,
        &[("limits.row_cap".to_string(), "0".to_string())],
        &env(),
        &credentials(),
    )
    .unwrap_err();
    assert!(matches!(err, QaError::Config(ConfigError::InvalidValue { .. })));

    let err = load_config(
        &path,
        &[("backend.engine".to_string(), "cohere".to_string())],
        &env(),
        &credentials(),
    )
    .unwrap_err();
    assert!(matches!(err, QaError::Config(ConfigError::UnsupportedEngine(_))));
}

#[test]
fn test_with_overrides_after_env_defaults() {
    let vars: HashMap<&str, &str> = [
        ("NEO4J_URI", "neo4j://localhost:7687"),
        ("NEO4J_USERNAME", "neo4j"),
        ("NEO4J_PASSWORD", "pw"),
        ("OPENAI_API_KEY", "sk-test"),
    ]
    .into_iter()
    .collect();
    let config = QaConfig::from_env_defaults(|k| vars.get(k).map(|v| v.to_string()))
        .unwrap()
        .with_overrides(&[("answer.wrap_width".to_string(), "80".to_string())])
        .unwrap();
    assert_eq!(config.answer.wrap_width, 80);
    assert_eq!(config.store.password, "pw");
}
