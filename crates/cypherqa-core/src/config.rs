use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{ConfigError, QaError, QaResult};
use crate::prompt::default_examples;
use crate::redaction::redact_secrets_in_text;
use crate::types::PromptExample;

pub const DEFAULT_CONFIG_PATH: &str = "cypherqa.json";

/// Engine identifiers with a backend implementation.
pub const SUPPORTED_ENGINES: &[&str] = &["openai", "anthropic"];

/// Everything a [`crate::pipeline::Pipeline`] needs, supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    pub store: StoreConfig,
    pub backend: EngineConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
}

fn default_database() -> String {
    "neo4j".to_string()
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("uri", &redact_secrets_in_text(&self.uri))
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("fetch_size", &self.fetch_size)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    pub name: String,
    pub engine: String,
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConnectionConfig {
    pub protocol: String,
    pub hostname: String,
    pub port: u16,
    pub request_path: String,
}

impl ConnectionConfig {
    pub fn endpoint(&self) -> QaResult<Url> {
        let raw = format!(
            "{}://{}:{}{}",
            self.protocol, self.hostname, self.port, self.request_path
        );
        Ok(Url::parse(&raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub backend_timeout_ms: u64,
    pub store_timeout_ms: u64,
    pub row_cap: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            backend_timeout_ms: 30_000,
            store_timeout_ms: 15_000,
            row_cap: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<PromptExample>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl PromptConfig {
    /// Configured examples, or the built-in set when none are given.
    pub fn examples(&self) -> Vec<PromptExample> {
        self.examples.clone().unwrap_or_else(default_examples)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub include_types: Vec<String>,
    pub exclude_types: Vec<String>,
    pub relationship_sample: u64,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            relationship_sample: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Deterministic rendering of the rows
    #[default]
    Rows,
    /// Rows passed back through the backend for a prose answer
    Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    pub mode: AnswerMode,
    pub wrap_width: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            mode: AnswerMode::Rows,
            wrap_width: 60,
        }
    }
}

impl QaConfig {
    /// Build a configuration from `NEO4J_URI`, `NEO4J_USERNAME`, `NEO4J_PASSWORD`
    /// and `OPENAI_API_KEY`, looked up through `lookup`.
    pub fn from_env_defaults<F>(lookup: F) -> QaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| -> QaResult<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingParameter(key.to_string()).into())
        };

        let mut parameters = HashMap::new();
        parameters.insert("modelName".to_string(), Value::from("gpt-4o-mini"));
        parameters.insert("bearer_token".to_string(), Value::from(require("OPENAI_API_KEY")?));
        parameters.insert("temperature".to_string(), Value::from(0.0));

        let config = QaConfig {
            store: StoreConfig {
                uri: require("NEO4J_URI")?,
                user: require("NEO4J_USERNAME")?,
                password: require("NEO4J_PASSWORD")?,
                database: default_database(),
                fetch_size: None,
                max_connections: None,
            },
            backend: EngineConfig {
                name: "openai".to_string(),
                engine: "openai".to_string(),
                connection: ConnectionConfig {
                    protocol: "https".to_string(),
                    hostname: "api.openai.com".to_string(),
                    port: 443,
                    request_path: "/v1/chat/completions".to_string(),
                },
                parameters,
            },
            limits: LimitsConfig::default(),
            prompt: PromptConfig::default(),
            schema: SchemaConfig::default(),
            answer: AnswerConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply dotted-path overrides such as `limits.row_cap=50`.
    pub fn with_overrides(self, overrides: &[(String, String)]) -> QaResult<Self> {
        if overrides.is_empty() {
            return Ok(self);
        }
        let mut value = serde_json::to_value(&self)?;
        apply_overrides(&mut value, overrides)?;
        let config: QaConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QaResult<()> {
        if self.store.uri.trim().is_empty() {
            return Err(ConfigError::MissingParameter("store.uri".to_string()).into());
        }
        Url::parse(&self.store.uri).map_err(|e| ConfigError::InvalidValue {
            parameter: "store.uri".to_string(),
            value: redact_secrets_in_text(&self.store.uri),
            expected: format!("a connection URI ({})", e),
        })?;

        let engine = self.backend.engine.to_lowercase();
        if !SUPPORTED_ENGINES.contains(&engine.as_str()) {
            return Err(ConfigError::UnsupportedEngine(self.backend.engine.clone()).into());
        }

        for (parameter, value) in [
            ("limits.backend_timeout_ms", self.limits.backend_timeout_ms),
            ("limits.store_timeout_ms", self.limits.store_timeout_ms),
            ("limits.row_cap", self.limits.row_cap as u64),
            ("answer.wrap_width", self.answer.wrap_width as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    parameter: parameter.to_string(),
                    value: "0".to_string(),
                    expected: "a positive number".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// Read, resolve, override and validate a configuration file.
///
/// `env` backs `ENV_NAME`/`${NAME}` references and `credentials` backs
/// `CREDENTIAL_NAME` references.
pub fn load_config(
    config_path: &str,
    overrides: &[(String, String)],
    env: &HashMap<String, String>,
    credentials: &HashMap<String, String>,
) -> QaResult<QaConfig> {
    let content = fs::read_to_string(config_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => QaError::Config(ConfigError::FileNotFound(config_path.to_string())),
        _ => QaError::from(e),
    })?;

    debug!("Loading config from {}", config_path);
    let mut value = parse_config_str(&content, config_path)?;

    let mut processor = VariableResolverProcessor::new(env, credentials);
    processor.resolve(&mut value)?;

    apply_overrides(&mut value, overrides)?;

    let config: QaConfig = serde_json::from_value(value)?;
    config.validate()?;
    debug!("Loaded config: {}", redact_secrets_in_text(&format!("{:?}", config)));
    Ok(config)
}

/// YAML for `.yaml`/`.yml` paths, JSON otherwise.
pub fn parse_config_str(content: &str, path: &str) -> QaResult<Value> {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match extension.as_deref() {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(content)?),
        _ => Ok(serde_json::from_str(content)?),
    }
}

pub trait VariableResolver {
    fn is_resolvable(&self, key: &str) -> bool;
    fn resolve(&self, key: &str) -> QaResult<String>;
}

pub struct EnvVarResolver {
    vars: HashMap<String, String>,
}

impl EnvVarResolver {
    pub fn new(vars: HashMap<String, String>) -> Self {
        EnvVarResolver { vars }
    }
}

pub struct CredentialResolver {
    credentials: HashMap<String, String>,
}

impl CredentialResolver {
    pub fn new(credentials: HashMap<String, String>) -> Self {
        CredentialResolver { credentials }
    }
}

impl VariableResolver for EnvVarResolver {
    fn is_resolvable(&self, key: &str) -> bool {
        key.starts_with("ENV_") || (key.starts_with("${") && key.ends_with('}'))
    }

    fn resolve(&self, key: &str) -> QaResult<String> {
        let env_key = if let Some(stripped) = key.strip_prefix("ENV_") {
            stripped
        } else if let Some(inner) = key.strip_prefix("${").and_then(|k| k.strip_suffix('}')) {
            inner
        } else {
            return Err(ConfigError::EnvironmentResolution(key.to_string()).into());
        };

        debug!("Looking up environment variable: {}", env_key);
        self.vars
            .get(env_key)
            .cloned()
            .ok_or_else(|| ConfigError::EnvironmentResolution(env_key.to_string()).into())
    }
}

impl VariableResolver for CredentialResolver {
    fn is_resolvable(&self, key: &str) -> bool {
        key.starts_with("CREDENTIAL_")
    }

    fn resolve(&self, key: &str) -> QaResult<String> {
        let credential_key = &key["CREDENTIAL_".len()..];
        debug!("Looking up credential: {}", credential_key);
        self.credentials
            .get(credential_key)
            .cloned()
            .ok_or_else(|| ConfigError::CredentialResolution(credential_key.to_string()).into())
    }
}

pub struct VariableResolverProcessor {
    resolvers: Vec<Arc<dyn VariableResolver>>,
}

impl VariableResolverProcessor {
    pub fn new(env: &HashMap<String, String>, credentials: &HashMap<String, String>) -> Self {
        VariableResolverProcessor {
            resolvers: vec![
                Arc::new(EnvVarResolver::new(env.clone())),
                Arc::new(CredentialResolver::new(credentials.clone())),
            ],
        }
    }

    pub fn resolve(&mut self, value: &mut Value) -> QaResult<()> {
        match value {
            Value::String(s) => {
                for resolver in &self.resolvers {
                    if resolver.is_resolvable(s) {
                        *s = resolver.resolve(s)?;
                        return Ok(());
                    }
                }
                Ok(())
            }
            Value::Object(map) => {
                for (_, v) in map.iter_mut() {
                    self.resolve(v)?;
                }
                Ok(())
            }
            Value::Array(arr) => {
                for item in arr.iter_mut() {
                    self.resolve(item)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

pub fn parse_key_value_pair(pair: &str) -> Option<(String, String)> {
    let (key, value) = pair.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Override values are parsed as JSON when possible (`50`, `true`, `["A"]`) and
/// kept as strings otherwise.
pub fn apply_overrides(config: &mut Value, overrides: &[(String, String)]) -> QaResult<()> {
    for (key, raw) in overrides {
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));

        let mut keys = key.split('.').peekable();
        let mut current = config
            .as_object_mut()
            .ok_or_else(|| ConfigError::InvalidFormat("configuration root is not an object".to_string()))?;
        while let Some(part) = keys.next() {
            if keys.peek().is_none() {
                current.insert(part.to_string(), value.clone());
            } else {
                current = current
                    .entry(part)
                    .or_insert_with(|| Value::Object(serde_json::Map::new()))
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::InvalidValue {
                        parameter: key.clone(),
                        value: raw.clone(),
                        expected: format!("'{}' to be a section", part),
                    })?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn resolves_env_and_credentials() {
        let mut value = json!({
            "a": "ENV_NEO4J_URI",
            "b": "${NEO4J_PASSWORD}",
            "c": ["CREDENTIAL_OPENAI"],
            "d": "plain",
        });
        let mut processor = VariableResolverProcessor::new(
            &env(&[("NEO4J_URI", "neo4j://localhost:7687"), ("NEO4J_PASSWORD", "pw")]),
            &env(&[("OPENAI", "sk-test")]),
        );
        processor.resolve(&mut value).unwrap();
        assert_eq!(value["a"], "neo4j://localhost:7687");
        assert_eq!(value["b"], "pw");
        assert_eq!(value["c"][0], "sk-test");
        assert_eq!(value["d"], "plain");
    }

    #[test]
    fn missing_variable_is_a_config_error() {
        let mut value = json!({"a": "ENV_NOT_THERE"});
        let mut processor = VariableResolverProcessor::new(&HashMap::new(), &HashMap::new());
        let err = processor.resolve(&mut value).unwrap_err();
        assert!(matches!(
            err,
            QaError::Config(ConfigError::EnvironmentResolution(ref name)) if name == "NOT_THERE"
        ));
    }

    #[test]
    fn overrides_follow_dotted_paths() {
        let mut value = json!({"limits": {"row_cap": 200}});
        apply_overrides(
            &mut value,
            &[
                ("limits.row_cap".to_string(), "50".to_string()),
                ("answer.mode".to_string(), "summary".to_string()),
            ],
        )
        .unwrap();
        assert_eq!(value["limits"]["row_cap"], 50);
        assert_eq!(value["answer"]["mode"], "summary");
    }

    #[test]
    fn key_value_pairs() {
        assert_eq!(
            parse_key_value_pair("limits.row_cap=10"),
            Some(("limits.row_cap".to_string(), "10".to_string()))
        );
        assert_eq!(parse_key_value_pair("no_equals"), None);
        assert_eq!(parse_key_value_pair("=x"), None);
    }

    #[test]
    fn env_defaults_need_all_four_variables() {
        let vars = env(&[
            ("NEO4J_URI", "neo4j://localhost:7687"),
            ("NEO4J_USERNAME", "neo4j"),
            ("NEO4J_PASSWORD", "secret"),
            ("OPENAI_API_KEY", "sk-test"),
        ]);
        let config = QaConfig::from_env_defaults(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.store.database, "neo4j");
        assert_eq!(config.backend.parameters["temperature"], json!(0.0));
        assert_eq!(config.answer.wrap_width, 60);

        let err = QaConfig::from_env_defaults(|k| {
            if k == "OPENAI_API_KEY" {
                None
            } else {
                vars.get(k).cloned()
            }
        })
        .unwrap_err();
        assert!(matches!(err, QaError::Config(ConfigError::MissingParameter(_))));
    }

    #[test]
    fn store_debug_hides_password() {
        let store = StoreConfig {
            uri: "neo4j://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "hunter2".to_string(),
            database: "neo4j".to_string(),
            fetch_size: None,
            max_connections: None,
        };
        assert!(!format!("{:?}", store).contains("hunter2"));
    }
}
