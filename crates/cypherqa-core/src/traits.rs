use std::future::Future;

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::error::{ConfigError, QaResult, StoreError};
use crate::types::{QueryParams, Record, Request, Response};

/// A text-generation backend.
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    fn execute<'a>(
        &'a self,
        request: &'a Request,
    ) -> Box<dyn Future<Output = QaResult<Response>> + Send + 'a>;
}

/// Rows returned by one statement, at most `row_cap` of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    pub records: Vec<Record>,
    /// The store had more rows than the cap allowed.
    pub truncated: bool,
}

/// Query-execution boundary of the graph store.
///
/// Implementations must be safe for concurrent use from several pipelines.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn query(
        &self,
        statement: &str,
        params: &QueryParams,
        row_cap: usize,
    ) -> Result<RowBatch, StoreError>;

    /// Cheap round trip used as a connection smoke test.
    async fn ping(&self) -> Result<(), StoreError> {
        let batch = self.query("RETURN 1 AS ok", &QueryParams::new(), 1).await?;
        match batch.records.first().and_then(|r| r.get("ok")) {
            Some(v) if v.as_i64() == Some(1) => Ok(()),
            other => Err(StoreError::Failed(format!(
                "unexpected ping result: {:?}",
                other
            ))),
        }
    }
}

pub trait EngineConfigProcessor {
    fn process_config(&self, config: &EngineConfig) -> QaResult<Value>;
}

fn model_name(config: &EngineConfig) -> QaResult<&str> {
    config
        .parameters
        .get("modelName")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ConfigError::MissingParameter("modelName".to_string()).into())
}

/// Accepts numbers given either as JSON numbers or numeric strings.
fn number_param(config: &EngineConfig, key: &str) -> Option<f64> {
    config.parameters.get(key).and_then(|v| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
    })
}

fn integer_param(config: &EngineConfig, key: &str) -> Option<u64> {
    config.parameters.get(key).and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse::<u64>().ok()))
    })
}

/// Translation must be reproducible, so temperature defaults to zero.
fn temperature(config: &EngineConfig) -> f64 {
    number_param(config, "temperature").unwrap_or(0.0)
}

pub struct OpenAIConfigProcessor;
impl EngineConfigProcessor for OpenAIConfigProcessor {
    fn process_config(&self, config: &EngineConfig) -> QaResult<Value> {
        debug!("OpenAIConfigProcessor::process_config for {}", config.name);

        let mut payload = json!({
            "model": model_name(config)?,
            "messages": [],
            "temperature": temperature(config),
        });

        if let Some(max_tokens) = integer_param(config, "max_tokens") {
            payload["max_tokens"] = json!(max_tokens);
        }

        for &param in &["top_p", "seed", "stop"] {
            if let Some(value) = config.parameters.get(param) {
                payload[param] = value.clone();
            }
        }

        Ok(payload)
    }
}

pub struct AnthropicConfigProcessor;
impl EngineConfigProcessor for AnthropicConfigProcessor {
    fn process_config(&self, config: &EngineConfig) -> QaResult<Value> {
        debug!("AnthropicConfigProcessor::process_config for {}", config.name);

        // The messages API requires max_tokens.
        let max_tokens = integer_param(config, "max_tokens").unwrap_or(1024);

        let mut payload = json!({
            "model": model_name(config)?,
            "messages": [],
            "max_tokens": max_tokens,
            "temperature": temperature(config),
        });

        if let Some(top_p) = number_param(config, "top_p") {
            payload["top_p"] = json!(top_p);
        }
        if let Some(system) = config.parameters.get("system") {
            payload["system"] = system.clone();
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use std::collections::HashMap;

    fn config(params: Value) -> EngineConfig {
        let parameters: HashMap<String, Value> = serde_json::from_value(params).unwrap();
        EngineConfig {
            name: "test".to_string(),
            engine: "openai".to_string(),
            connection: ConnectionConfig {
                protocol: "https".to_string(),
                hostname: "api.openai.com".to_string(),
                port: 443,
                request_path: "/v1/chat/completions".to_string(),
            },
            parameters,
        }
    }

    #[test]
    fn openai_payload_defaults_temperature_to_zero() {
        let payload = OpenAIConfigProcessor
            .process_config(&config(json!({"modelName": "gpt-4o-mini", "max_tokens": "256"})))
            .unwrap();
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["temperature"], json!(0.0));
        assert_eq!(payload["max_tokens"], json!(256));
    }

    #[test]
    fn explicit_temperature_is_kept() {
        let payload = AnthropicConfigProcessor
            .process_config(&config(json!({"modelName": "claude", "temperature": "0.2"})))
            .unwrap();
        assert_eq!(payload["temperature"], json!(0.2));
        assert_eq!(payload["max_tokens"], json!(1024));
    }

    #[test]
    fn missing_model_is_a_config_error() {
        let err = OpenAIConfigProcessor
            .process_config(&config(json!({})))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
