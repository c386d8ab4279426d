use std::future::Future;

use cypherqa_core::config::EngineConfig;
use cypherqa_core::error::{BackendError, QaResult};
use cypherqa_core::traits::{AnthropicConfigProcessor, Engine, EngineConfigProcessor};
use cypherqa_core::types::{Request, Response, Usage};
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::{json, Value};

use crate::http::{bearer_token, build_client, post_json};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API backend.
pub struct AnthropicEngine {
    config: EngineConfig,
    config_processor: AnthropicConfigProcessor,
    client: Client,
    url: String,
}

impl AnthropicEngine {
    pub fn new(config: EngineConfig) -> QaResult<Self> {
        let url = config.connection.endpoint()?.to_string();
        Ok(Self {
            config,
            config_processor: AnthropicConfigProcessor,
            client: build_client()?,
            url,
        })
    }

    fn parse_response(body: &Value) -> Result<Response, BackendError> {
        let content = body["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"].as_str().unwrap_or("text") == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                BackendError::MalformedResponse("missing text content block".to_string())
            })?;

        let input = body["usage"]["input_tokens"].as_u64().unwrap_or(0);
        let output = body["usage"]["output_tokens"].as_u64().unwrap_or(0);

        Ok(Response {
            content,
            usage: Usage {
                prompt_tokens: input as u32,
                completion_tokens: output as u32,
                total_tokens: (input + output) as u32,
            },
            model: body["model"].as_str().unwrap_or("unknown").to_string(),
            finish_reason: body["stop_reason"].as_str().map(String::from),
        })
    }
}

impl Engine for AnthropicEngine {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn execute<'a>(
        &'a self,
        request: &'a Request,
    ) -> Box<dyn Future<Output = QaResult<Response>> + Send + 'a> {
        Box::new(async move {
            let mut payload = self.config_processor.process_config(&self.config)?;
            payload["messages"] = json!([
                {
                    "role": "user",
                    "content": request.payload,
                }
            ]);

            let token = bearer_token(&self.config.parameters)?;
            let mut headers = HeaderMap::new();
            headers.insert(
                HeaderName::from_static("x-api-key"),
                HeaderValue::from_str(token).map_err(|_| {
                    BackendError::Unauthorized("bearer_token is not a valid header value".to_string())
                })?,
            );
            headers.insert(
                HeaderName::from_static("anthropic-version"),
                HeaderValue::from_static(ANTHROPIC_VERSION),
            );

            debug!("Anthropic request for flow {}", request.flowname);
            let body = post_json(&self.client, &self.url, headers, &payload).await?;
            Ok(Self::parse_response(&body)?)
        })
    }
}
