use std::future::Future;

use cypherqa_core::config::EngineConfig;
use cypherqa_core::error::{BackendError, QaResult};
use cypherqa_core::traits::{Engine, EngineConfigProcessor, OpenAIConfigProcessor};
use cypherqa_core::types::{Request, Response, Usage};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::{json, Value};

use crate::http::{bearer_token, build_client, post_json};

/// Chat-completions backend (OpenAI and compatible servers).
pub struct OpenAIEngine {
    config: EngineConfig,
    config_processor: OpenAIConfigProcessor,
    client: Client,
    url: String,
}

impl OpenAIEngine {
    pub fn new(config: EngineConfig) -> QaResult<Self> {
        let url = config.connection.endpoint()?.to_string();
        Ok(Self {
            config,
            config_processor: OpenAIConfigProcessor,
            client: build_client()?,
            url,
        })
    }

    fn parse_response(body: &Value) -> Result<Response, BackendError> {
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                BackendError::MalformedResponse("missing choices[0].message.content".to_string())
            })?
            .to_string();

        let usage = Usage {
            prompt_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: body["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(Response {
            content,
            usage,
            model: body["model"].as_str().unwrap_or("unknown").to_string(),
            finish_reason: body["choices"][0]["finish_reason"]
                .as_str()
                .map(String::from),
        })
    }
}

impl Engine for OpenAIEngine {
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
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                    BackendError::Unauthorized("bearer_token is not a valid header value".to_string())
                })?,
            );

            debug!("OpenAI request for flow {}", request.flowname);
            let body = post_json(&self.client, &self.url, headers, &payload).await?;
            Ok(Self::parse_response(&body)?)
        })
    }
}
