use std::time::Duration;

use cypherqa_core::error::{BackendError, QaResult};
use cypherqa_core::redaction::redact_secrets_in_text;
use log::debug;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_client() -> QaResult<Client> {
    Ok(Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?)
}

pub(crate) fn bearer_token<'a>(
    parameters: &'a std::collections::HashMap<String, Value>,
) -> Result<&'a str, BackendError> {
    parameters
        .get("bearer_token")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| BackendError::Unauthorized("bearer_token not configured".to_string()))
}

/// POST a JSON payload and return the decoded JSON body of a successful reply.
pub(crate) async fn post_json(
    client: &Client,
    url: &str,
    headers: HeaderMap,
    payload: &Value,
) -> Result<Value, BackendError> {
    let res = client
        .post(url)
        .headers(headers)
        .json(payload)
        .send()
        .await
        .map_err(BackendError::from)?;

    let status = res.status();
    let retry_after = res
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = res.text().await.map_err(BackendError::from)?;
    debug!("Backend replied {} ({} bytes)", status, body.len());

    if !status.is_success() {
        return Err(classify_status(status, retry_after, &error_message(&body)));
    }

    let value: Value = serde_json::from_str(&body)
        .map_err(|e| BackendError::MalformedResponse(format!("invalid JSON: {}", e)))?;
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(BackendError::Api {
            status: Some(status.as_u16()),
            message: redact_secrets_in_text(&error.to_string()),
        });
    }
    Ok(value)
}

fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error").map(|e| match e.get("message").and_then(|m| m.as_str()) {
                Some(m) => m.to_string(),
                None => e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()),
            })
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    redact_secrets_in_text(&message)
}

pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<u64>,
    message: &str,
) -> BackendError {
    match status.as_u16() {
        429 => BackendError::RateLimited { retry_after },
        401 | 403 => BackendError::Unauthorized(message.to_string()),
        400 | 404 | 413 | 422 => BackendError::InvalidRequest(message.to_string()),
        408 | 504 => BackendError::Timeout { after_ms: 0 },
        code => BackendError::Api {
            status: Some(code),
            message: message.to_string(),
        },
    }
}
