//! In-memory `Engine` and `GraphStore` fakes for tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{BackendError, QaResult, StoreError};
use crate::traits::{Engine, GraphStore, RowBatch};
use crate::types::{QueryParams, Record, Request, Response, Usage};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_records(rows: Vec<Value>) -> Vec<Record> {
    rows.into_iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// Engine answering from a queue of scripted replies.
#[derive(Default)]
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    requests: Mutex<Vec<Request>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        lock(&self.replies).push_back(Ok(text.into()));
    }

    pub fn push_error(&self, error: BackendError) {
        lock(&self.replies).push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.requests).iter().map(|r| r.payload.clone()).collect()
    }

    pub fn flows(&self) -> Vec<String> {
        lock(&self.requests).iter().map(|r| r.flowname.clone()).collect()
    }
}

impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn execute<'a>(
        &'a self,
        request: &'a Request,
    ) -> Box<dyn Future<Output = QaResult<Response>> + Send + 'a> {
        Box::new(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            lock(&self.requests).push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = lock(&self.replies).pop_front();
            match next {
                Some(Ok(content)) => Ok(Response {
                    content,
                    usage: Usage::default(),
                    model: "scripted".to_string(),
                    finish_reason: Some("stop".to_string()),
                }),
                Some(Err(e)) => Err(e.into()),
                None => Err(BackendError::InvalidRequest("no scripted reply left".to_string()).into()),
            }
        })
    }
}

#[derive(Default)]
struct FakeSchema {
    nodes: Vec<Record>,
    rels: Vec<Record>,
    patterns: Vec<Record>,
}

/// Graph store answering introspection from a configured schema and every
/// other statement from a queue of results.
#[derive(Default)]
pub struct FakeGraphStore {
    schema: Mutex<FakeSchema>,
    results: Mutex<VecDeque<Result<Vec<Record>, StoreError>>>,
    executed: Mutex<Vec<String>>,
    schema_queries: AtomicUsize,
    unreachable: bool,
    delay: Option<Duration>,
    row_delay: Option<Duration>,
}

impl FakeGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a connectivity error.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Deliver query results one row at a time, pausing before each row.
    /// Reading stops one row past the cap, like a streaming driver.
    pub fn with_row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = Some(delay);
        self
    }

    pub fn with_node_label(self, label: &str, properties: &[(&str, &str)]) -> Self {
        self.add_node_label(label, properties);
        self
    }

    pub fn with_pattern(self, start: &str, rel_type: &str, end: &str) -> Self {
        {
            let mut schema = lock(&self.schema);
            schema.rels.extend(to_records(vec![json!({
                "relType": format!(":`{}`", rel_type),
                "propertyName": null,
                "propertyTypes": null,
            })]));
            schema.patterns.extend(to_records(vec![json!({
                "start_label": start,
                "rel_type": rel_type,
                "end_label": end,
            })]));
        }
        self
    }

    pub fn add_node_label(&self, label: &str, properties: &[(&str, &str)]) {
        let rows = if properties.is_empty() {
            vec![json!({"nodeLabels": [label], "propertyName": null, "propertyTypes": null})]
        } else {
            properties
                .iter()
                .map(|(name, ty)| json!({"nodeLabels": [label], "propertyName": name, "propertyTypes": [ty]}))
                .collect()
        };
        lock(&self.schema).nodes.extend(to_records(rows));
    }

    pub fn push_rows(&self, rows: Vec<Value>) {
        lock(&self.results).push_back(Ok(to_records(rows)));
    }

    pub fn push_error(&self, error: StoreError) {
        lock(&self.results).push_back(Err(error));
    }

    /// Non-introspection statements received so far.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    pub fn schema_queries(&self) -> usize {
        self.schema_queries.load(Ordering::SeqCst)
    }

    fn introspect(&self, statement: &str) -> Option<Vec<Record>> {
        let schema = lock(&self.schema);
        if statement.contains("db.schema.nodeTypeProperties") {
            Some(schema.nodes.clone())
        } else if statement.contains("db.schema.relTypeProperties") {
            Some(schema.rels.clone())
        } else if statement.contains("labels(a) AS start_labels") {
            Some(schema.patterns.clone())
        } else if statement.trim() == "RETURN 1 AS ok" {
            Some(to_records(vec![json!({"ok": 1})]))
        } else {
            None
        }
    }
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn query(
        &self,
        statement: &str,
        _params: &QueryParams,
        row_cap: usize,
    ) -> Result<RowBatch, StoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(StoreError::Unreachable("connection refused".to_string()));
        }

        if let Some(mut records) = self.introspect(statement) {
            self.schema_queries.fetch_add(1, Ordering::SeqCst);
            let truncated = records.len() > row_cap;
            records.truncate(row_cap);
            return Ok(RowBatch { records, truncated });
        }

        lock(&self.executed).push(statement.to_string());
        let next = lock(&self.results).pop_front();
        let rows = next.unwrap_or_else(|| Ok(Vec::new()))?;

        let mut records = Vec::new();
        let mut truncated = false;
        for row in rows {
            if let Some(delay) = self.row_delay {
                tokio::time::sleep(delay).await;
            }
            if records.len() == row_cap {
                truncated = true;
                break;
            }
            records.push(row);
        }
        Ok(RowBatch { records, truncated })
    }
}
