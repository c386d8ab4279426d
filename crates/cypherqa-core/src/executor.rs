//! Bounded execution of guarded statements

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::StoreError;
use crate::guard::ReadOnlyStatement;
use crate::traits::GraphStore;
use crate::types::{ExecutionFailure, ExecutionResult, FailureKind, QueryParams};

pub struct QueryExecutor {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
    row_cap: usize,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn GraphStore>, timeout: Duration, row_cap: usize) -> Self {
        Self {
            store,
            timeout,
            row_cap,
        }
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    pub async fn execute(&self, statement: &ReadOnlyStatement) -> ExecutionResult {
        self.execute_with_params(statement, &QueryParams::new()).await
    }

    /// Runs once. A rejected statement is reported, never re-sent.
    pub async fn execute_with_params(
        &self,
        statement: &ReadOnlyStatement,
        params: &QueryParams,
    ) -> ExecutionResult {
        info!("Executing Cypher query: {}", statement);
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            self.timeout,
            self.store.query(statement.as_str(), params, self.row_cap),
        )
        .await;

        match outcome {
            Err(_) => {
                warn!("Statement timed out after {:?}", self.timeout);
                ExecutionResult::Failure(ExecutionFailure::new(
                    FailureKind::Timeout,
                    format!("no result within {} ms", self.timeout.as_millis()),
                ))
            }
            Ok(Err(e)) => {
                warn!("Statement failed: {}", e);
                ExecutionResult::Failure(failure_from_store(e))
            }
            Ok(Ok(batch)) => {
                debug!(
                    "{} rows in {:?} (truncated: {})",
                    batch.records.len(),
                    started.elapsed(),
                    batch.truncated
                );
                if batch.truncated {
                    ExecutionResult::Failure(ExecutionFailure {
                        kind: FailureKind::ResourceExceeded,
                        message: format!("more than {} rows", self.row_cap),
                        partial: batch.records,
                    })
                } else {
                    ExecutionResult::Rows(batch.records)
                }
            }
        }
    }
}

pub fn failure_from_store(error: StoreError) -> ExecutionFailure {
    let message = error.to_string();
    let kind = match error {
        StoreError::Syntax(_) => FailureKind::Syntax,
        StoreError::Timeout { .. } => FailureKind::Timeout,
        StoreError::ResourceExceeded(_) => FailureKind::ResourceExceeded,
        StoreError::Unreachable(_) => FailureKind::Connectivity,
        StoreError::Failed(_) => FailureKind::Failed,
    };
    ExecutionFailure::new(kind, message)
}
