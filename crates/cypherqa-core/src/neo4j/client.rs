use async_trait::async_trait;
use log::{debug, info};
use neo4rs::{query, ConfigBuilder, Database, Graph};

use crate::config::StoreConfig;
use crate::error::{QaResult, StoreError};
use crate::neo4j::convert::{json_to_bolt_type, row_to_record};
use crate::redaction::redact_secrets_in_text;
use crate::traits::{GraphStore, RowBatch};
use crate::types::QueryParams;

/// Connection pool to one Neo4j database.
///
/// `Graph` is cheap to clone and pools connections internally, so a single
/// store can be shared by concurrent pipelines.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
    database: String,
}

impl Neo4jStore {
    pub async fn connect(config: &StoreConfig) -> QaResult<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(Database::from(config.database.as_str()));
        if let Some(fetch_size) = config.fetch_size {
            builder = builder.fetch_size(fetch_size);
        }
        if let Some(max_connections) = config.max_connections {
            builder = builder.max_connections(max_connections);
        }
        let graph_config = builder.build().map_err(StoreError::from)?;

        info!(
            "Connecting to {} (database {})",
            redact_secrets_in_text(&config.uri),
            config.database
        );
        let graph = Graph::connect(graph_config)
            .await
            .map_err(StoreError::from)?;

        Ok(Neo4jStore {
            graph,
            database: config.database.clone(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn query(
        &self,
        statement: &str,
        params: &QueryParams,
        row_cap: usize,
    ) -> Result<RowBatch, StoreError> {
        let mut cypher = query(statement);
        for (name, value) in params {
            cypher = cypher.param(name.as_str(), json_to_bolt_type(value));
        }

        let mut txn = self.graph.start_txn().await?;
        let mut stream = txn.execute(cypher).await?;

        let mut records = Vec::new();
        let mut truncated = false;
        while let Some(row) = stream.next(txn.handle()).await? {
            if records.len() == row_cap {
                truncated = true;
                break;
            }
            records.push(row_to_record(&row)?);
        }
        drop(stream);

        // One row past the cap is enough to know the result was cut; the rest
        // is discarded with the transaction. Nothing here writes, so it is
        // never committed.
        if let Err(e) = txn.rollback().await {
            if truncated {
                debug!("Rollback after truncated read failed: {}", e);
            } else {
                return Err(e.into());
            }
        }

        debug!("{} rows from {} (truncated: {})", records.len(), self.database, truncated);
        Ok(RowBatch { records, truncated })
    }
}
