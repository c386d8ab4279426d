//! Wiring of configured backends into a [`Pipeline`]

use std::sync::Arc;
use std::time::Duration;

use cypherqa_core::config::QaConfig;
use cypherqa_core::neo4j::Neo4jStore;
use cypherqa_core::schema::SchemaDescriber;
use cypherqa_core::traits::{Engine, GraphStore};
use cypherqa_core::{Pipeline, QaResult};
use cypherqa_engines::create_engine;
use log::debug;

pub async fn connect_store(config: &QaConfig) -> QaResult<Arc<dyn GraphStore>> {
    let store = Neo4jStore::connect(&config.store).await?;
    Ok(Arc::new(store))
}

pub fn build_engine(config: &QaConfig) -> QaResult<Arc<dyn Engine>> {
    Ok(Arc::from(create_engine(&config.backend)?))
}

/// Engine first, so a bad backend section fails before any connection is made.
pub async fn build_pipeline(config: &QaConfig) -> QaResult<Pipeline> {
    let engine = build_engine(config)?;
    let store = connect_store(config).await?;
    debug!("Pipeline ready with engine '{}'", engine.name());
    Ok(Pipeline::new(config, engine, store))
}

pub fn schema_describer(config: &QaConfig, store: Arc<dyn GraphStore>) -> SchemaDescriber {
    SchemaDescriber::new(store, Duration::from_millis(config.limits.store_timeout_ms))
        .with_relationship_sample(config.schema.relationship_sample)
        .with_type_filter(
            config.schema.include_types.clone(),
            config.schema.exclude_types.clone(),
        )
}
