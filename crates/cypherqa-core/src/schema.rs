//! Graph schema snapshots and their prompt serialization

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{QaResult, StoreError};
use crate::traits::GraphStore;
use crate::types::{QueryParams, Record};

pub const NODE_PROPERTIES_QUERY: &str = "CALL db.schema.nodeTypeProperties() \
     YIELD nodeLabels, propertyName, propertyTypes \
     RETURN nodeLabels, propertyName, propertyTypes";

pub const REL_PROPERTIES_QUERY: &str = "CALL db.schema.relTypeProperties() \
     YIELD relType, propertyName, propertyTypes \
     RETURN relType, propertyName, propertyTypes";

pub const RELATIONSHIP_PATTERNS_QUERY: &str = "MATCH (a)-[r]->(b) \
     WITH labels(a) AS start_labels, type(r) AS rel_type, labels(b) AS end_labels \
     LIMIT $sample \
     UNWIND start_labels AS start_label \
     UNWIND end_labels AS end_label \
     RETURN DISTINCT start_label, rel_type, end_label";

/// Row cap for introspection queries. A schema larger than this is refused
/// rather than described in part.
pub const INTROSPECTION_ROW_CAP: usize = 10_000;

/// Property name to reported type
pub type PropertyMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipPattern {
    pub start: String,
    pub rel_type: String,
    pub end: String,
}

impl fmt::Display for RelationshipPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(:{})-[:{}]->(:{})", self.start, self.rel_type, self.end)
    }
}

/// Immutable snapshot of labels, relationship types and their properties.
///
/// Maps are ordered so that [`SchemaDescription::to_prompt_text`] is byte-stable
/// for an unchanged store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub node_labels: BTreeMap<String, PropertyMap>,
    pub relationship_types: BTreeMap<String, PropertyMap>,
    pub patterns: BTreeSet<RelationshipPattern>,
}

impl SchemaDescription {
    pub fn is_empty(&self) -> bool {
        self.node_labels.is_empty() && self.relationship_types.is_empty() && self.patterns.is_empty()
    }

    /// Keep only the listed types when `include` is non-empty, otherwise drop the
    /// `exclude`d ones. A pattern survives only if all three of its names do.
    pub fn filtered(&self, include: &[String], exclude: &[String]) -> SchemaDescription {
        let keep = |name: &str| -> bool {
            if include.is_empty() {
                !exclude.iter().any(|e| e == name)
            } else {
                include.iter().any(|i| i == name)
            }
        };

        SchemaDescription {
            node_labels: self
                .node_labels
                .iter()
                .filter(|(label, _)| keep(label))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            relationship_types: self
                .relationship_types
                .iter()
                .filter(|(rel, _)| keep(rel))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            patterns: self
                .patterns
                .iter()
                .filter(|p| keep(&p.start) && keep(&p.rel_type) && keep(&p.end))
                .cloned()
                .collect(),
        }
    }

    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();

        out.push_str("Node properties:\n");
        write_property_section(&mut out, &self.node_labels);

        out.push_str("Relationship properties:\n");
        write_property_section(&mut out, &self.relationship_types);

        out.push_str("The relationships:\n");
        if self.patterns.is_empty() {
            out.push_str("(none)\n");
        } else {
            for pattern in &self.patterns {
                out.push_str(&pattern.to_string());
                out.push('\n');
            }
        }

        out.trim_end().to_string()
    }
}

fn write_property_section(out: &mut String, entries: &BTreeMap<String, PropertyMap>) {
    if entries.is_empty() {
        out.push_str("(none)\n");
        return;
    }
    for (name, props) in entries {
        out.push_str(name);
        if !props.is_empty() {
            let rendered: Vec<String> = props
                .iter()
                .map(|(prop, ty)| format!("{}: {}", prop, ty))
                .collect();
            out.push_str(" {");
            out.push_str(&rendered.join(", "));
            out.push('}');
        }
        out.push('\n');
    }
}

/// Reads the live schema from a [`GraphStore`].
pub struct SchemaDescriber {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
    relationship_sample: u64,
    row_cap: usize,
    include_types: Vec<String>,
    exclude_types: Vec<String>,
}

impl SchemaDescriber {
    pub fn new(store: Arc<dyn GraphStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            relationship_sample: 1000,
            row_cap: INTROSPECTION_ROW_CAP,
            include_types: Vec::new(),
            exclude_types: Vec::new(),
        }
    }

    pub fn with_relationship_sample(mut self, sample: u64) -> Self {
        self.relationship_sample = sample;
        self
    }

    pub fn with_row_cap(mut self, row_cap: usize) -> Self {
        self.row_cap = row_cap;
        self
    }

    pub fn with_type_filter(mut self, include: Vec<String>, exclude: Vec<String>) -> Self {
        self.include_types = include;
        self.exclude_types = exclude;
        self
    }

    /// An empty graph yields an empty description. An unreachable store is a
    /// connectivity error.
    pub async fn describe(&self) -> QaResult<SchemaDescription> {
        let no_params = QueryParams::new();

        let node_rows = self.run(NODE_PROPERTIES_QUERY, &no_params).await?;
        let rel_rows = self.run(REL_PROPERTIES_QUERY, &no_params).await?;

        let mut sample_params = Map::new();
        sample_params.insert("sample".to_string(), json!(self.relationship_sample));
        let pattern_rows = self.run(RELATIONSHIP_PATTERNS_QUERY, &sample_params).await?;

        let mut description = SchemaDescription {
            node_labels: parse_node_properties(&node_rows),
            relationship_types: parse_rel_properties(&rel_rows),
            patterns: parse_patterns(&pattern_rows),
        };

        // Types seen only through patterns still belong in the snapshot.
        for pattern in &description.patterns {
            description
                .node_labels
                .entry(pattern.start.clone())
                .or_default();
            description
                .node_labels
                .entry(pattern.end.clone())
                .or_default();
            description
                .relationship_types
                .entry(pattern.rel_type.clone())
                .or_default();
        }

        let description = description.filtered(&self.include_types, &self.exclude_types);
        info!(
            "Schema loaded: {} labels, {} relationship types, {} patterns",
            description.node_labels.len(),
            description.relationship_types.len(),
            description.patterns.len()
        );
        Ok(description)
    }

    async fn run(&self, statement: &str, params: &QueryParams) -> Result<Vec<Record>, StoreError> {
        debug!("Schema introspection: {}", statement);
        let batch = tokio::time::timeout(
            self.timeout,
            self.store.query(statement, params, self.row_cap),
        )
        .await
        .map_err(|_| StoreError::Timeout {
            after_ms: self.timeout.as_millis() as u64,
        })??;
        if batch.truncated {
            warn!("Schema introspection returned more than {} rows", self.row_cap);
            return Err(StoreError::ResourceExceeded(format!(
                "schema introspection returned more than {} rows",
                self.row_cap
            )));
        }
        Ok(batch.records)
    }
}

fn string_field(record: &Record, key: &str) -> Option<String> {
    match record.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn types_field(record: &Record) -> String {
    match record.get("propertyTypes") {
        Some(Value::Array(types)) => {
            let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
            if names.is_empty() {
                "Any".to_string()
            } else {
                names.join("|")
            }
        }
        Some(Value::String(s)) => s.clone(),
        _ => "Any".to_string(),
    }
}

/// `relType` is reported as ``:`TYPE` ``.
fn clean_rel_type(raw: &str) -> String {
    raw.trim_start_matches(':').trim_matches('`').to_string()
}

pub fn parse_node_properties(records: &[Record]) -> BTreeMap<String, PropertyMap> {
    let mut labels: BTreeMap<String, PropertyMap> = BTreeMap::new();
    for record in records {
        let Some(Value::Array(node_labels)) = record.get("nodeLabels") else {
            continue;
        };
        let property = string_field(record, "propertyName");
        for label in node_labels.iter().filter_map(Value::as_str) {
            let props = labels.entry(label.to_string()).or_default();
            if let Some(name) = &property {
                props.insert(name.clone(), types_field(record));
            }
        }
    }
    labels
}

pub fn parse_rel_properties(records: &[Record]) -> BTreeMap<String, PropertyMap> {
    let mut types: BTreeMap<String, PropertyMap> = BTreeMap::new();
    for record in records {
        let Some(raw) = string_field(record, "relType") else {
            continue;
        };
        let props = types.entry(clean_rel_type(&raw)).or_default();
        if let Some(name) = string_field(record, "propertyName") {
            props.insert(name, types_field(record));
        }
    }
    types
}

pub fn parse_patterns(records: &[Record]) -> BTreeSet<RelationshipPattern> {
    records
        .iter()
        .filter_map(|record| {
            Some(RelationshipPattern {
                start: string_field(record, "start_label")?,
                rel_type: string_field(record, "rel_type")?,
                end: string_field(record, "end_label")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QaError;
    use crate::testing::FakeGraphStore;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn sample() -> SchemaDescription {
        let nodes = vec![
            record(json!({"nodeLabels": ["Dashboard"], "propertyName": "name", "propertyTypes": ["String"]})),
            record(json!({"nodeLabels": ["NotificationEmailScript"], "propertyName": "name", "propertyTypes": ["String"]})),
            record(json!({"nodeLabels": ["Dashboard"], "propertyName": "order", "propertyTypes": ["Long"]})),
            record(json!({"nodeLabels": ["TransformMap"], "propertyName": null, "propertyTypes": null})),
        ];
        let rels = vec![record(
            json!({"relType": ":`HAS_WIDGET`", "propertyName": "position", "propertyTypes": ["Long"]}),
        )];
        let patterns = vec![record(
            json!({"start_label": "Dashboard", "rel_type": "HAS_WIDGET", "end_label": "Widget"}),
        )];
        SchemaDescription {
            node_labels: parse_node_properties(&nodes),
            relationship_types: parse_rel_properties(&rels),
            patterns: parse_patterns(&patterns),
        }
    }

    #[test]
    fn prompt_text_is_sorted_and_stable() {
        let schema = sample();
        let text = schema.to_prompt_text();
        assert_eq!(
            text,
            "Node properties:\n\
             Dashboard {name: String, order: Long}\n\
             NotificationEmailScript {name: String}\n\
             TransformMap\n\
             Relationship properties:\n\
             HAS_WIDGET {position: Long}\n\
             The relationships:\n\
             (:Dashboard)-[:HAS_WIDGET]->(:Widget)"
        );
        assert_eq!(text, sample().to_prompt_text());
    }

    #[test]
    fn empty_schema_renders_placeholders() {
        let schema = SchemaDescription::default();
        assert!(schema.is_empty());
        assert_eq!(
            schema.to_prompt_text(),
            "Node properties:\n(none)\nRelationship properties:\n(none)\nThe relationships:\n(none)"
        );
    }

    #[test]
    fn filtering_follows_include_then_exclude() {
        let schema = sample();
        let only = schema.filtered(&["Dashboard".to_string()], &[]);
        assert_eq!(only.node_labels.len(), 1);
        assert!(only.patterns.is_empty());

        let without = schema.filtered(&[], &["TransformMap".to_string()]);
        assert!(!without.node_labels.contains_key("TransformMap"));
        assert_eq!(without.patterns.len(), 1);
    }

    #[tokio::test]
    async fn oversized_schema_is_refused_not_cut() {
        let store = Arc::new(
            FakeGraphStore::new()
                .with_node_label("Dashboard", &[("name", "String")])
                .with_node_label("Incident", &[("number", "String")])
                .with_node_label("Widget", &[]),
        );
        let describer = SchemaDescriber::new(store.clone(), Duration::from_secs(1)).with_row_cap(2);
        match describer.describe().await {
            Err(QaError::Store(StoreError::ResourceExceeded(message))) => {
                assert!(message.contains("more than 2 rows"))
            }
            other => panic!("unexpected {:?}", other),
        }

        let describer = SchemaDescriber::new(store, Duration::from_secs(1)).with_row_cap(3);
        assert_eq!(describer.describe().await.unwrap().node_labels.len(), 3);
    }

    #[test]
    fn rel_type_markup_is_stripped() {
        assert_eq!(clean_rel_type(":`WORKS_AT`"), "WORKS_AT");
        assert_eq!(clean_rel_type("KNOWS"), "KNOWS");
    }
}
