use neo4rs::{BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltString, BoltType, Row};
use serde_json::Value;

use crate::error::StoreError;
use crate::types::Record;

/// Convert a JSON parameter into its Bolt counterpart.
pub fn json_to_bolt_type(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(Default::default()),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::Integer(BoltInteger::new(i))
            } else {
                BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        Value::String(s) => BoltType::String(BoltString::from(s.as_str())),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(json_to_bolt_type(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt_map = BoltMap::new();
            for (key, item) in map {
                bolt_map.put(BoltString::from(key.as_str()), json_to_bolt_type(item));
            }
            BoltType::Map(bolt_map)
        }
    }
}

/// Columns keep the order the statement returned them in.
pub fn row_to_record(row: &Row) -> Result<Record, StoreError> {
    match row.to::<Value>() {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Failed(format!(
            "expected a record, got {}",
            other
        ))),
        Err(e) => Err(StoreError::Failed(format!(
            "Failed to convert row to JSON: {}",
            e
        ))),
    }
}
