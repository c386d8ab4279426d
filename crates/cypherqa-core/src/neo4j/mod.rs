//! Neo4j-backed graph store
//!
//! The store is reached over Bolt through `neo4rs`. Statements run in an
//! explicit transaction that is always rolled back, since nothing executed
//! through this layer is meant to write.

pub mod client;
pub mod convert;

pub use client::Neo4jStore;
pub use convert::{json_to_bolt_type, row_to_record};
