use anyhow::Result;
use serde_json::Value;

use crate::graph::Graph;

/// JSON form of a graph. Constant payloads are not part of it.
pub struct GraphSerialize;

impl GraphSerialize {
    pub fn json(graph: &Graph) -> Result<Value> {
        Ok(serde_json::to_value(graph)?)
    }

    pub fn json_bytes(graph: &Graph) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(graph)?)
    }
}

pub struct GraphDeserialize;

impl GraphDeserialize {
    pub fn from_json(value: Value) -> Result<Graph> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Graph> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
