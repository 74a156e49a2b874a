//! JSON model descriptions.
//!
//! ```json
//! {
//!   "inputs":    [{ "name": "x", "dtype": "f32", "dims": [1, 3, 8] }],
//!   "constants": [{ "name": "g", "dtype": "f32", "dims": [8], "values": [1, 1, 1, 1, 1, 1, 1, 1] }],
//!   "nodes":     [{ "op": "layer_norm", "name": "ln", "inputs": ["x", "g"], "outputs": ["y"],
//!                   "attrs": { "axis": -1 } }],
//!   "outputs":   ["y"]
//! }
//! ```
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{rt_error, with_code, RetCode};
use crate::graph::{AttrValue, EdgeId, Graph, OpAttrs, OpKind};
use crate::registry::{op_def, OpAttrDef, OpAttrType, ScalarAttrKind};
use crate::tensor::{DType, TensorDesc, TensorElement};

#[derive(Debug, Deserialize)]
struct TensorDecl {
    name: String,
    dtype: String,
    dims: Vec<usize>,
    #[serde(default)]
    values: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct NodeDecl {
    op: String,
    #[serde(default)]
    name: Option<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    #[serde(default)]
    attrs: Map<String, Value>,
    #[serde(default)]
    dtype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelDecl {
    inputs: Vec<TensorDecl>,
    #[serde(default)]
    constants: Vec<TensorDecl>,
    nodes: Vec<NodeDecl>,
    outputs: Vec<String>,
}

/// Builds a [`Graph`] from a JSON model description.
pub struct ModelLoader;

impl ModelLoader {
    pub fn from_json_str(text: &str) -> Result<Graph> {
        let decl: ModelDecl = serde_json::from_str(text)
            .map_err(|err| rt_error(RetCode::InvalidGraph, format!("model json: {}", err)))?;
        build(decl).map_err(|err| with_code(err, RetCode::InvalidGraph))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Graph> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read model {}", path.display()))?;
        Self::from_json_str(&text)
    }
}

fn build(decl: ModelDecl) -> Result<Graph> {
    let mut graph = Graph::new();
    let mut edges: HashMap<String, EdgeId> = HashMap::new();
    for input in &decl.inputs {
        let dtype = DType::from_ident(&input.dtype)?;
        let id = graph.add_input(input.name.clone(), TensorDesc::new(&input.dims, dtype));
        declare(&mut edges, &input.name, id)?;
    }
    for constant in &decl.constants {
        let dtype = DType::from_ident(&constant.dtype)?;
        let bytes = constant_bytes(dtype, &constant.values)
            .with_context(|| format!("constant {}", constant.name))?;
        let id = graph.add_constant(
            constant.name.clone(),
            TensorDesc::new(&constant.dims, dtype),
            bytes,
        )?;
        declare(&mut edges, &constant.name, id)?;
    }
    for (index, node) in decl.nodes.iter().enumerate() {
        let kind = OpKind::from_name(&node.op)?;
        let name = node
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", kind, index));
        let inputs: Vec<EdgeId> = node
            .inputs
            .iter()
            .map(|n| edge_named(&mut graph, &mut edges, n))
            .collect();
        let outputs: Vec<EdgeId> = node
            .outputs
            .iter()
            .map(|n| edge_named(&mut graph, &mut edges, n))
            .collect();
        let attrs = convert_attrs(kind, &node.attrs).with_context(|| format!("node {}", name))?;
        let id = graph.add_node(kind, name, &inputs, &outputs, attrs)?;
        if let Some(dtype) = &node.dtype {
            graph.set_forced_dtype(id, DType::from_ident(dtype)?)?;
        }
    }
    for name in &decl.outputs {
        let id = edges
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("output {} is never produced", name))?;
        graph.mark_output(id)?;
    }
    graph.validate()?;
    crate::trace!(
        "model: {} inputs, {} constants, {} nodes",
        decl.inputs.len(),
        decl.constants.len(),
        graph.node_count()
    );
    Ok(graph)
}

fn declare(edges: &mut HashMap<String, EdgeId>, name: &str, id: EdgeId) -> Result<()> {
    if edges.insert(name.to_string(), id).is_some() {
        return Err(anyhow!("duplicate tensor name {}", name));
    }
    Ok(())
}

/// Existing edge called `name`, or a new internal edge a node will produce.
fn edge_named(graph: &mut Graph, edges: &mut HashMap<String, EdgeId>, name: &str) -> EdgeId {
    *edges
        .entry(name.to_string())
        .or_insert_with(|| graph.add_edge(name))
}

fn constant_bytes(dtype: DType, values: &[Value]) -> Result<Vec<u8>> {
    fn typed<T: TensorElement>(values: &[Value]) -> Result<Vec<u8>> {
        let data = values
            .iter()
            .map(|v| {
                let x = v
                    .as_f64()
                    .ok_or_else(|| anyhow!("expected a number, got {}", v))?;
                Ok(T::from_f64(x))
            })
            .collect::<Result<Vec<T>>>()?;
        Ok(bytemuck::cast_slice(&data).to_vec())
    }
    fn integers<T: TensorElement + TryFrom<i64>>(values: &[Value]) -> Result<Vec<u8>> {
        let data = values
            .iter()
            .map(|v| {
                v.as_i64()
                    .and_then(|x| T::try_from(x).ok())
                    .ok_or_else(|| anyhow!("{} does not fit {}", v, T::DTYPE))
            })
            .collect::<Result<Vec<T>>>()?;
        Ok(bytemuck::cast_slice(&data).to_vec())
    }
    match dtype {
        DType::F32 => typed::<f32>(values),
        DType::F64 => typed::<f64>(values),
        DType::I32 => integers::<i32>(values),
        DType::I64 => integers::<i64>(values),
        DType::U8 => integers::<u8>(values),
    }
}

fn convert_attrs(kind: OpKind, attrs: &Map<String, Value>) -> Result<OpAttrs> {
    let def = op_def(kind)?;
    let mut out = OpAttrs::none();
    for (name, value) in attrs {
        let attr_def = def
            .attrs
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| anyhow!("{} does not take attribute {}", kind, name))?;
        out.set(name, convert_attr(attr_def, value)?);
    }
    Ok(out)
}

fn convert_attr(def: &OpAttrDef, value: &Value) -> Result<AttrValue> {
    let bad = || anyhow!("attribute {} cannot take {}", def.name, value);
    let converted = match def.kind {
        OpAttrType::Scalar => match value {
            Value::Bool(b) => AttrValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttrValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    AttrValue::UInt(u)
                } else if def.scalar_kinds.contains(&ScalarAttrKind::Float) {
                    AttrValue::Double(n.as_f64().ok_or_else(bad)?)
                } else {
                    return Err(bad());
                }
            }
            _ => return Err(bad()),
        },
        OpAttrType::DType => AttrValue::DType(DType::from_ident(value.as_str().ok_or_else(bad)?)?),
        OpAttrType::Layout => AttrValue::Layout(value.as_str().ok_or_else(bad)?.parse()?),
        OpAttrType::String => AttrValue::Str(value.as_str().ok_or_else(bad)?.to_string()),
        OpAttrType::IntList => match value {
            Value::Array(items) => AttrValue::IntList(
                items
                    .iter()
                    .map(|v| v.as_i64().ok_or_else(bad))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Number(n) => AttrValue::IntList(vec![n.as_i64().ok_or_else(bad)?]),
            _ => return Err(bad()),
        },
    };
    def.accepts(&converted)?;
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ret_code;

    #[test]
    fn builds_graph_with_constants_and_attrs() -> Result<()> {
        let graph = ModelLoader::from_json_str(
            r#"{
                "inputs": [{ "name": "x", "dtype": "f32", "dims": [2, 4] }],
                "constants": [{ "name": "g", "dtype": "f32", "dims": [4], "values": [1, 2, 3, 4] }],
                "nodes": [
                    { "op": "layer_norm", "name": "ln", "inputs": ["x", "g"], "outputs": ["y"],
                      "attrs": { "axis": -1, "epsilon": 0.001 } }
                ],
                "outputs": ["y"]
            }"#,
        )?;
        let ln = graph.find_node("ln").ok_or_else(|| anyhow!("missing ln"))?;
        let node = graph.node(ln)?;
        assert_eq!(node.attrs.int("axis")?, Some(-1));
        assert_eq!(node.attrs.float("epsilon")?, Some(0.001));
        let g = graph.find_edge("g").ok_or_else(|| anyhow!("missing g"))?;
        assert_eq!(graph.edge(g)?.data.as_ref().map(|d| d.len()), Some(16));
        Ok(())
    }

    #[test]
    fn unknown_attribute_is_invalid_graph() {
        let err = ModelLoader::from_json_str(
            r#"{
                "inputs": [{ "name": "x", "dtype": "f32", "dims": [4] }],
                "nodes": [{ "op": "relu", "inputs": ["x"], "outputs": ["y"], "attrs": { "axis": 0 } }],
                "outputs": ["y"]
            }"#,
        )
        .unwrap_err();
        assert_eq!(ret_code(&err), Some(RetCode::InvalidGraph));
    }

    #[test]
    fn dangling_input_is_invalid_graph() {
        let err = ModelLoader::from_json_str(
            r#"{
                "inputs": [],
                "nodes": [{ "op": "relu", "inputs": ["ghost"], "outputs": ["y"] }],
                "outputs": ["y"]
            }"#,
        )
        .unwrap_err();
        assert_eq!(ret_code(&err), Some(RetCode::InvalidGraph));
    }
}
