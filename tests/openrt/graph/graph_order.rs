use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use openrt::{
    compile, CompileOptions, DType, Engine, EngineBuilder, Graph, GraphSerialize, OpAttrs,
    OpKind, Tensor, TensorDesc,
};

use crate::common;

fn diamond() -> Result<Graph> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[2, 8], DType::F32));
    let a = g.add_edge("a");
    let b = g.add_edge("b");
    let c = g.add_edge("c");
    let out = g.add_edge("out");
    g.add_node(OpKind::Relu, "left", &[x], &[a], OpAttrs::none())?;
    g.add_node(OpKind::Sigmoid, "right", &[x], &[b], OpAttrs::none())?;
    g.add_node(OpKind::Mul, "join", &[a, b], &[c], OpAttrs::none())?;
    g.add_node(OpKind::Add, "skip", &[c, x], &[out], OpAttrs::none())?;
    g.mark_output(out)?;
    Ok(g)
}

#[test]
fn order_respects_every_edge() -> Result<()> {
    let relu_only = Arc::new(EngineBuilder::new("relu_unit").ops(&[OpKind::Relu]).build());
    let mut engines = vec![relu_only as Arc<dyn Engine>];
    engines.extend(common::test_engines());
    let plan = compile(&diamond()?, &engines, CompileOptions::default())?;
    let graph = plan.graph();

    let position: HashMap<_, _> = plan
        .order()
        .iter()
        .enumerate()
        .map(|(pos, id)| (*id, pos))
        .collect();
    assert_eq!(position.len(), graph.node_count());
    for node in graph.nodes() {
        for edge in &node.inputs {
            if let Some(producer) = graph.edge(*edge)?.producer {
                let before = position
                    .get(&producer)
                    .ok_or_else(|| anyhow!("{} missing from order", producer))?;
                assert!(*before < position[&node.id], "{} runs before its input", node.name);
            }
        }
    }

    let left = graph.find_node("left").ok_or_else(|| anyhow!("left"))?;
    assert_eq!(plan.engine_of(left), Some("relu_unit"));
    let transfers = graph.nodes().filter(|n| n.kind == OpKind::Transfer).count();
    assert!(transfers >= 1);
    Ok(())
}

#[test]
fn compile_leaves_caller_graph_alone() -> Result<()> {
    let graph = diamond()?;
    let before = GraphSerialize::json(&graph)?;
    let mut plan = compile(&graph, &common::test_engines(), CompileOptions::default())?;
    assert_eq!(GraphSerialize::json(&graph)?, before);

    let x: Vec<f32> = (0..16).map(|i| i as f32 / 4.0 - 2.0).collect();
    let outputs = plan.run(&common::feed(vec![(
        "x",
        Tensor::from_vec_with_shape(x.clone(), vec![2, 8])?.into(),
    )]))?;
    let expected: Vec<f32> = x
        .iter()
        .map(|v| v.max(0.0) * (1.0 / (1.0 + (-v).exp())) + v)
        .collect();
    common::assert_close(&common::f32_values(outputs.get("out")?)?, &expected, 1e-5)?;
    Ok(())
}
