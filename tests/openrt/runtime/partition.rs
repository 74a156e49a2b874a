use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use openrt::{
    compile, engines, ret_code, CompileOptions, CpuEngine, DType, Engine, Graph, GraphSerialize,
    OpAttrs, OpKind, PartitionMode, RetCode, TensorDesc, TensorValue,
};

use crate::common;

fn add_relu_add() -> Result<Graph> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[2, 3], DType::F32));
    let y = g.add_input("y", TensorDesc::new(&[2, 3], DType::F32));
    let s = g.add_edge("s");
    let r = g.add_edge("r");
    let out = g.add_edge("out");
    g.add_node(OpKind::Add, "add0", &[x, y], &[s], OpAttrs::none())?;
    g.add_node(OpKind::Relu, "relu", &[s], &[r], OpAttrs::none())?;
    g.add_node(OpKind::Add, "add1", &[r, y], &[out], OpAttrs::none())?;
    g.mark_output(out)?;
    Ok(g)
}

fn split_engines() -> Vec<Arc<dyn Engine>> {
    vec![
        Arc::new(CpuEngine::builder("adder").ops(&[OpKind::Add]).build()),
        Arc::new(CpuEngine::builder("rectifier").ops(&[OpKind::Relu]).build()),
    ]
}

#[test]
fn disjoint_engines_get_transfers_between_them() -> Result<()> {
    let graph = add_relu_add()?;
    let mut plan = compile(&graph, &split_engines(), CompileOptions::default())?;
    let optimized = plan.graph();

    let position: HashMap<_, _> = plan
        .order()
        .iter()
        .enumerate()
        .map(|(pos, id)| (*id, pos))
        .collect();
    let transfers: Vec<_> = optimized
        .nodes()
        .filter(|n| n.kind == OpKind::Transfer)
        .collect();
    assert_eq!(transfers.len(), 2);
    for transfer in &transfers {
        let src = optimized.edge(transfer.inputs[0])?;
        let dst = optimized.edge(transfer.outputs[0])?;
        let producer = src.producer.ok_or_else(|| anyhow!("transfer reads an input"))?;
        assert!(position[&producer] < position[&transfer.id]);
        for consumer in &dst.consumers {
            assert!(position[&transfer.id] < position[consumer]);
            assert_eq!(plan.engine_of(*consumer), plan.engine_of(transfer.id));
        }
        assert_ne!(plan.engine_of(producer), plan.engine_of(transfer.id));
    }
    for name in ["add0", "add1"] {
        let id = optimized.find_node(name).ok_or_else(|| anyhow!("{}", name))?;
        assert_eq!(plan.engine_of(id), Some("adder"));
    }

    let x = vec![-3.0f32, -1.0, 0.0, 1.0, 2.0, 3.0];
    let y = vec![1.0f32, 0.5, -0.5, -2.0, 0.25, 1.0];
    let outputs = plan.run(&common::feed(vec![
        ("x", TensorValue::from(openrt::Tensor::from_vec_with_shape(x.clone(), vec![2, 3])?)),
        ("y", TensorValue::from(openrt::Tensor::from_vec_with_shape(y.clone(), vec![2, 3])?)),
    ]))?;
    let expected: Vec<f32> = x
        .iter()
        .zip(&y)
        .map(|(a, b)| (a + b).max(0.0) + b)
        .collect();
    common::assert_close(&common::f32_values(outputs.get("out")?)?, &expected, 0.0)?;
    Ok(())
}

#[test]
fn unsupported_op_fails_and_keeps_graph() -> Result<()> {
    let graph = add_relu_add()?;
    let before = GraphSerialize::json(&graph)?;
    let relu_only: Vec<Arc<dyn Engine>> =
        vec![Arc::new(CpuEngine::builder("rectifier").ops(&[OpKind::Relu]).build())];

    let err = compile(&graph, &relu_only, CompileOptions::default())
        .err()
        .ok_or_else(|| anyhow!("add has no engine"))?;
    assert_eq!(ret_code(&err), Some(RetCode::Unsupported));
    assert_eq!(
        openrt::failed_node(&err),
        graph.find_node("add0"),
    );
    assert_eq!(GraphSerialize::json(&graph)?, before);
    Ok(())
}

#[test]
fn dtype_without_kernel_is_unsupported() -> Result<()> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[4], DType::I32));
    let y = g.add_edge("y");
    g.add_node(OpKind::Sigmoid, "sig", &[x], &[y], OpAttrs::none())?;
    g.mark_output(y)?;
    let err = compile(&g, &[engines::x86(), engines::accel()], CompileOptions::default())
        .err()
        .ok_or_else(|| anyhow!("sigmoid on i32 compiled"))?;
    assert_eq!(ret_code(&err), Some(RetCode::Unsupported));
    Ok(())
}

#[test]
fn affinity_keeps_chains_on_one_engine() -> Result<()> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[8], DType::F32));
    let a = g.add_edge("a");
    let b = g.add_edge("b");
    g.add_node(OpKind::Sigmoid, "sig", &[x], &[a], OpAttrs::none())?;
    g.add_node(OpKind::Relu, "relu", &[a], &[b], OpAttrs::none())?;
    g.mark_output(b)?;

    let engines: Vec<Arc<dyn Engine>> = vec![
        Arc::new(CpuEngine::builder("first").ops(&[OpKind::Relu]).build()),
        Arc::new(CpuEngine::builder("second").build()),
    ];
    let priority = compile(&g, &engines, CompileOptions::default())?;
    let affinity = compile(
        &g,
        &engines,
        CompileOptions::default().with_partition(PartitionMode::Affinity),
    )?;
    let relu = |plan: &openrt::ExecutionPlan| -> Result<String> {
        let id = plan.graph().find_node("relu").ok_or_else(|| anyhow!("relu"))?;
        Ok(plan.engine_of(id).unwrap_or_default().to_string())
    };
    assert_eq!(relu(&priority)?, "first");
    assert_eq!(relu(&affinity)?, "second");
    let count = |plan: &openrt::ExecutionPlan| {
        plan.graph()
            .nodes()
            .filter(|n| n.kind == OpKind::Transfer)
            .count()
    };
    assert_eq!(count(&priority), 1);
    assert_eq!(count(&affinity), 0);
    Ok(())
}
