use std::sync::Arc;

use anyhow::Result;
use openrt::{
    compile, engines, CompileOptions, DType, Engine, EngineBuilder, EngineKind, Graph, OpAttrs,
    OpKind, Tensor, TensorDesc, TraceEventKind,
};

use crate::common;

fn relu_then_sigmoid() -> Result<Graph> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[4, 8], DType::F32));
    let r = g.add_edge("r");
    let y = g.add_edge("y");
    g.add_node(OpKind::Relu, "relu", &[x], &[r], OpAttrs::none())?;
    g.add_node(OpKind::Sigmoid, "sig", &[r], &[y], OpAttrs::none())?;
    g.mark_output(y)?;
    Ok(g)
}

#[test]
fn async_producer_is_joined_before_transfer() -> Result<()> {
    let relu_unit: Arc<dyn Engine> = Arc::new(
        EngineBuilder::new("npu")
            .kind(EngineKind::Accel)
            .ops(&[OpKind::Relu])
            .build_async(),
    );
    let mut plan = compile(
        &relu_then_sigmoid()?,
        &[relu_unit, engines::x86()],
        CompileOptions::default().with_trace(),
    )?;

    let x: Vec<f32> = (0..32).map(|i| i as f32 - 16.0).collect();
    let outputs = plan.run(&common::feed(vec![(
        "x",
        Tensor::from_vec_with_shape(x.clone(), vec![4, 8])?.into(),
    )]))?;
    let expected: Vec<f32> = x
        .iter()
        .map(|v| 1.0 / (1.0 + (-v.max(0.0)).exp()))
        .collect();
    common::assert_close(&common::f32_values(outputs.get("y")?)?, &expected, 1e-6)?;

    let kinds: Vec<TraceEventKind> = plan.trace_events().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TraceEventKind::OpExecute,
            TraceEventKind::Sync,
            TraceEventKind::Transfer,
            TraceEventKind::OpExecute,
        ]
    );
    let events = plan.trace_events();
    assert_eq!(events[0].engine, "npu");
    assert_eq!(events[1].engine, "npu");
    assert_eq!(events[2].engine, "x86");
    assert!(events[3].kernel.starts_with("x86.sigmoid.f32"));
    Ok(())
}

#[test]
fn accel_results_match_cpu() -> Result<()> {
    let graph = relu_then_sigmoid()?;
    let x: Vec<f32> = (0..32).map(|i| (i as f32 * 0.37).sin() * 4.0).collect();
    let mut results = Vec::new();
    for engine in [engines::accel(), engines::x86()] {
        let mut plan = compile(&graph, &[engine], CompileOptions::default())?;
        let outputs = plan.run(&common::feed(vec![(
            "x",
            Tensor::from_vec_with_shape(x.clone(), vec![4, 8])?.into(),
        )]))?;
        results.push(common::f32_values(outputs.get("y")?)?);
    }
    assert_eq!(results[0], results[1]);
    Ok(())
}

#[test]
fn trace_is_off_by_default() -> Result<()> {
    let mut plan = compile(&relu_then_sigmoid()?, &common::test_engines(), CompileOptions::default())?;
    plan.run(&common::feed(vec![("x", Tensor::from_vec_with_shape(vec![0.5f32; 32], vec![4, 8])?.into())]))?;
    assert!(plan.trace_events().is_empty());
    Ok(())
}
