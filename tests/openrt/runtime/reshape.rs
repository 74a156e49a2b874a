use anyhow::{anyhow, Result};
use openrt::{
    compile, engines, ret_code, AttrValue, CompileOptions, DType, Graph, OpAttrs, OpKind, RetCode,
    RunState, Tensor, TensorDesc,
};

use crate::common;

fn squeeze_transpose_norm(batch: usize) -> Result<Graph> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[batch, 3, 1, 8], DType::F32));
    let s = g.add_edge("s");
    let t = g.add_edge("t");
    let y = g.add_edge("y");
    g.add_node(
        OpKind::Squeeze,
        "squeeze",
        &[x],
        &[s],
        OpAttrs::none().with("axes", AttrValue::IntList(vec![2])),
    )?;
    g.add_node(
        OpKind::Transpose,
        "transpose",
        &[s],
        &[t],
        OpAttrs::none().with("perm", AttrValue::IntList(vec![0, 2, 1])),
    )?;
    g.add_node(
        OpKind::LayerNorm,
        "norm",
        &[t],
        &[y],
        OpAttrs::none().with("axis", AttrValue::Int(-1)),
    )?;
    g.mark_output(y)?;
    Ok(g)
}

/// x[n, c, 0, s] = c + 0.5 * s
fn ramp(batch: usize) -> Result<Tensor<f32>> {
    let mut data = Vec::with_capacity(batch * 3 * 8);
    for _ in 0..batch {
        for c in 0..3 {
            for s in 0..8 {
                data.push(c as f32 + 0.5 * s as f32);
            }
        }
    }
    Tensor::from_vec_with_shape(data, vec![batch, 3, 1, 8])
}

fn expected_rows(rows: usize) -> Vec<f32> {
    (0..rows).flat_map(|_| [-1.224_735f32, 0.0, 1.224_735]).collect()
}

#[test]
fn new_batch_reinfers_without_repartition() -> Result<()> {
    let graph = squeeze_transpose_norm(1)?;
    let mut plan = compile(&graph, &[engines::x86()], CompileOptions::default())?;

    let outputs = plan.run(&common::feed(vec![("x", ramp(1)?.into())]))?;
    let y = outputs.fetch::<Tensor<f32>>("y")?;
    assert_eq!(y.shape(), &[1, 8, 3]);
    common::assert_close(&y.data, &expected_rows(8), 1e-4)?;
    assert_eq!(plan.stats().reinferences, 0);

    let outputs = plan.run(&common::feed(vec![("x", ramp(2)?.into())]))?;
    let y = outputs.fetch::<Tensor<f32>>("y")?;
    assert_eq!(y.shape(), &[2, 8, 3]);
    common::assert_close(&y.data, &expected_rows(16), 1e-4)?;

    let stats = plan.stats();
    assert_eq!(stats.runs, 2);
    assert_eq!(stats.reinferences, 1);
    assert_eq!(stats.repartitions, 0);
    assert_eq!(stats.memory_replans, 1);
    assert_eq!(plan.state(), RunState::Completed);

    // Back to the first shape fits the grown buffers.
    plan.run(&common::feed(vec![("x", ramp(1)?.into())]))?;
    assert_eq!(plan.stats().reinferences, 2);
    assert_eq!(plan.stats().memory_replans, 1);
    Ok(())
}

#[test]
fn lost_rank_specialisation_rebuilds_plan() -> Result<()> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[2, 1, 8], DType::F32));
    let s = g.add_edge("s");
    let y = g.add_edge("y");
    g.add_node(OpKind::Squeeze, "squeeze", &[x], &[s], OpAttrs::none())?;
    g.add_node(OpKind::LayerNorm, "norm", &[s], &[y], OpAttrs::none())?;
    g.mark_output(y)?;

    let mut plan = compile(
        &g,
        &[engines::accel(), engines::x86()],
        CompileOptions::default(),
    )?;
    let norm_engine = |plan: &openrt::ExecutionPlan| -> Result<String> {
        let id = plan.graph().find_node("norm").ok_or_else(|| anyhow!("norm"))?;
        Ok(plan.engine_of(id).unwrap_or_default().to_string())
    };
    assert_eq!(norm_engine(&plan)?, "accel");

    let row: Vec<f32> = (0..8).map(|i| (i * i) as f32 * 0.1).collect();
    let two = Tensor::from_vec_with_shape([row.clone(), row.clone()].concat(), vec![2, 1, 8])?;
    let outputs = plan.run(&common::feed(vec![("x", two.into())]))?;
    let y = outputs.fetch::<Tensor<f32>>("y")?;
    assert_eq!(y.shape(), &[2, 8]);

    let one = Tensor::from_vec_with_shape(row.clone(), vec![1, 1, 8])?;
    let outputs = plan.run(&common::feed(vec![("x", one.into())]))?;
    let y = outputs.fetch::<Tensor<f32>>("y")?;
    assert_eq!(y.shape(), &[8]);
    common::assert_close(&y.data, &common::layer_norm_rows(&row, 8), 1e-4)?;

    assert_eq!(norm_engine(&plan)?, "x86");
    assert_eq!(plan.stats().repartitions, 1);
    assert_eq!(plan.stats().runs, 2);
    assert_eq!(plan.state(), RunState::Completed);
    Ok(())
}

#[test]
fn rejected_shapes_leave_no_trace_in_later_rebuilds() -> Result<()> {
    let mut g = Graph::new();
    let a = g.add_input("a", TensorDesc::new(&[2, 1, 8], DType::F32));
    let b = g.add_input("b", TensorDesc::new(&[1, 3], DType::F32));
    let sa = g.add_edge("sa");
    let ya = g.add_edge("ya");
    let sb = g.add_edge("sb");
    let yb = g.add_edge("yb");
    g.add_node(OpKind::Squeeze, "squeeze_a", &[a], &[sa], OpAttrs::none())?;
    g.add_node(OpKind::LayerNorm, "norm", &[sa], &[ya], OpAttrs::none())?;
    g.add_node(
        OpKind::Squeeze,
        "squeeze_b",
        &[b],
        &[sb],
        OpAttrs::none().with("axes", AttrValue::IntList(vec![0])),
    )?;
    g.add_node(OpKind::Relu, "relu", &[sb], &[yb], OpAttrs::none())?;
    g.mark_output(ya)?;
    g.mark_output(yb)?;

    let mut plan = compile(
        &g,
        &[engines::accel(), engines::x86()],
        CompileOptions::default(),
    )?;
    let row: Vec<f32> = (0..8).map(|i| i as f32).collect();
    let feed = |batch: usize, b_rows: usize| -> Result<_> {
        Ok(common::feed(vec![
            (
                "a",
                Tensor::from_vec_with_shape(row.repeat(batch), vec![batch, 1, 8])?.into(),
            ),
            (
                "b",
                Tensor::from_vec_with_shape(vec![-1.0f32; 3 * b_rows], vec![b_rows, 3])?.into(),
            ),
        ]))
    };

    // Axis 0 of b is no longer 1.
    let err = plan
        .run(&feed(2, 2)?)
        .err()
        .ok_or_else(|| anyhow!("squeeze of a size-2 axis accepted"))?;
    assert_eq!(ret_code(&err), Some(RetCode::InvalidValue));
    assert_eq!(plan.stats().reinferences, 0);
    let b_desc = plan
        .source()
        .edge(b)?
        .desc
        .clone()
        .ok_or_else(|| anyhow!("b desc"))?;
    assert_eq!(b_desc.shape()?, vec![1, 3]);

    plan.run(&feed(2, 1)?)?;

    // Rank-1 layer norm has no accel kernel, so this run rebuilds from the
    // retained source graph.
    let outputs = plan.run(&feed(1, 1)?)?;
    assert_eq!(plan.stats().repartitions, 1);
    assert_eq!(plan.state(), RunState::Completed);
    common::assert_close(&common::f32_values(outputs.get("yb")?)?, &[0.0; 3], 0.0)?;
    common::assert_close(
        &common::f32_values(outputs.get("ya")?)?,
        &common::layer_norm_rows(&row, 8),
        1e-4,
    )?;
    Ok(())
}
