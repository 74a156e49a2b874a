use std::sync::Arc;

use anyhow::{anyhow, Result};
use openrt::{
    compile, engines, AttrValue, CompileOptions, DType, DataLayout, Engine, Graph, OpAttrs,
    OpKind, Tensor, TensorDesc,
};

use crate::common;

const CHANNELS: usize = 19;
const SPATIAL: usize = 4;

fn instance_norm_graph() -> Result<(Graph, Vec<f32>, Vec<f32>)> {
    let scale: Vec<f32> = (0..CHANNELS).map(|c| 1.0 + c as f32 * 0.1).collect();
    let bias: Vec<f32> = (0..CHANNELS).map(|c| c as f32 * -0.05).collect();
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[1, CHANNELS, SPATIAL], DType::F32));
    let s = g.add_constant(
        "scale",
        TensorDesc::new(&[CHANNELS], DType::F32),
        bytemuck::cast_slice(&scale).to_vec(),
    )?;
    let b = g.add_constant(
        "bias",
        TensorDesc::new(&[CHANNELS], DType::F32),
        bytemuck::cast_slice(&bias).to_vec(),
    )?;
    let n = g.add_edge("n");
    let y = g.add_edge("y");
    g.add_node(
        OpKind::InstanceNorm,
        "inorm",
        &[x, s, b],
        &[n],
        OpAttrs::none().with("epsilon", AttrValue::Double(1e-5)),
    )?;
    g.add_node(OpKind::Relu, "relu", &[n], &[y], OpAttrs::none())?;
    g.mark_output(y)?;
    Ok((g, scale, bias))
}

fn reference(x: &[f32], scale: &[f32], bias: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(x.len());
    for (c, row) in x.chunks(SPATIAL).enumerate() {
        let normed = common::layer_norm_rows(row, SPATIAL);
        out.extend(normed.iter().map(|v| (v * scale[c] + bias[c]).max(0.0)));
    }
    out
}

fn input() -> Vec<f32> {
    (0..CHANNELS * SPATIAL)
        .map(|i| ((i * 7) % 11) as f32 - 5.0 + (i / SPATIAL) as f32 * 0.25)
        .collect()
}

#[test]
fn x86_computes_instance_norm_in_sixteen_lane_blocks() -> Result<()> {
    let (graph, scale, bias) = instance_norm_graph()?;
    let mut plan = compile(&graph, &[engines::x86()], CompileOptions::default())?;
    let optimized = plan.graph();

    let inorm = optimized.find_node("inorm").ok_or_else(|| anyhow!("inorm"))?;
    let placed = plan.opt_node(inorm).ok_or_else(|| anyhow!("inorm not placed"))?;
    assert_eq!(placed.input_layouts[0], DataLayout::N16cx);
    assert_eq!(placed.output_layouts, vec![DataLayout::N16cx]);
    assert_eq!(&placed.input_layouts[1..], &[DataLayout::NdArray, DataLayout::NdArray]);

    let reorders: Vec<DataLayout> = optimized
        .nodes()
        .filter(|n| n.kind == OpKind::Reorder)
        .map(|n| n.attrs.layout("layout"))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    assert!(reorders.contains(&DataLayout::N16cx));
    assert!(reorders.contains(&DataLayout::NdArray));

    // Padded channels 19..32 cost space in the blocked buffers.
    let n = optimized.find_edge("n").ok_or_else(|| anyhow!("n"))?;
    let desc = optimized.edge(n)?.desc.clone().ok_or_else(|| anyhow!("n desc"))?;
    assert_eq!(desc.layout, DataLayout::N16cx);
    assert_eq!(desc.bytes()?, 32 * SPATIAL * 4);

    let x = input();
    let outputs = plan.run(&common::feed(vec![(
        "x",
        Tensor::from_vec_with_shape(x.clone(), vec![1, CHANNELS, SPATIAL])?.into(),
    )]))?;
    let y = outputs.fetch::<Tensor<f32>>("y")?;
    assert_eq!(y.shape(), &[1, CHANNELS, SPATIAL]);
    common::assert_close(&y.data, &reference(&x, &scale, &bias), 1e-4)?;
    Ok(())
}

#[test]
fn blocked_and_plain_engines_agree() -> Result<()> {
    let (graph, scale, bias) = instance_norm_graph()?;
    let x = input();
    let expected = reference(&x, &scale, &bias);
    for engine in [engines::x86(), engines::arm(), engines::accel()] {
        let name = engine.name().to_string();
        let mut plan = compile(&graph, &[engine], CompileOptions::default())?;
        let outputs = plan.run(&common::feed(vec![(
            "x",
            Tensor::from_vec_with_shape(x.clone(), vec![1, CHANNELS, SPATIAL])?.into(),
        )]))?;
        common::assert_close(&common::f32_values(outputs.get("y")?)?, &expected, 1e-4)
            .map_err(|err| anyhow!("{}: {}", name, err))?;
    }
    Ok(())
}

fn norm_graph(shape: &[usize]) -> Result<(Graph, Vec<f32>, Vec<f32>)> {
    let channels = shape[1];
    let scale: Vec<f32> = (0..channels).map(|c| 0.5 + c as f32 * 0.25).collect();
    let bias: Vec<f32> = (0..channels).map(|c| c as f32 * 0.1 - 0.3).collect();
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(shape, DType::F32));
    let s = g.add_constant(
        "scale",
        TensorDesc::new(&[channels], DType::F32),
        bytemuck::cast_slice(&scale).to_vec(),
    )?;
    let b = g.add_constant(
        "bias",
        TensorDesc::new(&[channels], DType::F32),
        bytemuck::cast_slice(&bias).to_vec(),
    )?;
    let n = g.add_edge("n");
    let y = g.add_edge("y");
    g.add_node(OpKind::InstanceNorm, "inorm", &[x, s, b], &[n], OpAttrs::none())?;
    g.add_node(OpKind::Relu, "relu", &[n], &[y], OpAttrs::none())?;
    g.mark_output(y)?;
    Ok((g, scale, bias))
}

/// Instance norm then relu on plain data; rows are `(n, c)` pairs.
fn plain_reference(
    x: &[f32],
    channels: usize,
    spatial: usize,
    scale: &[f32],
    bias: &[f32],
) -> Vec<f32> {
    let mut out = Vec::with_capacity(x.len());
    for (row_idx, row) in x.chunks(spatial).enumerate() {
        let c = row_idx % channels;
        let normed = common::layer_norm_rows(row, spatial);
        out.extend(normed.iter().map(|v| (v * scale[c] + bias[c]).max(0.0)));
    }
    out
}

#[test]
fn blocked_round_trip_matches_plain_across_shapes() -> Result<()> {
    let targets: [(Arc<dyn Engine>, DataLayout, usize); 2] = [
        (engines::x86(), DataLayout::N16cx, 16),
        (engines::arm(), DataLayout::N8cx, 8),
    ];
    for (engine, blocked, lanes) in targets {
        for channels in [1usize, 8, 16, 17] {
            for shape in [vec![2, channels, 3], vec![3, channels, 2, 3]] {
                let case = format!("{} {:?}", engine.name(), shape);
                let batch = shape[0];
                let spatial: usize = shape[2..].iter().product();
                let (graph, scale, bias) = norm_graph(&shape)?;
                let mut plan = compile(&graph, &[engine.clone()], CompileOptions::default())?;
                let optimized = plan.graph();

                let inorm = optimized.find_node("inorm").ok_or_else(|| anyhow!("inorm"))?;
                let placed = plan
                    .opt_node(inorm)
                    .ok_or_else(|| anyhow!("{}: inorm not placed", case))?;
                assert_eq!(placed.output_layouts, vec![blocked], "{}", case);

                let reorders: Vec<DataLayout> = optimized
                    .nodes()
                    .filter(|n| n.kind == OpKind::Reorder)
                    .map(|n| n.attrs.layout("layout"))
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .flatten()
                    .collect();
                assert!(reorders.contains(&blocked), "{}: {:?}", case, reorders);
                assert!(reorders.contains(&DataLayout::NdArray), "{}: {:?}", case, reorders);

                let n = optimized.find_edge("n").ok_or_else(|| anyhow!("n"))?;
                let desc = optimized.edge(n)?.desc.clone().ok_or_else(|| anyhow!("n desc"))?;
                let padded = (channels + lanes - 1) / lanes * lanes;
                assert_eq!(desc.bytes()?, batch * padded * spatial * 4, "{}", case);

                let numel = batch * channels * spatial;
                let x: Vec<f32> = (0..numel)
                    .map(|i| ((i * 5) % 13) as f32 - 6.0 + (i % 7) as f32 * 0.3)
                    .collect();
                let outputs = plan.run(&common::feed(vec![(
                    "x",
                    Tensor::from_vec_with_shape(x.clone(), shape.clone())?.into(),
                )]))?;
                let y = outputs.fetch::<Tensor<f32>>("y")?;
                assert_eq!(y.shape(), shape.as_slice(), "{}", case);
                common::assert_close(
                    &y.data,
                    &plain_reference(&x, channels, spatial, &scale, &bias),
                    1e-4,
                )
                .map_err(|err| anyhow!("{}: {}", case, err))?;
            }
        }
    }
    Ok(())
}
