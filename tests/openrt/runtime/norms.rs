use anyhow::Result;
use openrt::{
    compile, AttrValue, CompileOptions, DType, EdgeId, Graph, OpAttrs, OpKind, Tensor,
    TensorDesc, TensorValue,
};

use crate::common;

fn constant(g: &mut Graph, name: &str, values: &[f32]) -> Result<EdgeId> {
    g.add_constant(
        name,
        TensorDesc::new(&[values.len()], DType::F32),
        bytemuck::cast_slice(values).to_vec(),
    )
}

fn run_layer_norm(attrs: OpAttrs, with_skip: bool) -> Result<Vec<Vec<f32>>> {
    let x = vec![1.0f32, 2.0, 3.0, 4.0, -2.0, 0.0, 2.0, 8.0];
    let skip = vec![0.5f32, -1.0, 0.0, 3.0, 2.0, 2.0, -2.0, 0.0];
    let mut g = Graph::new();
    let xe = g.add_input("x", TensorDesc::new(&[2, 4], DType::F32));
    let scale = constant(&mut g, "scale", &[10.0; 4])?;
    let bias = constant(&mut g, "bias", &[1.0, 2.0, 3.0, 4.0])?;
    let mut inputs = vec![xe, scale, bias];
    if with_skip {
        inputs.push(g.add_input("skip", TensorDesc::new(&[2, 4], DType::F32)));
    }
    let y = g.add_edge("y");
    g.add_node(OpKind::LayerNorm, "norm", &inputs, &[y], attrs)?;
    g.mark_output(y)?;

    let mut results = Vec::new();
    for engine in common::test_engines() {
        let mut plan = compile(&g, &[engine], CompileOptions::default())?;
        let mut feeds: Vec<(&str, TensorValue)> = vec![(
            "x",
            Tensor::from_vec_with_shape(x.clone(), vec![2, 4])?.into(),
        )];
        if with_skip {
            feeds.push((
                "skip",
                Tensor::from_vec_with_shape(skip.clone(), vec![2, 4])?.into(),
            ));
        }
        let outputs = plan.run(&common::feed(feeds))?;
        results.push(common::f32_values(outputs.get("y")?)?);
    }
    Ok(results)
}

#[test]
fn layer_norm_without_affine_ignores_scale_and_bias() -> Result<()> {
    let attrs = OpAttrs::none().with("elementwise_affine", AttrValue::Bool(false));
    let expected = common::layer_norm_rows(&[1.0, 2.0, 3.0, 4.0, -2.0, 0.0, 2.0, 8.0], 4);
    common::assert_close(&expected[..4], &[-1.341_64, -0.447_21, 0.447_21, 1.341_64], 1e-4)?;
    for got in run_layer_norm(attrs, false)? {
        common::assert_close(&got, &expected, 1e-4)?;
    }
    Ok(())
}

#[test]
fn layer_norm_applies_scale_and_bias_by_default() -> Result<()> {
    let normed = common::layer_norm_rows(&[1.0, 2.0, 3.0, 4.0, -2.0, 0.0, 2.0, 8.0], 4);
    let expected: Vec<f32> = normed
        .iter()
        .enumerate()
        .map(|(i, v)| v * 10.0 + (i % 4 + 1) as f32)
        .collect();
    for got in run_layer_norm(OpAttrs::none(), false)? {
        common::assert_close(&got, &expected, 1e-4)?;
    }
    Ok(())
}

#[test]
fn skip_term_adds_residual_before_normalizing() -> Result<()> {
    let attrs = OpAttrs::none().with("skip_term", AttrValue::Bool(true));
    let summed = [1.5f32, 1.0, 3.0, 7.0, 0.0, 2.0, 0.0, 8.0];
    let expected: Vec<f32> = common::layer_norm_rows(&summed, 4)
        .iter()
        .enumerate()
        .map(|(i, v)| v * 10.0 + (i % 4 + 1) as f32)
        .collect();
    for got in run_layer_norm(attrs, true)? {
        common::assert_close(&got, &expected, 1e-4)?;
    }
    Ok(())
}

#[test]
fn skip_term_without_affine_only_normalizes_the_sum() -> Result<()> {
    let attrs = OpAttrs::none()
        .with("skip_term", AttrValue::Bool(true))
        .with("elementwise_affine", AttrValue::Bool(false));
    let summed = [1.5f32, 1.0, 3.0, 7.0, 0.0, 2.0, 0.0, 8.0];
    let expected = common::layer_norm_rows(&summed, 4);
    for got in run_layer_norm(attrs, true)? {
        common::assert_close(&got, &expected, 1e-4)?;
    }
    Ok(())
}
