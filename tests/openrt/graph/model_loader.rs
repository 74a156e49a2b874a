use anyhow::Result;
use openrt::{compile, fetch_outputs, inputs, CompileOptions, ModelLoader, Tensor};

use crate::common;

const MODEL: &str = r#"{
    "inputs": [{ "name": "x", "dtype": "f32", "dims": [2, 4] }],
    "constants": [
        { "name": "g", "dtype": "f32", "dims": [4], "values": [2, 2, 2, 2] },
        { "name": "b", "dtype": "f32", "dims": [4], "values": [1, 1, 1, 1] }
    ],
    "nodes": [
        { "op": "layer_norm", "name": "ln", "inputs": ["x", "g", "b"], "outputs": ["n"],
          "attrs": { "axis": -1 } },
        { "op": "relu", "inputs": ["n"], "outputs": ["y"] }
    ],
    "outputs": ["y"]
}"#;

#[test]
fn loaded_model_compiles_and_runs() -> Result<()> {
    let graph = ModelLoader::from_json_str(MODEL)?;
    let mut plan = compile(&graph, &common::test_engines(), CompileOptions::default())?;

    let x = vec![1.0f32, 2.0, 3.0, 4.0, -4.0, -3.0, -2.0, -1.0];
    let outputs = plan.run(&inputs! { x: Tensor::from_vec_with_shape(x.clone(), vec![2, 4])? })?;
    fetch_outputs!(outputs, { y: Tensor<f32> });

    let expected: Vec<f32> = common::layer_norm_rows(&x, 4)
        .into_iter()
        .map(|v| (v * 2.0 + 1.0).max(0.0))
        .collect();
    assert_eq!(y.shape(), &[2, 4]);
    common::assert_close(&y.data, &expected, 1e-5)?;
    Ok(())
}
