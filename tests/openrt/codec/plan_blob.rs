use anyhow::{anyhow, Result};
use openrt::{
    compile, deserialize, engines, load, ret_code, save, serialize, AttrValue, CompileOptions,
    DType, Graph, OpAttrs, OpKind, Random, RetCode, TensorDesc,
};

use crate::common;

fn norm_add_relu(channels: usize) -> Result<Graph> {
    let ones = vec![1.0f32; channels];
    let zeros = vec![0.0f32; channels];
    let shift: Vec<f32> = (0..channels * 6).map(|i| (i % 5) as f32 * 0.2 - 0.4).collect();
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[1, channels, 6], DType::F32));
    let s = g.add_constant(
        "scale",
        TensorDesc::new(&[channels], DType::F32),
        bytemuck::cast_slice(&ones).to_vec(),
    )?;
    let b = g.add_constant(
        "bias",
        TensorDesc::new(&[channels], DType::F32),
        bytemuck::cast_slice(&zeros).to_vec(),
    )?;
    let k = g.add_constant(
        "shift",
        TensorDesc::new(&[1, channels, 6], DType::F32),
        bytemuck::cast_slice(&shift).to_vec(),
    )?;
    let n = g.add_edge("n");
    let a = g.add_edge("a");
    let y = g.add_edge("y");
    g.add_node(
        OpKind::InstanceNorm,
        "inorm",
        &[x, s, b],
        &[n],
        OpAttrs::none().with("epsilon", AttrValue::Double(1e-3)),
    )?;
    g.add_node(OpKind::Add, "shift_add", &[n, k], &[a], OpAttrs::none())?;
    g.add_node(OpKind::Relu, "relu", &[a], &[y], OpAttrs::none())?;
    g.mark_output(y)?;
    Ok(g)
}

#[test]
fn reloaded_plan_is_bit_identical() -> Result<()> {
    let graph = norm_add_relu(19)?;
    let engines = vec![engines::x86(), engines::accel()];
    let mut fresh = compile(&graph, &engines, CompileOptions::default())?;
    let blob = serialize(&fresh)?;
    let mut restored = deserialize(&blob, &engines)?;

    assert_eq!(restored.order(), fresh.order());
    assert_eq!(restored.memory().total, fresh.memory().total);
    for id in fresh.order() {
        assert_eq!(
            restored.opt_node(*id).map(|o| o.kernel.id.clone()),
            fresh.opt_node(*id).map(|o| o.kernel.id.clone())
        );
    }

    let x = Random::<f32>::generate_with_shape(11, (-3.0, 3.0), vec![1, 19, 6])?;
    let feed = common::feed(vec![("x", x.into())]);
    let a = fresh.run(&feed)?;
    let b = restored.run(&feed)?;
    assert_eq!(a.get("y")?.as_bytes(), b.get("y")?.as_bytes());
    Ok(())
}

#[test]
fn saved_plan_loads_from_disk() -> Result<()> {
    let graph = norm_add_relu(4)?;
    let engines = common::test_engines();
    let mut plan = compile(&graph, &engines, CompileOptions::default().with_alignment(128))?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("norm.ortp");
    save(&plan, &path)?;

    let mut loaded = load(&path, &engines)?;
    assert_eq!(loaded.options().alignment, 128);
    let x = Random::<f32>::generate_with_shape(5, (-1.0, 1.0), vec![1, 4, 6])?;
    let feed = common::feed(vec![("x", x.into())]);
    assert_eq!(
        plan.run(&feed)?.get("y")?.as_bytes(),
        loaded.run(&feed)?.get("y")?.as_bytes()
    );
    Ok(())
}

#[test]
fn blob_needs_its_engines() -> Result<()> {
    let graph = norm_add_relu(4)?;
    let plan = compile(&graph, &[engines::x86()], CompileOptions::default())?;
    let blob = serialize(&plan)?;

    let err = deserialize(&blob, &[engines::arm()])
        .err()
        .ok_or_else(|| anyhow!("x86 kernels bound to arm"))?;
    assert_eq!(ret_code(&err), Some(RetCode::InvalidValue));

    let mut corrupt = blob.clone();
    corrupt[0] = b'X';
    let err = deserialize(&corrupt, &[engines::x86()])
        .err()
        .ok_or_else(|| anyhow!("bad magic accepted"))?;
    assert_eq!(ret_code(&err), Some(RetCode::InvalidValue));
    Ok(())
}
