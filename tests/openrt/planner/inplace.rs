use anyhow::Result;
use openrt::{compile, AttrValue, CompileOptions, DType, Graph, OpAttrs, OpKind, Random, TensorDesc};

use crate::common;

fn chain() -> Result<Graph> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[3, 1, 16], DType::F32));
    let a = g.add_edge("a");
    let b = g.add_edge("b");
    let c = g.add_edge("c");
    let d = g.add_edge("d");
    let y = g.add_edge("y");
    g.add_node(OpKind::Relu, "relu0", &[x], &[a], OpAttrs::none())?;
    g.add_node(OpKind::Sigmoid, "sig", &[a], &[b], OpAttrs::none())?;
    g.add_node(
        OpKind::Squeeze,
        "squeeze",
        &[b],
        &[c],
        OpAttrs::none().with("axes", AttrValue::IntList(vec![1])),
    )?;
    g.add_node(OpKind::Mul, "square", &[c, c], &[d], OpAttrs::none())?;
    g.add_node(OpKind::Relu, "relu1", &[d], &[y], OpAttrs::none())?;
    g.mark_output(y)?;
    Ok(g)
}

#[test]
fn inplace_reuse_keeps_results() -> Result<()> {
    let graph = chain()?;
    let engines = common::test_engines();
    let mut shared = compile(&graph, &engines, CompileOptions::default())?;
    let mut separate = compile(&graph, &engines, CompileOptions::default().without_inplace())?;

    assert!(!shared.memory().inplace_pairs().is_empty());
    assert!(separate.memory().inplace_pairs().is_empty());
    assert!(shared.memory().total <= separate.memory().total);
    for (src, dst) in shared.memory().inplace_pairs() {
        assert_eq!(shared.memory().slot(*src)?.offset, shared.memory().slot(*dst)?.offset);
        assert!(!shared.graph().edge(*src)?.is_pinned());
    }

    let x = Random::<f32>::generate_with_shape(7, (-2.0, 2.0), vec![3, 1, 16])?;
    let feed = common::feed(vec![("x", x.into())]);
    let a = shared.run(&feed)?;
    let b = separate.run(&feed)?;
    assert_eq!(a.get("y")?.as_bytes(), b.get("y")?.as_bytes());
    Ok(())
}
