use std::sync::Arc;

use anyhow::{anyhow, Result};
use openrt::ops::KernelArgs;
use openrt::registry::{KernelEntry, KernelRegistry};
use openrt::{
    compile, engines, failed_node, ret_code, CompileOptions, CpuEngine, DType, DataLayout, Engine,
    EngineKind, Graph, OpAttrs, OpKind, RetCode, RunState, Tensor, TensorDesc, TensorValue,
};

use crate::common;

/// CPU engine whose sigmoid kernels always fail.
#[derive(Debug)]
struct FaultyEngine {
    inner: CpuEngine,
}

impl Engine for FaultyEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> EngineKind {
        self.inner.kind()
    }

    fn registry(&self) -> &KernelRegistry {
        self.inner.registry()
    }

    fn layout_preference(&self) -> &[DataLayout] {
        self.inner.layout_preference()
    }

    fn launch(&self, kernel: &KernelEntry, args: KernelArgs) -> Result<()> {
        if kernel.id.contains(".sigmoid.") {
            return Err(anyhow!("sigmoid unit offline"));
        }
        self.inner.launch(kernel, args)
    }
}

fn relu_sigmoid() -> Result<Graph> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[2, 2], DType::F32));
    let r = g.add_edge("r");
    let y = g.add_edge("y");
    g.add_node(OpKind::Relu, "relu", &[x], &[r], OpAttrs::none())?;
    g.add_node(OpKind::Sigmoid, "sig", &[r], &[y], OpAttrs::none())?;
    g.mark_output(y)?;
    Ok(g)
}

fn good_input() -> Result<TensorValue> {
    Ok(Tensor::from_vec_with_shape(vec![-1.0f32, 0.0, 1.0, 2.0], vec![2, 2])?.into())
}

#[test]
fn oversized_shapes_are_invalid_values() -> Result<()> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[usize::MAX / 2 + 1, 4], DType::F32));
    let y = g.add_edge("y");
    g.add_node(OpKind::Relu, "relu", &[x], &[y], OpAttrs::none())?;
    g.mark_output(y)?;
    let err = compile(&g, &common::test_engines(), CompileOptions::default())
        .err()
        .ok_or_else(|| anyhow!("oversized graph compiled"))?;
    assert_eq!(ret_code(&err), Some(RetCode::InvalidValue));
    Ok(())
}

#[test]
fn bad_inputs_are_invalid_values() -> Result<()> {
    let mut plan = compile(&relu_sigmoid()?, &common::test_engines(), CompileOptions::default())?;
    assert_eq!(plan.state(), RunState::Planned);

    let cases = vec![
        common::feed(vec![]),
        common::feed(vec![("x", Tensor::from_vec_with_shape(vec![1i32, 2, 3, 4], vec![2, 2])?.into())]),
        common::feed(vec![("x", vec![1.0f32, 2.0, 3.0, 4.0].into())]),
        common::feed(vec![("x", good_input()?), ("extra", vec![0.0f32].into())]),
    ];
    for feed in cases {
        let err = plan
            .run(&feed)
            .err()
            .ok_or_else(|| anyhow!("bad feed accepted"))?;
        assert_eq!(ret_code(&err), Some(RetCode::InvalidValue));
        assert_eq!(
            plan.state(),
            RunState::Failed {
                node: None,
                code: RetCode::InvalidValue
            }
        );
    }

    let outputs = plan.run(&common::feed(vec![("x", good_input()?)]))?;
    let y = common::f32_values(outputs.get("y")?)?;
    let expected: Vec<f32> = [0.0f32, 0.0, 1.0, 2.0]
        .iter()
        .map(|v| 1.0 / (1.0 + (-v).exp()))
        .collect();
    common::assert_close(&y, &expected, 1e-6)?;
    assert_eq!(plan.state(), RunState::Completed);
    assert!(outputs.get("missing").is_err());
    Ok(())
}

#[test]
fn kernel_failure_names_the_node() -> Result<()> {
    let faulty: Arc<dyn Engine> = Arc::new(FaultyEngine {
        inner: CpuEngine::builder("faulty").build(),
    });
    let graph = relu_sigmoid()?;
    let mut plan = compile(&graph, &[faulty], CompileOptions::default())?;

    let err = plan
        .run(&common::feed(vec![("x", good_input()?)]))
        .err()
        .ok_or_else(|| anyhow!("faulty kernel succeeded"))?;
    let sig = plan.graph().find_node("sig");
    assert_eq!(ret_code(&err), Some(RetCode::RuntimeError));
    assert_eq!(failed_node(&err), sig);
    assert_eq!(
        plan.state(),
        RunState::Failed {
            node: sig,
            code: RetCode::RuntimeError
        }
    );
    Ok(())
}

#[test]
fn bad_options_are_rejected() -> Result<()> {
    let graph = relu_sigmoid()?;
    let err = compile(
        &graph,
        &[engines::x86()],
        CompileOptions::default().with_alignment(24),
    )
    .err()
    .ok_or_else(|| anyhow!("alignment 24 accepted"))?;
    assert_eq!(ret_code(&err), Some(RetCode::InvalidValue));

    let err = compile(&graph, &[], CompileOptions::default())
        .err()
        .ok_or_else(|| anyhow!("compiled without engines"))?;
    assert!(ret_code(&err).is_some());
    Ok(())
}

#[test]
fn cyclic_graph_is_invalid() -> Result<()> {
    let mut g = Graph::new();
    let x = g.add_input("x", TensorDesc::new(&[4], DType::F32));
    let a = g.add_edge("a");
    let b = g.add_edge("b");
    let c = g.add_edge("c");
    g.add_node(OpKind::Add, "first", &[x, c], &[a], OpAttrs::none())?;
    g.add_node(OpKind::Relu, "second", &[a], &[b], OpAttrs::none())?;
    g.add_node(OpKind::Relu, "third", &[b], &[c], OpAttrs::none())?;
    g.mark_output(b)?;
    let err = compile(&g, &[engines::x86()], CompileOptions::default())
        .err()
        .ok_or_else(|| anyhow!("cycle compiled"))?;
    assert_eq!(ret_code(&err), Some(RetCode::InvalidGraph));
    Ok(())
}
