//! Ready-made engines for the supported hardware families.
use std::sync::Arc;

use crate::graph::OpKind;
use crate::tensor::DataLayout;

use super::{Engine, EngineBuilder, EngineKind};

/// Vector CPU: computes channel-blocked data in 16-lane blocks.
pub fn x86() -> Arc<dyn Engine> {
    Arc::new(
        EngineBuilder::new("x86")
            .kind(EngineKind::X86)
            .prefer(&[DataLayout::N16cx, DataLayout::NdArray])
            .op_layouts(OpKind::InstanceNorm, &[DataLayout::N16cx])
            .build(),
    )
}

/// Mobile SIMD CPU: 8- and 4-lane channel blocks.
pub fn arm() -> Arc<dyn Engine> {
    Arc::new(
        EngineBuilder::new("arm")
            .kind(EngineKind::Arm)
            .prefer(&[DataLayout::N8cx, DataLayout::N4cx, DataLayout::NdArray])
            .op_layouts(
                OpKind::InstanceNorm,
                &[DataLayout::N8cx, DataLayout::NdArray],
            )
            .build(),
    )
}

/// Asynchronous accelerator: plain layout only, layer norm specialised for
/// rank 2 and rank 3 inputs.
pub fn accel() -> Arc<dyn Engine> {
    Arc::new(
        EngineBuilder::new("accel")
            .kind(EngineKind::Accel)
            .prefer(&[DataLayout::NdArray])
            .op_ranks(OpKind::LayerNorm, &[2, 3])
            .build_async(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{KernelKey, ShapeClass};
    use crate::tensor::DType;

    #[test]
    fn stock_registries_follow_preferences() {
        let cpu = x86();
        let key = |op, layout, class| KernelKey::new(op, DType::F32, layout, class);
        let reg = cpu.registry();
        assert!(reg
            .lookup(&key(OpKind::Add, DataLayout::N16cx, ShapeClass::Rank(4)))
            .is_some());
        assert!(reg
            .lookup(&key(OpKind::Add, DataLayout::N8cx, ShapeClass::Any))
            .is_none());
        assert!(reg
            .lookup(&key(OpKind::InstanceNorm, DataLayout::NdArray, ShapeClass::Any))
            .is_none());
        assert!(reg
            .lookup(&key(OpKind::LayerNorm, DataLayout::N16cx, ShapeClass::Any))
            .is_none());

        let acc = accel();
        assert!(acc.is_async());
        let acc_reg = acc.registry();
        assert!(acc_reg
            .lookup(&key(OpKind::LayerNorm, DataLayout::NdArray, ShapeClass::Rank(3)))
            .is_some());
        assert!(acc_reg
            .lookup(&key(OpKind::LayerNorm, DataLayout::NdArray, ShapeClass::Rank(4)))
            .is_none());
        assert_eq!(
            acc_reg
                .by_id("accel.layer_norm.f32.ndarray.r2")
                .map(|e| e.key.shape_class),
            Some(ShapeClass::Rank(2))
        );
    }
}
