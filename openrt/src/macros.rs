/// Build a `HashMap<String, TensorValue>` of run inputs.
///
/// ```no_run
/// # use openrt::{inputs, Tensor};
/// let feed = inputs! { x: vec![1.0f32, 2.0], mask: Tensor::new(vec![1u8, 0]) };
/// ```
#[macro_export]
macro_rules! inputs {
    ($($name:ident : $value:expr),* $(,)?) => {{
        let mut map: ::std::collections::HashMap<String, $crate::TensorValue> =
            ::std::collections::HashMap::new();
        $( map.insert(stringify!($name).to_string(), $crate::TensorValue::from($value)); )*
        map
    }};
}

/// Bind run outputs to local variables, optionally typed.
///
/// ```no_run
/// # use openrt::{fetch_outputs, Outputs, Tensor};
/// # fn f(outputs: &Outputs) -> anyhow::Result<()> {
/// fetch_outputs!(outputs, { y: Tensor<f32> });
/// # Ok(()) }
/// ```
#[macro_export]
macro_rules! fetch_outputs {
    (@one $outputs:expr, $name:ident, $ty:ty) => {
        let $name: $ty = $outputs.fetch::<$ty>(stringify!($name))?;
    };
    (@one $outputs:expr, $name:ident) => {
        let $name: $crate::TensorValue = $outputs.fetch(stringify!($name))?;
    };
    ($outputs:expr, { $($name:ident $( : $ty:ty )?),* $(,)? }) => {
        $( $crate::fetch_outputs!(@one $outputs, $name $(, $ty)?); )*
    };
}
