use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use openrt::{engines, Engine, TensorValue};

/// Engines named by `TEST_TARGETS` (comma separated), defaulting to x86.
pub fn test_engines() -> Vec<Arc<dyn Engine>> {
    let raw = env::var("TEST_TARGETS").unwrap_or_else(|_| "x86".to_string());
    let mut targets = Vec::new();
    for item in raw.split(',') {
        match item.trim() {
            "" => continue,
            "x86" => targets.push(engines::x86()),
            "arm" => targets.push(engines::arm()),
            "accel" => targets.push(engines::accel()),
            other => panic!(
                "unknown TEST_TARGETS entry '{}'; expected x86, arm or accel",
                other
            ),
        }
    }
    if targets.is_empty() {
        targets.push(engines::x86());
    }
    targets
}

pub fn feed(pairs: Vec<(&str, TensorValue)>) -> HashMap<String, TensorValue> {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

pub fn f32_values(value: &TensorValue) -> Result<Vec<f32>> {
    Ok(value.as_tensor::<f32>()?.data)
}

pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32) -> Result<()> {
    if actual.len() != expected.len() {
        return Err(anyhow!(
            "length mismatch: got {}, expected {}",
            actual.len(),
            expected.len()
        ));
    }
    for (idx, (a, e)) in actual.iter().zip(expected).enumerate() {
        let diff = (a - e).abs();
        if diff > tol * (1.0 + e.abs()) {
            return Err(anyhow!(
                "mismatch at {}: got {}, expected {} (diff {})",
                idx,
                a,
                e,
                diff
            ));
        }
    }
    Ok(())
}

pub fn layer_norm_rows(data: &[f32], inner: usize) -> Vec<f32> {
    data.chunks(inner)
        .flat_map(|row| {
            let n = row.len() as f64;
            let mean = row.iter().map(|v| *v as f64).sum::<f64>() / n;
            let var = row.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n;
            let inv = 1.0 / (var + 1e-5).sqrt();
            row.iter()
                .map(move |v| ((*v as f64 - mean) * inv) as f32)
                .collect::<Vec<_>>()
        })
        .collect()
}
