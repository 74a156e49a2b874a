use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::optimizer::{AffinityPolicy, PartitionPolicy, PriorityPolicy};

/// Built-in engine tie-break policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionMode {
    #[default]
    Priority,
    Affinity,
}

/// Options for `compile`.
///
/// ```no_run
/// # use openrt::CompileOptions;
/// # fn main() -> anyhow::Result<()> {
/// let opts = CompileOptions::from_json_str(r#"{ "alignment": 128, "partition": "affinity" }"#)?;
/// let opts = opts.with_trace();
/// # Ok(()) }
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Byte alignment of every arena slot; a power of two, at least 8.
    pub alignment: usize,
    /// Let eligible operators write over their first input.
    pub inplace: bool,
    pub partition: PartitionMode,
    /// Kernel thread pool size; `None` uses rayon's default.
    pub threads: Option<usize>,
    pub trace: bool,
    pub timer: bool,
    /// Overrides `partition` when set.
    #[serde(skip)]
    pub policy: Option<Arc<dyn PartitionPolicy>>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            alignment: 64,
            inplace: true,
            partition: PartitionMode::Priority,
            threads: None,
            trace: false,
            timer: false,
            policy: None,
        }
    }
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("alignment", &self.alignment)
            .field("inplace", &self.inplace)
            .field("partition", &self.partition)
            .field("threads", &self.threads)
            .field("trace", &self.trace)
            .field("timer", &self.timer)
            .field("policy", &self.policy.as_ref().map(|p| p.name()))
            .finish()
    }
}

impl CompileOptions {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let opts: CompileOptions =
            serde_json::from_str(text).context("failed to parse compile options")?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn without_inplace(mut self) -> Self {
        self.inplace = false;
        self
    }

    pub fn with_partition(mut self, partition: PartitionMode) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PartitionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_trace(mut self) -> Self {
        self.trace = true;
        self
    }

    pub fn with_timer(mut self) -> Self {
        self.timer = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.alignment < 8 || !self.alignment.is_power_of_two() {
            return Err(anyhow!(
                "alignment must be a power of two >= 8, got {}",
                self.alignment
            ));
        }
        if self.threads == Some(0) {
            return Err(anyhow!("threads must be at least 1"));
        }
        Ok(())
    }

    /// Thread count after applying `OPENRT_THREADS`.
    pub fn resolved_threads(&self) -> Option<usize> {
        env::var("OPENRT_THREADS")
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .or(self.threads)
    }

    pub fn partition_policy(&self) -> Arc<dyn PartitionPolicy> {
        if let Some(policy) = &self.policy {
            return Arc::clone(policy);
        }
        match self.partition {
            PartitionMode::Priority => Arc::new(PriorityPolicy),
            PartitionMode::Affinity => Arc::new(AffinityPolicy),
        }
    }
}
