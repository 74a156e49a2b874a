use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::error::{attach_node, failed_node, ret_code, rt_error, RetCode};
use crate::graph::{EdgeId, Graph, NodeId, OpAttrs};
use crate::ops::{KernelArgs, TensorArg};
use crate::optimizer::opt_of;
use crate::planner::MemoryPlan;
use crate::tensor::TensorValue;

use super::outputs::Outputs;
use super::plan::ExecutionPlan;
use super::state::RunState;
use super::trace::{TraceEvent, TraceEventKind};

static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

fn invalid_input(message: impl Into<String>) -> anyhow::Error {
    rt_error(RetCode::InvalidValue, message)
}

impl ExecutionPlan {
    /// Run the plan on `inputs`, keyed by graph input name.
    ///
    /// Inputs must keep their declared dtype and rank; other dimensions may
    /// change between runs. On failure the plan stays usable and `state()`
    /// reports the failing node.
    pub fn run(&mut self, inputs: &HashMap<String, TensorValue>) -> Result<Outputs> {
        self.state = RunState::Running;
        self.stats.runs += 1;
        self.ticket = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
        self.trace.clear();
        match self.run_inner(inputs) {
            Ok(outputs) => {
                self.state = RunState::Completed;
                Ok(outputs)
            }
            Err(err) => {
                self.drain();
                let node = failed_node(&err);
                let code = ret_code(&err).unwrap_or(RetCode::RuntimeError);
                self.state = RunState::Failed { node, code };
                crate::error!("run failed: {:#}", err);
                Err(err)
            }
        }
    }

    fn run_inner(&mut self, inputs: &HashMap<String, TensorValue>) -> Result<Outputs> {
        let changed = self.check_inputs(inputs)?;
        if !changed.is_empty() {
            self.reshape(&changed)?;
        }
        for edge in self.graph.inputs().to_vec() {
            let name = &self.graph.edge(edge)?.name;
            let value = inputs
                .get(name)
                .ok_or_else(|| invalid_input(format!("missing input {}", name)))?;
            let offset = self.memory.slot(edge)?.offset;
            self.arena.write(offset, value.as_bytes())?;
        }
        let pool = Arc::clone(&self.pool);
        pool.install(|| self.walk())?;
        self.collect_outputs()
    }

    /// Inputs whose shape differs from the planned one.
    fn check_inputs(&self, inputs: &HashMap<String, TensorValue>) -> Result<Vec<(EdgeId, Vec<usize>)>> {
        for name in inputs.keys() {
            let known = self
                .graph
                .inputs()
                .iter()
                .filter_map(|e| self.graph.edge(*e).ok())
                .any(|e| &e.name == name);
            if !known {
                return Err(invalid_input(format!("{} is not a graph input", name)));
            }
        }
        let mut changed = Vec::new();
        for edge in self.graph.inputs() {
            let e = self.graph.edge(*edge)?;
            let value = inputs
                .get(&e.name)
                .ok_or_else(|| invalid_input(format!("missing input {}", e.name)))?;
            let desc = e
                .desc
                .as_ref()
                .ok_or_else(|| invalid_input(format!("input {} has no descriptor", e.name)))?;
            if desc.dtype != Some(value.dtype()) {
                return Err(invalid_input(format!(
                    "input {} expects {}, got {}",
                    e.name,
                    desc,
                    value.dtype()
                )));
            }
            if desc.rank() != value.shape().len() {
                return Err(invalid_input(format!(
                    "input {} expects rank {}, got {:?}",
                    e.name,
                    desc.rank(),
                    value.shape()
                )));
            }
            if desc.shape()? != value.shape() {
                changed.push((*edge, value.shape().to_vec()));
            }
        }
        Ok(changed)
    }

    fn walk(&mut self) -> Result<()> {
        let base = self.arena.as_mut_ptr();
        let timed = self.options.trace || self.options.timer;
        let mut dirty = vec![false; self.engines.len()];
        for (pos, id) in self.order.iter().enumerate() {
            let placed = opt_of(&self.opt, *id).ok_or_else(|| {
                rt_error(RetCode::RuntimeError, format!("node {} has no kernel", id))
            })?;
            let node = self.graph.node(*id)?;

            // Join: wait for asynchronous producers on other engines.
            for edge in &node.inputs {
                let Some(src) = self
                    .graph
                    .edge(*edge)?
                    .producer
                    .and_then(|p| opt_of(&self.opt, p))
                    .map(|o| o.engine)
                else {
                    continue;
                };
                if src == placed.engine || !dirty[src] {
                    continue;
                }
                let engine = &self.engines[src];
                let start = timed.then(Instant::now);
                engine.synchronize(self.ticket)?;
                dirty[src] = false;
                if self.options.trace {
                    self.trace.push(TraceEvent {
                        kind: TraceEventKind::Sync,
                        node_index: pos,
                        node: *id,
                        node_uuid: node.uuid,
                        node_desc: format!("wait for {}", engine.name()),
                        engine: engine.name().to_string(),
                        kernel: String::new(),
                        micros: elapsed_micros(start),
                    });
                }
            }

            let engine = self.engines.get(placed.engine).ok_or_else(|| {
                rt_error(RetCode::RuntimeError, format!("node {} has no engine", id))
            })?;
            let attrs = self
                .attrs
                .get(id.0)
                .cloned()
                .flatten()
                .unwrap_or_else(|| Arc::new(OpAttrs::none()));
            let args = kernel_args(&self.graph, &self.memory, base, *id, self.ticket, attrs)
                .map_err(|err| attach_node(err, *id, RetCode::RuntimeError))?;
            let start = timed.then(Instant::now);
            engine
                .launch(&placed.kernel, args)
                .map_err(|err| attach_node(err, *id, RetCode::RuntimeError))?;
            if engine.is_async() {
                dirty[placed.engine] = true;
            }
            let micros = elapsed_micros(start);
            if self.options.trace {
                self.trace.push(TraceEvent {
                    kind: TraceEventKind::for_op(node.kind),
                    node_index: pos,
                    node: *id,
                    node_uuid: node.uuid,
                    node_desc: self.graph.describe_node(*id)?,
                    engine: engine.name().to_string(),
                    kernel: placed.kernel.id.clone(),
                    micros,
                });
            } else if self.options.timer {
                crate::trace!("{} {} -- {}us", pos, node.name, micros);
            }
        }
        for (idx, engine) in self.engines.iter().enumerate() {
            if dirty[idx] {
                engine.synchronize(self.ticket)?;
            }
        }
        Ok(())
    }

    /// Wait for every asynchronous engine after a failed run.
    fn drain(&self) {
        for engine in self.engines.iter().filter(|e| e.is_async()) {
            if let Err(err) = engine.synchronize(self.ticket) {
                crate::warning!("{} drained with error: {:#}", engine.name(), err);
            }
        }
    }

    fn collect_outputs(&self) -> Result<Outputs> {
        let mut values = HashMap::new();
        for edge in self.graph.outputs() {
            let e = self.graph.edge(*edge)?;
            let desc = e.desc.as_ref().ok_or_else(|| {
                rt_error(RetCode::RuntimeError, format!("output {} has no descriptor", e.name))
            })?;
            let offset = self.memory.slot(*edge)?.offset;
            let bytes = self.arena.read(offset, desc.bytes()?)?;
            let value = TensorValue::from_bytes(desc.dtype()?, desc.shape()?, bytes)?;
            values.insert(e.name.clone(), value);
        }
        Ok(Outputs::new(values))
    }
}

fn elapsed_micros(start: Option<Instant>) -> u64 {
    start
        .map(|s| s.elapsed().as_micros().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

fn tensor_arg(graph: &Graph, memory: &MemoryPlan, base: *mut u8, edge: EdgeId) -> Result<TensorArg> {
    let e = graph.edge(edge)?;
    let desc = e
        .desc
        .as_ref()
        .ok_or_else(|| rt_error(RetCode::RuntimeError, format!("{} has no descriptor", e.name)))?;
    let slot = memory.slot(edge)?;
    // Verified plans keep every slot inside the arena.
    unsafe { TensorArg::new(base.add(slot.offset), slot.size, desc) }
}

pub(crate) fn kernel_args(
    graph: &Graph,
    memory: &MemoryPlan,
    base: *mut u8,
    id: NodeId,
    ticket: u64,
    attrs: Arc<OpAttrs>,
) -> Result<KernelArgs> {
    let node = graph.node(id)?;
    let inputs = node
        .inputs
        .iter()
        .map(|e| tensor_arg(graph, memory, base, *e))
        .collect::<Result<Vec<_>>>()?;
    let outputs = node
        .outputs
        .iter()
        .map(|e| tensor_arg(graph, memory, base, *e))
        .collect::<Result<Vec<_>>>()?;
    Ok(KernelArgs {
        node: id,
        ticket,
        inputs,
        outputs,
        attrs,
    })
}
