use std::collections::HashMap;
use std::fmt;
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;

use anyhow::{anyhow, Result};

use crate::error::{attach_node, rt_error, RetCode};
use crate::ops::KernelArgs;
use crate::registry::{KernelEntry, KernelFn, KernelRegistry};
use crate::tensor::DataLayout;

use super::{Engine, EngineBuilder, EngineKind};

/// Asynchronous engine: `launch` hands the kernel to a dedicated worker
/// thread through a FIFO queue, `synchronize` waits for one ticket's jobs.
/// Plans sharing the engine never see each other's failures.
pub struct AccelEngine {
    name: String,
    kind: EngineKind,
    registry: KernelRegistry,
    preference: Vec<DataLayout>,
    jobs: Mutex<mpsc::Sender<Job>>,
    inner: Arc<QueueInner>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    cv: Condvar,
}

#[derive(Default)]
struct TicketState {
    pending: usize,
    error: Option<anyhow::Error>,
}

#[derive(Default)]
struct QueueState {
    launched: u64,
    tickets: HashMap<u64, TicketState>,
}

struct Job {
    func: KernelFn,
    args: KernelArgs,
}

impl AccelEngine {
    pub(crate) fn from_builder(builder: EngineBuilder) -> Self {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState::default()),
            cv: Condvar::new(),
        });
        let worker = inner.clone();
        let name = builder.name().to_string();
        let thread_name = format!("openrt-{}", name);
        // Without a worker the receiver is dropped and every launch fails.
        if let Err(err) = thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker_loop(rx, worker))
        {
            crate::critical!("failed to start {} worker: {}", name, err);
        }
        Self {
            name: builder.name().to_string(),
            kind: builder.engine_kind(),
            registry: builder.registry(),
            preference: builder.preference().to_vec(),
            jobs: Mutex::new(tx),
            inner,
        }
    }

    /// Kernels accepted since construction.
    pub fn launched(&self) -> u64 {
        self.inner
            .state
            .lock()
            .map(|state| state.launched)
            .unwrap_or(0)
    }
}

impl fmt::Debug for AccelEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccelEngine")
            .field("name", &self.name)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Engine for AccelEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    fn layout_preference(&self) -> &[DataLayout] {
        &self.preference
    }

    fn is_async(&self) -> bool {
        true
    }

    fn launch(&self, kernel: &KernelEntry, args: KernelArgs) -> Result<()> {
        let ticket = args.ticket;
        {
            let mut state = self.inner.state.lock().map_err(|_| poisoned())?;
            state.tickets.entry(ticket).or_default().pending += 1;
            state.launched += 1;
        }
        let jobs = self.jobs.lock().map_err(|_| poisoned())?;
        let job = Job {
            func: kernel.func.clone(),
            args,
        };
        if jobs.send(job).is_err() {
            let mut state = self.inner.state.lock().map_err(|_| poisoned())?;
            if let Some(entry) = state.tickets.get_mut(&ticket) {
                entry.pending = entry.pending.saturating_sub(1);
            }
            return Err(rt_error(
                RetCode::RuntimeError,
                format!("{} worker is gone", self.name),
            ));
        }
        Ok(())
    }

    fn synchronize(&self, ticket: u64) -> Result<()> {
        let mut state = self.inner.state.lock().map_err(|_| poisoned())?;
        while state.tickets.get(&ticket).is_some_and(|t| t.pending > 0) {
            state = self.inner.cv.wait(state).map_err(|_| poisoned())?;
        }
        match state.tickets.remove(&ticket).and_then(|t| t.error) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn poisoned() -> anyhow::Error {
    rt_error(RetCode::RuntimeError, "accelerator queue mutex poisoned")
}

fn worker_loop(rx: mpsc::Receiver<Job>, inner: Arc<QueueInner>) {
    while let Ok(job) = rx.recv() {
        let ticket = job.args.ticket;
        // After a failure the rest of that ticket's batch is skipped.
        let failed = inner
            .state
            .lock()
            .map(|state| {
                state
                    .tickets
                    .get(&ticket)
                    .is_some_and(|t| t.error.is_some())
            })
            .unwrap_or(true);
        let result = if failed {
            Ok(())
        } else {
            (job.func)(&job.args)
                .map_err(|err| attach_node(err, job.args.node, RetCode::RuntimeError))
        };
        let Ok(mut state) = inner.state.lock() else {
            return;
        };
        let entry = state.tickets.entry(ticket).or_default();
        if let Err(err) = result {
            crate::trace!("accel kernel at {} failed: {}", job.args.node, err);
            if entry.error.is_none() {
                entry.error = Some(err);
            }
        }
        entry.pending = entry.pending.saturating_sub(1);
        inner.cv.notify_all();
    }
}
