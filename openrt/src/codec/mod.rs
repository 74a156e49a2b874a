//! Binary persistence of an execution plan.
//!
//! Layout (all integers little-endian, sections 8-byte aligned):
//!
//! ```text
//! "ORTP" | version u32 | flags u32 | section count u32
//! section table: (offset u64, len u64) x SECTION_COUNT
//! file size u64
//! graph     JSON of the optimized graph, no constant payloads
//! constants count u64, then (edge u64, len u64, bytes, padding) per constant
//! opt       count u64, then one record per node
//! source    JSON of the source graph
//! options   JSON of the compile options
//! ```
//!
//! Loading skips inference and partitioning: kernels are bound by id and only
//! the memory plan is rebuilt.
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use memmap2::Mmap;

use crate::config::CompileOptions;
use crate::engine::{Engine, EngineKind};
use crate::error::{rt_error, RetCode};
use crate::graph::{EdgeId, EdgeRole, Graph, GraphDeserialize, GraphSerialize, NodeId};
use crate::optimizer::OptNode;
use crate::runtime::{assemble, ExecutionPlan};
use crate::tensor::{DType, DataLayout};

mod bytes;

use bytes::{
    malformed, read_bytes, read_string, read_u32, read_u8, read_u64, read_usize, skip_padding,
    BlobWriter,
};

const MAGIC: &[u8; 4] = b"ORTP";
const VERSION: u32 = 2;
const SECTION_COUNT: usize = 5;
const HEADER_SIZE: usize = 16 + SECTION_COUNT * 16 + 8;

const SECTION_GRAPH: usize = 0;
const SECTION_CONSTANTS: usize = 1;
const SECTION_OPT: usize = 2;
const SECTION_SOURCE: usize = 3;
const SECTION_OPTIONS: usize = 4;

/// Encode `plan` into a self-contained blob.
pub fn serialize(plan: &ExecutionPlan) -> Result<Vec<u8>> {
    let mut w = BlobWriter::new();
    w.put_bytes(MAGIC);
    w.put_u32(VERSION);
    w.put_u32(0);
    w.put_u32(SECTION_COUNT as u32);
    let table = w.len();
    for _ in 0..SECTION_COUNT * 2 + 1 {
        w.put_u64(0);
    }

    let mut sections = [(0usize, 0usize); SECTION_COUNT];
    for (index, section) in sections.iter_mut().enumerate() {
        w.pad();
        let start = w.len();
        match index {
            SECTION_GRAPH => w.put_bytes(&GraphSerialize::json_bytes(&plan.graph)?),
            SECTION_CONSTANTS => write_constants(&mut w, &plan.graph),
            SECTION_OPT => write_opt(&mut w, plan)?,
            SECTION_SOURCE => w.put_bytes(&GraphSerialize::json_bytes(&plan.source)?),
            _ => w.put_bytes(&serde_json::to_vec(&plan.options)?),
        }
        *section = (start, w.len() - start);
    }
    w.pad();
    for (index, (offset, len)) in sections.iter().enumerate() {
        w.patch_u64(table + index * 16, *offset as u64);
        w.patch_u64(table + index * 16 + 8, *len as u64);
    }
    let size = w.len();
    w.patch_u64(table + SECTION_COUNT * 16, size as u64);
    crate::trace!("codec: serialized plan into {} bytes", size);
    Ok(w.into_inner())
}

fn write_constants(w: &mut BlobWriter, graph: &Graph) {
    let constants: Vec<_> = graph
        .edges()
        .filter(|e| e.role == EdgeRole::Constant)
        .filter_map(|e| e.data.as_ref().map(|data| (e.id, data)))
        .collect();
    w.put_u64(constants.len() as u64);
    for (edge, data) in constants {
        w.put_u64(edge.0 as u64);
        w.put_u64(data.len() as u64);
        w.put_bytes(data);
        w.pad();
    }
}

fn write_opt(w: &mut BlobWriter, plan: &ExecutionPlan) -> Result<()> {
    let placed: Vec<&OptNode> = plan.opt.iter().flatten().collect();
    w.put_u64(placed.len() as u64);
    for opt in placed {
        let engine = plan.engines.get(opt.engine).ok_or_else(|| {
            rt_error(RetCode::RuntimeError, format!("{} has no engine", opt.node))
        })?;
        w.put_u64(opt.node.0 as u64);
        w.put_u8(engine.kind().to_byte());
        w.put_u8(u8::from(opt.inplace));
        w.put_u32(layout_count(opt.input_layouts.len())?);
        w.put_u32(layout_count(opt.output_layouts.len())?);
        w.pad();
        w.put_string(&opt.kernel.id)?;
        w.put_string(opt.dtype.as_str())?;
        for layout in opt.input_layouts.iter().chain(&opt.output_layouts) {
            w.put_string(layout.as_str())?;
        }
    }
    Ok(())
}

fn layout_count(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| rt_error(RetCode::InvalidValue, "too many operands for plan blob"))
}

/// Rebuild a plan from `bytes`, binding every kernel id to the first engine in
/// `engines` that registers it.
pub fn deserialize(bytes: &[u8], engines: &[Arc<dyn Engine>]) -> Result<ExecutionPlan> {
    if bytes.len() < HEADER_SIZE {
        return Err(malformed("blob too small for header"));
    }
    let mut cursor = 0usize;
    if read_bytes(bytes, &mut cursor, 4)? != MAGIC {
        return Err(malformed("bad magic"));
    }
    let version = read_u32(bytes, &mut cursor)?;
    if version != VERSION {
        return Err(malformed(format!("unsupported version {}", version)));
    }
    let _flags = read_u32(bytes, &mut cursor)?;
    let count = read_u32(bytes, &mut cursor)? as usize;
    if count != SECTION_COUNT {
        return Err(malformed(format!("expected {} sections, found {}", SECTION_COUNT, count)));
    }
    let mut sections = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = read_usize(bytes, &mut cursor)?;
        let len = read_usize(bytes, &mut cursor)?;
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| malformed("section out of bounds"))?;
        if offset % 8 != 0 || offset < HEADER_SIZE {
            return Err(malformed("section offset not aligned"));
        }
        sections.push(&bytes[offset..end]);
    }
    let size = read_usize(bytes, &mut cursor)?;
    if size != bytes.len() {
        return Err(malformed(format!("size {} does not match blob of {}", size, bytes.len())));
    }

    let mut graph = read_graph(sections[SECTION_GRAPH])?;
    let mut source = read_graph(sections[SECTION_SOURCE])?;
    for (edge, data) in read_constants(sections[SECTION_CONSTANTS])? {
        let data = Arc::new(data);
        attach_constant(&mut graph, edge, Arc::clone(&data))?;
        attach_constant(&mut source, edge, data)?;
    }
    graph.validate().map_err(|err| malformed(format!("{:#}", err)))?;
    source.validate().map_err(|err| malformed(format!("{:#}", err)))?;

    let options: CompileOptions = serde_json::from_slice(sections[SECTION_OPTIONS])
        .map_err(|err| malformed(format!("options: {}", err)))?;
    options
        .validate()
        .map_err(|err| malformed(format!("options: {:#}", err)))?;
    let opt = read_opt(sections[SECTION_OPT], &graph, engines)?;
    let order = graph
        .topological_order()
        .map_err(|err| malformed(format!("{:#}", err)))?;
    crate::trace!("codec: loaded plan with {} nodes", order.len());
    assemble(source, graph, opt, order, engines.to_vec(), options)
}

fn read_graph(section: &[u8]) -> Result<Graph> {
    GraphDeserialize::from_json_bytes(section).map_err(|err| malformed(format!("graph: {:#}", err)))
}

fn read_constants(section: &[u8]) -> Result<Vec<(EdgeId, Vec<u8>)>> {
    let mut cursor = 0usize;
    let count = read_usize(section, &mut cursor)?;
    let mut out = Vec::new();
    for _ in 0..count {
        let edge = EdgeId(read_usize(section, &mut cursor)?);
        let len = read_usize(section, &mut cursor)?;
        let data = read_bytes(section, &mut cursor, len)?.to_vec();
        skip_padding(section, &mut cursor)?;
        out.push((edge, data));
    }
    Ok(out)
}

fn attach_constant(graph: &mut Graph, edge: EdgeId, data: Arc<Vec<u8>>) -> Result<()> {
    let e = graph
        .edge_mut(edge)
        .map_err(|_| malformed(format!("constant {} is not in the graph", edge)))?;
    if e.role != EdgeRole::Constant {
        return Err(malformed(format!("edge {} is not a constant", e.name)));
    }
    e.data = Some(data);
    Ok(())
}

fn read_layout(section: &[u8], cursor: &mut usize) -> Result<DataLayout> {
    read_string(section, cursor)?
        .parse()
        .map_err(|err| malformed(format!("{:#}", err)))
}

fn read_opt(
    section: &[u8],
    graph: &Graph,
    engines: &[Arc<dyn Engine>],
) -> Result<Vec<Option<OptNode>>> {
    let mut cursor = 0usize;
    let count = read_usize(section, &mut cursor)?;
    let mut opt: Vec<Option<OptNode>> = vec![None; graph.node_capacity()];
    for _ in 0..count {
        let node = NodeId(read_usize(section, &mut cursor)?);
        let kind = EngineKind::from_byte(read_u8(section, &mut cursor)?)
            .ok_or_else(|| malformed("unknown engine kind"))?;
        let inplace = read_u8(section, &mut cursor)? != 0;
        let n_inputs = read_u32(section, &mut cursor)? as usize;
        let n_outputs = read_u32(section, &mut cursor)? as usize;
        skip_padding(section, &mut cursor)?;
        let kernel_id = read_string(section, &mut cursor)?;
        let dtype = DType::from_ident(&read_string(section, &mut cursor)?)
            .map_err(|err| malformed(format!("{:#}", err)))?;
        let input_layouts = (0..n_inputs)
            .map(|_| read_layout(section, &mut cursor))
            .collect::<Result<Vec<_>>>()?;
        let output_layouts = (0..n_outputs)
            .map(|_| read_layout(section, &mut cursor))
            .collect::<Result<Vec<_>>>()?;

        graph
            .node(node)
            .map_err(|_| malformed(format!("record for unknown node {}", node)))?;
        let (engine, kernel) = engines
            .iter()
            .enumerate()
            .find_map(|(idx, e)| e.registry().by_id(&kernel_id).map(|k| (idx, k.clone())))
            .ok_or_else(|| {
                rt_error(
                    RetCode::InvalidValue,
                    format!("no registered engine provides kernel {}", kernel_id),
                )
            })?;
        if engines[engine].kind() != kind {
            crate::warning!(
                "kernel {} was planned for a {} engine, bound to {}",
                kernel_id,
                kind,
                engines[engine].name()
            );
        }
        let slot = opt
            .get_mut(node.0)
            .ok_or_else(|| malformed(format!("record for unknown node {}", node)))?;
        *slot = Some(OptNode {
            node,
            engine,
            dtype,
            input_layouts,
            output_layouts,
            kernel,
            inplace,
        });
    }
    for node in graph.nodes() {
        if opt[node.id.0].is_none() {
            return Err(malformed(format!("node {} has no kernel record", node.name)));
        }
    }
    Ok(opt)
}

/// Write `serialize(plan)` to `path`.
pub fn save<P: AsRef<Path>>(plan: &ExecutionPlan, path: P) -> Result<()> {
    let path = path.as_ref();
    let blob = serialize(plan)?;
    fs::write(path, blob).with_context(|| format!("failed to write {}", path.display()))
}

/// Map `path` and decode it with [`deserialize`].
pub fn load<P: AsRef<Path>>(path: P, engines: &[Arc<dyn Engine>]) -> Result<ExecutionPlan> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    // The mapping is only read while decoding; nothing borrows it afterwards.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("failed to map {}", path.display()))?;
    deserialize(&mmap[..], engines)
}
