//! Component I: schedule assembly. Lowers every realized node into a
//! kernel (`kernel_lowering::schedule_uop`), builds the dependency graph
//! between kernels from shared buffers, and topologically sorts them with
//! a BFS (Kahn's algorithm) so two independently schedulable kernels come
//! out in the order they were realized, not an arbitrary one.
//!
//! `create_schedule` is the crate's single public fallible entry point,
//! stringing together validation, folding, context building, fusion
//! grouping, buffer injection/merge, kernel lowering, and this pass.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::buffer::Buffer;
use crate::buffer_injection::inject_buffers_with_debug;
use crate::buffer_merge::merge_assign_buffers;
use crate::config::SchedulerConfig;
use crate::context::build_context;
use crate::error::ScheduleError;
use crate::folding::fold;
use crate::fusion::group_realizes;
use crate::kernel_lowering::{schedule_uop, LoweredKernel};
use crate::metadata::Metadata;
use crate::op::UOp;
use crate::shapetracker::Variable;
use crate::validator::validate;

#[derive(Debug, Clone)]
pub struct ScheduleItem {
    pub ast: UOp,
    pub bufs: Vec<Buffer>,
    pub metadata: Vec<Metadata>,
    /// Buffers this kernel reads as a `Preload` — each is written by some
    /// other kernel's `Assign`, and that kernel is forced to run after this
    /// one (see the dependency pass in `create_schedule`).
    pub assign_preloads: Vec<Buffer>,
    /// Index into `bufs` of each buffer this kernel writes. Always `[0]`
    /// here — every kernel lowers from exactly one realize and so has
    /// exactly one output slot, reserved at `bufs[0]` — kept as its own
    /// field rather than assumed so a future multi-output kernel doesn't
    /// need a `ScheduleItem` shape change.
    pub output_idxs: Vec<usize>,
}

pub type VarVals = HashMap<Variable, i64>;
pub type BecomesMap = HashMap<UOp, UOp>;

thread_local! {
    static REPLAY_CACHE: RefCell<HashMap<usize, Vec<u8>>> = RefCell::new(HashMap::new());
}

/// Snapshot of everything `CAPTURE_PROCESS_REPLAY` has recorded so far in
/// this process. Persisting it to disk at exit is the caller's job.
pub fn replay_cache() -> HashMap<usize, Vec<u8>> {
    REPLAY_CACHE.with(|cell| cell.borrow().clone())
}

pub fn create_schedule(sink: &UOp, cfg: &SchedulerConfig) -> Result<(Vec<ScheduleItem>, VarVals, BecomesMap), ScheduleError> {
    tracing::debug!(op = %sink.op(), "validate: start");
    validate(sink)?;
    tracing::debug!("validate: ok");

    let (folded, fold_vars) = fold(sink);
    tracing::debug!(resolved_vars = fold_vars.len(), "fold: done");

    let mut ctx = build_context(&folded);
    ctx.var_vals.extend(fold_vars);
    tracing::debug!(children = ctx.children.len(), "context: built");

    let grouping = group_realizes(&ctx, &folded, cfg);
    tracing::debug!(realizes = grouping.order.len(), "fusion: grouped");

    inject_buffers_with_debug(&mut ctx, &grouping.realizes, &grouping.forced_outputs, &cfg.device, cfg.debug_level);
    merge_assign_buffers(&mut ctx, &folded);

    let mut kernels: HashMap<UOp, LoweredKernel> = HashMap::with_capacity(grouping.order.len());
    for base in &grouping.order {
        let lowered = schedule_uop(&ctx, base)?;
        kernels.insert(base.clone(), lowered);
    }

    let mut owner_of: HashMap<Buffer, UOp> = HashMap::new();
    for (base, kernel) in &kernels {
        owner_of.insert(kernel.bufs[0].clone(), base.clone());
    }

    // Ordinary read-after-write edges: a kernel depends on whoever produced
    // each buffer it reads — except a buffer it reads as a Preload, whose
    // ordering is reversed below (a Preload reads the value *before* its
    // owning kernel's Assign overwrites it, so the producer must run
    // *after* this kernel, not before).
    let mut deps: HashMap<UOp, Vec<UOp>> = HashMap::new();
    for (base, kernel) in &kernels {
        let mut d = Vec::new();
        for buf in &kernel.bufs[1..] {
            if kernel.assign_preloads.contains(buf) {
                continue;
            }
            if let Some(owner) = owner_of.get(buf) {
                if owner != base {
                    d.push(owner.clone());
                }
            }
        }
        deps.insert(base.clone(), d);
    }

    // Assign-preload edges: if this kernel reads buffer `b` as a Preload,
    // and some other kernel `writer` owns (writes/assigns into) `b`, the
    // writer must run after this one — it may only overwrite `b` once
    // every preload of its prior value has been read.
    for (base, kernel) in &kernels {
        for buf in &kernel.assign_preloads {
            if let Some(writer) = owner_of.get(buf) {
                if writer != base {
                    deps.entry(writer.clone()).or_default().push(base.clone());
                }
            }
        }
    }

    let order = topological_sort(&grouping.order, &deps)?;

    let mut items = Vec::with_capacity(order.len());
    for base in order {
        let kernel = kernels.remove(&base).expect("every ordered base was lowered above");
        let metadata = ctx.ops_metadata.get(&base).cloned().into_iter().collect();
        if cfg.capture_process_replay {
            capture_replay(&base, &kernel);
        }
        items.push(ScheduleItem {
            ast: kernel.ast,
            bufs: kernel.bufs,
            metadata,
            assign_preloads: kernel.assign_preloads,
            output_idxs: vec![0],
        });
    }

    if cfg.debug_level >= 1 {
        tracing::info!(kernels = items.len(), "schedule: assembled");
    }

    Ok((items, ctx.var_vals, ctx.becomes_map))
}

pub fn create_schedule_default(sink: &UOp) -> Result<(Vec<ScheduleItem>, VarVals, BecomesMap), ScheduleError> {
    let cfg = SchedulerConfig::from_env().unwrap_or_default();
    create_schedule(sink, &cfg)
}

fn capture_replay(base: &UOp, kernel: &LoweredKernel) {
    if let Ok(bytes) = bincode::serialize(&(kernel.bufs.len(),)) {
        REPLAY_CACHE.with(|cell| {
            cell.borrow_mut().insert(base.identity(), bytes);
        });
    }
}

/// Kahn's algorithm: repeatedly peel off realized nodes with no
/// unscheduled dependency, preferring the earliest-realized one among
/// ties — this is what keeps the order deterministic across runs of the
/// same graph.
fn topological_sort(candidates: &[UOp], deps: &HashMap<UOp, Vec<UOp>>) -> Result<Vec<UOp>, ScheduleError> {
    let mut remaining: HashSet<UOp> = candidates.iter().cloned().collect();
    let mut scheduled: Vec<UOp> = Vec::with_capacity(candidates.len());
    let mut queue: VecDeque<UOp> = VecDeque::new();

    let ready = |node: &UOp, remaining: &HashSet<UOp>| deps.get(node).is_none_or(|d| d.iter().all(|dep| !remaining.contains(dep)));

    for node in candidates {
        if ready(node, &remaining) {
            queue.push_back(node.clone());
        }
    }

    while let Some(node) = queue.pop_front() {
        if !remaining.remove(&node) {
            continue;
        }
        scheduled.push(node.clone());
        for candidate in candidates {
            if remaining.contains(candidate) && ready(candidate, &remaining) && !queue.contains(candidate) {
                queue.push_back(candidate.clone());
            }
        }
    }

    if !remaining.is_empty() {
        return Err(ScheduleError::ScheduleCycle { scheduled: scheduled.len(), total: candidates.len() });
    }
    Ok(scheduled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::op::{AluOp, ConstValue};
    use crate::shapetracker::ShapeTracker;

    fn store_sink(target: UOp, value: UOp) -> UOp {
        UOp::sink(vec![UOp::store(target, value)])
    }

    #[test]
    fn schedules_a_single_elementwise_kernel() {
        let a = UOp::constant(DType::I32, ConstValue::Int(1));
        let b = UOp::constant(DType::I32, ConstValue::Int(2));
        let sum = UOp::alu(AluOp::Add, vec![a, b], DType::I32);
        let device = UOp::device("CPU");
        let out = UOp::view(UOp::buffer(device, Buffer::new("CPU", 1, DType::I32)), ShapeTracker::from_shape(vec![1]));
        let sink = store_sink(out, sum);

        let cfg = SchedulerConfig::default();
        let (items, _vars, _becomes) = create_schedule(&sink, &cfg).expect("schedule should succeed");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn schedules_two_kernels_in_dependency_order() {
        let leaf = UOp::constant(DType::I32, ConstValue::Int(3));
        let doubled = UOp::alu(AluOp::Add, vec![leaf.clone(), leaf.clone()], DType::I32);
        let device = UOp::device("CPU");
        let mid_out = UOp::view(UOp::buffer(device.clone(), Buffer::new("CPU", 1, DType::I32)), ShapeTracker::from_shape(vec![1]));
        let tripled = UOp::alu(AluOp::Add, vec![doubled.clone(), leaf], DType::I32);
        let final_out = UOp::view(UOp::buffer(device, Buffer::new("CPU", 1, DType::I32)), ShapeTracker::from_shape(vec![1]));

        // force `doubled` to realize by giving it two consumers
        let also_uses_doubled = UOp::alu(AluOp::Mul, vec![doubled.clone(), doubled.clone()], DType::I32);
        let sink = UOp::sink(vec![UOp::store(mid_out, also_uses_doubled), UOp::store(final_out, tripled)]);

        let cfg = SchedulerConfig::default();
        let (items, _vars, _becomes) = create_schedule(&sink, &cfg).expect("schedule should succeed");
        assert!(items.len() >= 2);
    }

    #[test]
    fn rejects_malformed_root() {
        let c = UOp::constant(DType::I32, ConstValue::Int(1));
        let cfg = SchedulerConfig::default();
        assert!(create_schedule(&c, &cfg).is_err());
    }
}
