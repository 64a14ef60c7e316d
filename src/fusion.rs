//! Component G: the fusion grouper (`group_realizes`). Decides which
//! value expressions must be realized (become their own kernel, writing
//! into a buffer) versus which can be fused into a consuming kernel.
//!
//! Simplification (documented, see DESIGN.md): the source this is modeled
//! on recursively groups descendants around each reduction, shrinking
//! isolated children and chasing forced realizes outward. This
//! implementation reaches the same realize decisions through a fixed rule
//! order instead of a single recursive walk: always-realize for
//! side-effecting/aliasing ops, realize-before-expand, realize-before-
//! unsafe-pad, multi-consumer fan-out, and one-reduce-per-kernel, each
//! exempting the `FUSE_ARANGE`-shaped case `is_arange_fusable` identifies.
//! `cfg.fuse_conv_bw`'s double-reduce merge is instead handled earlier, as
//! a structural fold (`folding::merge_double_reduce`) that runs to a fixed
//! point before grouping ever sees the graph — by the time `group_realizes`
//! runs there is nothing left to merge, only single reduces to realize.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::SchedulerConfig;
use crate::context::ScheduleContext;
use crate::folding::can_pad;
use crate::op::{AluOp, Opcode, UOp, UOpArg};

/// `realizes`: the base nodes that must become their own kernel (for O(1)
/// membership checks). `order`: the same set, insertion-ordered, so later
/// passes can iterate deterministically instead of at the mercy of hash
/// order (spec §5's determinism invariant). `forced_outputs`: for realizes
/// that come directly from a `SINK` child, the exact output `View` the
/// caller asked for (as opposed to a fresh buffer `buffer_injection.rs`
/// would otherwise mint).
pub struct Grouping {
    pub realizes: HashSet<UOp>,
    pub order: Vec<UOp>,
    pub forced_outputs: HashMap<UOp, UOp>,
}

impl Grouping {
    fn realize(&mut self, node: UOp) {
        if self.realizes.insert(node.clone()) {
            self.order.push(node);
        }
    }
}

pub fn group_realizes(ctx: &ScheduleContext, sink: &UOp, cfg: &SchedulerConfig) -> Grouping {
    let _span = tracing::debug_span!("group_realizes").entered();
    let mut grouping = Grouping { realizes: HashSet::new(), order: Vec::new(), forced_outputs: HashMap::new() };

    // 1. Every SINK child's value operand always realizes, into the exact
    // output view the STORE/ASSIGN names.
    for child in sink.src() {
        match child.op() {
            Opcode::Store | Opcode::Assign => {
                let target_view = child.src()[0].clone();
                let value_base = child.src()[1].base().clone();
                grouping.forced_outputs.insert(value_base.clone(), target_view);
                grouping.realize(value_base);
            }
            _ => grouping.realize(child.base().clone()),
        }
    }

    // 2. CONTIGUOUS/COPY/BUFFER_VIEW always realize: each denotes a side
    // effect or an aliasing boundary, never something safe to inline into a
    // consumer. ASSIGN itself is excluded here — rule 1 already realizes an
    // assign's *value* (the thing that actually computes into the target
    // buffer); the ASSIGN node is a statement, never a value a kernel lowers.
    for_each_node(sink, |node| {
        if matches!(node.op(), Opcode::Contiguous | Opcode::Copy | Opcode::BufferView) {
            grouping.realize(node.base().clone());
        }
    });

    // 3. Realize-before-expand: a VIEW presenting more elements than its
    // source naturally has must realize that source first — otherwise the
    // broadcast would recompute the source once per output position instead
    // of reading it from memory.
    if !cfg.dont_realize_expand {
        for_each_node(sink, |node| {
            if node.op() == Opcode::View {
                if let [child] = node.src() {
                    if child.op() != Opcode::View {
                        if let (Some(st), Some(natural)) = (node.shapetracker(), natural_size(child)) {
                            if st.size() > natural {
                                grouping.realize(child.base().clone());
                            }
                        }
                    }
                }
            }
        });
    }

    // 4. Realize-before-unsafe-pad: a VIEW whose own shapetracker carries a
    // mask (a pad) forces its source to realize first, unless the source is
    // provably safe to read through a pad (`can_pad`).
    for_each_node(sink, |node| {
        if node.op() == Opcode::View {
            if let [child] = node.src() {
                if node.shapetracker().is_some_and(|st| st.mask().is_some()) && !can_pad(child) {
                    grouping.realize(child.base().clone());
                }
            }
        }
    });

    // 5. A node with more than one distinct consumer realizes: fusing it
    // into every consumer would recompute it, and fusing it into only one
    // would make the others read through a kernel boundary they don't own.
    // A node whose base is already a BUFFER is exempt — it's memory already,
    // nothing to realize. An arange-shaped reduce `is_arange_fusable` exempts
    // is let through too, so each consumer rebuilds it inline.
    for (node, parents) in &ctx.children {
        if parents.len() > 1 && node.base().op() != Opcode::Buffer && !is_arange_fusable(node, ctx, cfg) {
            grouping.realize(node.base().clone());
        }
    }

    // 6. Every ReduceAxis realizes, preserving "at most one reduce per
    // kernel" unconditionally rather than only at fusion boundaries — except
    // the same arange-shaped exemption, left to be inlined (and duplicated)
    // into each of its consumers.
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(sink.clone());
    while let Some(node) = queue.pop_front() {
        if !seen.insert(node.identity()) {
            continue;
        }
        if node.op() == Opcode::ReduceAxis && !is_arange_fusable(&node, ctx, cfg) {
            grouping.realize(node.base().clone());
        }
        for s in node.src() {
            queue.push_back(s.clone());
        }
    }

    tracing::debug!(realizes = grouping.order.len(), "group_realizes: done");
    grouping
}

/// Walk every node reachable from `root` once (dedup by identity) and call
/// `f` on each.
fn for_each_node(root: &UOp, mut f: impl FnMut(&UOp)) {
    let mut seen = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.identity()) {
            continue;
        }
        f(&node);
        stack.extend(node.src().iter().cloned());
    }
}

/// The element count `node` itself naturally produces, recursing through
/// movement and elementwise ops to the nearest `VIEW` (or `None` if none is
/// reachable, e.g. a bare scalar `CONST`). Used to detect a `VIEW` whose
/// shape presents more elements than its source has — an expand.
fn natural_size(node: &UOp) -> Option<i64> {
    match node.op() {
        Opcode::View => node.shapetracker().map(crate::shapetracker::ShapeTracker::size),
        Opcode::ReduceAxis | Opcode::Alu(_) | Opcode::Cast | Opcode::Bitcast | Opcode::Assign | Opcode::Contiguous | Opcode::Detach => {
            node.src().iter().find_map(natural_size)
        }
        _ => None,
    }
}

/// Spec's `FUSE_ARANGE` heuristic: a reduce of `Add` over a constant, with
/// more than one direct consumer and none of them a `Contiguous` tensor-op,
/// is exempted from realizing so each consumer can rebuild it inline
/// instead of sharing one materialized copy. Gated on `cfg.fuse_arange`
/// since — per spec §9 — the correctness argument behind skipping
/// `Contiguous` groups is empirical, not derived.
fn is_arange_fusable(node: &UOp, ctx: &ScheduleContext, cfg: &SchedulerConfig) -> bool {
    if !cfg.fuse_arange {
        return false;
    }
    if node.op() != Opcode::ReduceAxis {
        return false;
    }
    if !matches!(node.arg(), UOpArg::Reduce(AluOp::Add, _)) {
        return false;
    }
    let Some(src) = node.src().first() else { return false };
    if src.base().op() != Opcode::Const {
        return false;
    }
    let Some(children) = ctx.children.get(node) else { return false };
    children.len() > 1 && !children.iter().any(|c| c.op() == Opcode::Contiguous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_context;
    use crate::dtype::DType;
    use crate::op::{AluOp, ConstValue};

    #[test]
    fn sink_value_always_realizes() {
        let target = UOp::constant(DType::I32, ConstValue::Int(0));
        let value = UOp::constant(DType::I32, ConstValue::Int(1));
        let store = UOp::store(target, value.clone());
        let sink = UOp::sink(vec![store]);
        let ctx = build_context(&sink);
        let cfg = SchedulerConfig::default();
        let grouping = group_realizes(&ctx, &sink, &cfg);
        assert!(grouping.realizes.contains(&value));
    }

    #[test]
    fn shared_node_forces_realization() {
        let leaf = UOp::constant(DType::I32, ConstValue::Int(1));
        let a = UOp::alu(AluOp::Add, vec![leaf.clone(), leaf.clone()], DType::I32);
        let b = UOp::alu(AluOp::Mul, vec![leaf.clone(), leaf.clone()], DType::I32);
        let target = UOp::alu(AluOp::Add, vec![a, b], DType::I32);
        let store = UOp::store(target.clone(), target.clone());
        let sink = UOp::sink(vec![store]);
        let ctx = build_context(&sink);
        let cfg = SchedulerConfig::default();
        let grouping = group_realizes(&ctx, &sink, &cfg);
        assert!(grouping.realizes.contains(&leaf));
    }

    #[test]
    fn reduce_axis_always_realizes() {
        let src = UOp::constant(DType::I32, ConstValue::Int(1));
        let reduced = UOp::reduce_axis(src, AluOp::Add, vec![0]);
        let store = UOp::store(reduced.clone(), reduced.clone());
        let sink = UOp::sink(vec![store]);
        let ctx = build_context(&sink);
        let cfg = SchedulerConfig::default();
        let grouping = group_realizes(&ctx, &sink, &cfg);
        assert!(grouping.realizes.contains(&reduced));
    }
}
