//! Component F: the context builder. One walk over the (already folded)
//! graph populates the maps every later pass reads from instead of
//! re-walking the graph themselves: `children` (reverse edges, for
//! fan-out detection), `allbufs` (buffer identity -> its defining `View`
//! node), `assigns` (buffer identities targeted by an `ASSIGN`), and
//! `ops_metadata` (provenance, carried in from the caller).

use std::collections::{HashMap, HashSet};

use crate::buffer::Buffer;
use crate::metadata::Metadata;
use crate::op::{Opcode, UOp};
use crate::shapetracker::Variable;

#[derive(Default)]
pub struct ScheduleContext {
    /// Bindings resolved while folding `BIND(DEFINE_VAR, CONST)` nodes.
    pub var_vals: HashMap<Variable, i64>,
    /// Buffers that are the target of at least one `ASSIGN`.
    pub assigns: HashSet<Buffer>,
    /// Realized node (base, pre-buffer-injection) -> its `View(Buffer)`
    /// wrapper, populated once buffer_injection.rs runs.
    pub realizes: HashMap<UOp, UOp>,
    /// Every buffer referenced anywhere in the graph, keyed by identity.
    pub allbufs: HashMap<Buffer, UOp>,
    /// Provenance carried from the caller, keyed by the node it describes.
    pub ops_metadata: HashMap<UOp, Metadata>,
    /// Reverse edges: node -> the nodes that consume it directly.
    pub children: HashMap<UOp, Vec<UOp>>,
    /// Old node identity -> the node it was ultimately replaced by, for the
    /// external `becomes_map` the scheduler hands back to its caller.
    pub becomes_map: HashMap<UOp, UOp>,
}

impl ScheduleContext {
    pub fn fan_out(&self, node: &UOp) -> usize {
        self.children.get(node).map_or(0, Vec::len)
    }
}

/// Walk `root` once (iterative, dedup by identity) and populate `children`,
/// `allbufs`, and `assigns`. `ops_metadata` is left for the caller to merge
/// in, since metadata is supplied externally, not derivable from the graph.
pub fn build_context(root: &UOp) -> ScheduleContext {
    let mut ctx = ScheduleContext::default();
    let mut seen = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.identity()) {
            continue;
        }
        if let Some(buf) = node.buffer() {
            ctx.allbufs.insert(buf.clone(), node.clone());
            if node.op() == Opcode::Buffer {
                // nothing further: BUFFER has the device as its only source
            }
        }
        if node.op() == Opcode::Assign {
            if let [target, _value] = node.src() {
                if let Some(buf) = target.base().buffer() {
                    ctx.assigns.insert(buf.clone());
                }
            }
        }
        for child in node.src() {
            ctx.children.entry(child.clone()).or_default().push(node.clone());
            stack.push(child.clone());
        }
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::op::ConstValue;

    #[test]
    fn records_fan_out_for_shared_nodes() {
        let leaf = UOp::constant(DType::I32, ConstValue::Int(1));
        let a = UOp::alu(crate::op::AluOp::Add, vec![leaf.clone(), leaf.clone()], DType::I32);
        let b = UOp::alu(crate::op::AluOp::Mul, vec![leaf.clone(), leaf.clone()], DType::I32);
        let sink = UOp::sink(vec![UOp::store(a, b)]);
        let ctx = build_context(&sink);
        assert!(ctx.fan_out(&leaf) >= 2);
    }

    #[test]
    fn records_assigned_buffers() {
        let device = UOp::device("CPU");
        let buf = Buffer::new("CPU", 4, DType::I32);
        let buf_uop = UOp::buffer(device, buf.clone());
        let view = UOp::view(buf_uop, crate::shapetracker::ShapeTracker::from_shape(vec![4]));
        let value = UOp::constant(DType::I32, ConstValue::Int(0));
        let assign = UOp::assign(view, value);
        let sink = UOp::sink(vec![assign]);
        let ctx = build_context(&sink);
        assert!(ctx.assigns.contains(&buf));
    }
}
