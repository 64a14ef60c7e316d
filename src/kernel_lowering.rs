//! Components H + J: view-hoisting and kernel AST lowering
//! (`schedule_uop`), plus the assign-cycle and non-contiguous self-assign
//! checks that guard it.
//!
//! For each realized base node, `schedule_uop` walks its expression tree
//! and rebuilds it with every dependency that is *itself* realized
//! elsewhere replaced by a `Load` through a freshly assigned
//! `DefineGlobal` slot — or, when that dependency's buffer is somewhere
//! an `Assign` target, a `Preload` instead, so the distinction survives
//! into the lowered AST for codegen and the buffer is recorded in
//! `LoweredKernel::assign_preloads` for the scheduler's dependency pass.
//! What's left, wrapped in a `Store` into the realize's own output view
//! and a `Sink`, is the kernel's AST.
//!
//! Simplification (documented, see DESIGN.md): full view-hoisting
//! (`view_right`/`swizzle_r`/`reduceop_view_right`/`elementwise_view_right`)
//! pushes a consumer's view *through* a reduction or elementwise chain so
//! the view itself never needs to materialize. Here, because every
//! movement op is already a composed `ShapeTracker` on a `View` node
//! (folding.rs's `merge_adjacent_views`), a `View` directly wrapping a
//! non-realized node is left in place in the lowered AST rather than
//! algebraically swizzled past its producer — the producer is still
//! free to read the view from within the same kernel, at the cost of a
//! less aggressive fusion boundary than the source implementation
//! achieves for reduce/elementwise view placement.

use std::collections::HashMap;

use crate::buffer::Buffer;
use crate::context::ScheduleContext;
use crate::error::ScheduleError;
use crate::op::{Opcode, UOp};

pub struct LoweredKernel {
    pub ast: UOp,
    pub bufs: Vec<Buffer>,
    /// Buffers this kernel reads through a `Preload` rather than a `Load` —
    /// every one is a buffer some `Assign` targets somewhere in the graph,
    /// so a kernel writing it must run after every kernel reading it this
    /// way (spec §4.I rule 2, wired into the dependency graph in
    /// schedule.rs).
    pub assign_preloads: Vec<Buffer>,
}

pub fn schedule_uop(ctx: &ScheduleContext, realized_node: &UOp) -> Result<LoweredKernel, ScheduleError> {
    let _span = tracing::debug_span!("schedule_uop", op = %realized_node.op()).entered();
    let output_view = ctx
        .realizes
        .get(realized_node)
        .unwrap_or_else(|| panic!("schedule_uop called on a node absent from ctx.realizes: {realized_node:?}"))
        .clone();
    let output_buf = output_view
        .src()
        .first()
        .and_then(UOp::buffer)
        .cloned()
        .ok_or_else(|| ScheduleError::InternalInvariantBreach {
            invariant: "realize output must resolve to a Buffer".into(),
            detail: format!("{output_view:?}"),
        })?;

    let mut bufs = vec![output_buf.clone()];
    let mut buf_index: HashMap<Buffer, usize> = HashMap::new();
    buf_index.insert(output_buf.clone(), 0);

    if ctx.assigns.contains(&output_buf) {
        if let Some(self_view) = find_buffer_reference(realized_node, &output_buf) {
            let st = self_view.shapetracker().ok_or_else(|| ScheduleError::InternalInvariantBreach {
                invariant: "a VIEW over a buffer always carries a ShapeTracker".into(),
                detail: format!("{self_view:?}"),
            })?;
            if !st.contiguous() {
                return Err(ScheduleError::NonContiguousSelfAssign {
                    node: format!("{realized_node:?}"),
                    shapetracker: format!("{st}"),
                });
            }
            if self_view == output_view {
                return Err(ScheduleError::AssignCycle { node: format!("{realized_node:?}") });
            }
        }
    }

    let mut assign_preloads = Vec::new();
    let lowered_expr = lower_expr(ctx, realized_node, true, &mut bufs, &mut buf_index, &mut assign_preloads);
    let store = UOp::store(output_view, lowered_expr);
    let ast = UOp::sink(vec![store]);
    tracing::debug!(bufs = bufs.len(), "schedule_uop: lowered");
    Ok(LoweredKernel { ast, bufs, assign_preloads })
}

fn lower_expr(
    ctx: &ScheduleContext,
    node: &UOp,
    is_root: bool,
    bufs: &mut Vec<Buffer>,
    buf_index: &mut HashMap<Buffer, usize>,
    assign_preloads: &mut Vec<Buffer>,
) -> UOp {
    // A realize whose value is nothing but a pass-through of an existing
    // buffer (`group_realizes` stores such a node as its own BUFFER base,
    // past `.base()`'s VIEW-stripping) still has to read that buffer
    // through a DEFINE_GLOBAL, even sitting at the kernel's root — there is
    // no computation to "be" the root here, only a reference to reload.
    let root_is_bare_reference = is_root && node.op() == Opcode::Buffer;
    if !is_root || root_is_bare_reference {
        // `ctx.realizes` would map a bare-reference root to its own output
        // view (this realize's own entry), not an upstream producer — read
        // the buffer directly off the node instead of consulting it.
        let buf = if root_is_bare_reference {
            node.buffer().cloned()
        } else {
            ctx.realizes
                .get(node.base())
                .and_then(|dep_view| dep_view.src().first().and_then(UOp::buffer))
                .or_else(|| node.base().buffer())
                .cloned()
        };
        if let Some(buf) = buf {
            let idx = *buf_index.entry(buf.clone()).or_insert_with(|| {
                bufs.push(buf.clone());
                bufs.len() - 1
            });
            let global = UOp::define_global(idx as i64, buf.dtype().ptr(buf.size()));
            if ctx.assigns.contains(&buf) {
                if !assign_preloads.contains(&buf) {
                    assign_preloads.push(buf.clone());
                }
                return UOp::preload(vec![global], node.dtype().clone());
            }
            return UOp::load(vec![global], node.dtype().clone());
        }
    }

    let new_src: Vec<UOp> = node.src().iter().map(|s| lower_expr(ctx, s, false, bufs, buf_index, assign_preloads)).collect();
    if new_src.iter().zip(node.src()).all(|(a, b)| a == b) {
        node.clone()
    } else {
        node.with_src(new_src)
    }
}

/// Find the first `View` in `node`'s subtree that reads `buf`, whatever
/// shape that view presents it through. Used, pre-lowering, to detect an
/// assign whose value reads its own target buffer through some view — once
/// lowered that reference would become an ordinary `Load`, indistinguishable
/// from reading any other buffer.
fn find_buffer_reference(node: &UOp, buf: &Buffer) -> Option<UOp> {
    if node.op() == Opcode::View && node.base().buffer() == Some(buf) {
        return Some(node.clone());
    }
    node.src().iter().find_map(|s| find_buffer_reference(s, buf))
}
