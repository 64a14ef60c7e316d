//! Component D: folding and realization-adjacent rewrites, run to a fixed
//! point via the generic engine in rewrite.rs.
//!
//! Movement-op removal is structural here rather than a rewrite rule:
//! this crate represents every movement op (reshape/permute/expand/pad/
//! shrink/stride) directly as `View(src, ShapeTracker)` composed through
//! `ShapeTracker`'s own algebra, so there is no separate RESHAPE/PERMUTE/…
//! opcode for a folding pass to collapse — a `View` whose source is
//! another `View` is the only shape left to merge, which
//! `merge_adjacent_views` below handles.

use std::collections::HashMap;

use crate::dtype::DType;
use crate::op::{AluOp, ConstValue, Opcode, UOp, UOpArg};
use crate::rewrite::{graph_rewrite, Rule};
use crate::shapetracker::Variable;

#[derive(Default)]
pub struct FoldContext {
    pub var_vals: HashMap<Variable, i64>,
}

/// Fold `root` to a fixed point, returning the rewritten graph and any
/// variable bindings resolved along the way (merge these into the
/// scheduler's overall `var_vals`).
pub fn fold(root: &UOp) -> (UOp, HashMap<Variable, i64>) {
    let _span = tracing::debug_span!("fold").entered();
    let rules = folding_rules();
    let mut ctx = FoldContext::default();
    let rewritten = graph_rewrite(root, &rules, &mut ctx);
    tracing::debug!(resolved_vars = ctx.var_vals.len(), "fold: done");
    (rewritten, ctx.var_vals)
}

fn folding_rules() -> Vec<Rule<FoldContext>> {
    vec![
        Box::new(constant_fold_alu),
        Box::new(constant_fold_reduce),
        Box::new(identity_add_zero),
        Box::new(identity_mul_one_or_zero),
        Box::new(merge_adjacent_views),
        Box::new(collapse_double_contiguous),
        Box::new(bind_resolves_var),
        Box::new(merge_double_reduce),
        Box::new(fold_image_cast),
        Box::new(fold_disk_buffer_view),
    ]
}

/// Conservative predicate for whether `node` can absorb a pad (an enclosing
/// masked `View`) without forcing a realize first. `Const`/`Buffer` read the
/// same value or location regardless of padding; `Contiguous` is already a
/// realize-adjacent boundary so what pads around it is the caller's
/// problem; elementwise ops are safe exactly when every source is.
/// Anything that reads memory in a pattern the pad would disturb —
/// `ReduceAxis`, `Assign`, `Copy`, `BufferView`, `Load` — is unsafe.
pub fn can_pad(node: &UOp) -> bool {
    match node.op() {
        Opcode::Const | Opcode::Buffer | Opcode::Contiguous => true,
        Opcode::View => node.src().first().is_none_or(can_pad),
        Opcode::Alu(_) | Opcode::Cast | Opcode::Bitcast | Opcode::Detach => node.src().iter().all(can_pad),
        _ => false,
    }
}

fn as_int(node: &UOp) -> Option<i64> {
    match node.arg() {
        UOpArg::Const(ConstValue::Int(i)) => Some(*i),
        UOpArg::Const(ConstValue::Bool(b)) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_float(node: &UOp) -> Option<f64> {
    match node.arg() {
        UOpArg::Const(ConstValue::Float(f)) => Some(*f),
        _ => as_int(node).map(|i| i as f64),
    }
}

fn constant_fold_alu(node: &UOp, _ctx: &mut FoldContext) -> Option<UOp> {
    let Opcode::Alu(op) = node.op() else { return None };
    let srcs = node.src();
    if !srcs.iter().all(|s| s.op() == Opcode::Const) {
        return None;
    }
    let dtype = node.dtype().clone();
    if dtype.is_float() {
        let vals: Vec<f64> = srcs.iter().map(as_float).collect::<Option<_>>()?;
        let folded = apply_float(op, &vals)?;
        return Some(UOp::constant(dtype, ConstValue::Float(folded)));
    }
    let vals: Vec<i64> = srcs.iter().map(as_int).collect::<Option<_>>()?;
    let folded = apply_int(op, &vals)?;
    Some(UOp::constant(dtype, ConstValue::Int(folded)))
}

fn apply_int(op: AluOp, vals: &[i64]) -> Option<i64> {
    Some(match (op, vals) {
        (AluOp::Add, [a, b]) => a + b,
        (AluOp::Sub, [a, b]) => a - b,
        (AluOp::Mul, [a, b]) => a * b,
        (AluOp::Div, [a, b]) if *b != 0 => a / b,
        (AluOp::Mod, [a, b]) if *b != 0 => a % b,
        (AluOp::Max, [a, b]) => *a.max(b),
        (AluOp::Min, [a, b]) => *a.min(b),
        (AluOp::And, [a, b]) => a & b,
        (AluOp::Or, [a, b]) => a | b,
        (AluOp::Xor, [a, b]) => a ^ b,
        (AluOp::Neg, [a]) => -a,
        _ => return None,
    })
}

fn apply_float(op: AluOp, vals: &[f64]) -> Option<f64> {
    Some(match (op, vals) {
        (AluOp::Add, [a, b]) => a + b,
        (AluOp::Sub, [a, b]) => a - b,
        (AluOp::Mul, [a, b]) => a * b,
        (AluOp::Div, [a, b]) if *b != 0.0 => a / b,
        (AluOp::Max, [a, b]) => a.max(*b),
        (AluOp::Min, [a, b]) => a.min(*b),
        (AluOp::Neg, [a]) => -a,
        (AluOp::Recip, [a]) if *a != 0.0 => 1.0 / a,
        (AluOp::Sqrt, [a]) if *a >= 0.0 => a.sqrt(),
        (AluOp::Exp2, [a]) => a.exp2(),
        (AluOp::Log2, [a]) if *a > 0.0 => a.log2(),
        (AluOp::Sin, [a]) => a.sin(),
        _ => return None,
    })
}

/// `ReduceAxis(Const(c)[shape], op, axes)` folds to a single `Const`: a
/// reduction over a uniform value only depends on how many elements the
/// reduced axes span, not on anything the device would need a kernel for.
fn constant_fold_reduce(node: &UOp, _ctx: &mut FoldContext) -> Option<UOp> {
    let Opcode::ReduceAxis = node.op() else { return None };
    let UOpArg::Reduce(op, axes) = node.arg().clone() else { return None };
    let [src] = node.src() else { return None };

    let (base, shape, masked) = match src.op() {
        Opcode::View => (src.src().first()?, src.shapetracker()?.shape().to_vec(), src.shapetracker()?.mask().is_some()),
        _ => (src, Vec::new(), false),
    };
    // A masked constant view (e.g. an arange's triangular pattern) sums a
    // different count of elements per output position — not a uniform
    // product, so it is not safe to fold to one scalar.
    if base.op() != Opcode::Const || masked {
        return None;
    }
    let count: i64 = axes.iter().map(|&a| shape.get(a).copied().unwrap_or(1)).product();
    if count <= 0 {
        return None;
    }
    let dtype = node.dtype().clone();
    if dtype.is_float() {
        let v = as_float(base)?;
        let folded = match op {
            AluOp::Add => v * count as f64,
            AluOp::Mul => v.powi(count as i32),
            AluOp::Max | AluOp::Min => v,
            _ => return None,
        };
        Some(UOp::constant(dtype, ConstValue::Float(folded)))
    } else {
        let v = as_int(base)?;
        let folded = match op {
            AluOp::Add => v * count,
            AluOp::Mul => v.pow(u32::try_from(count).ok()?),
            AluOp::Max | AluOp::Min => v,
            AluOp::And => v,
            AluOp::Or => v,
            _ => return None,
        };
        Some(UOp::constant(dtype, ConstValue::Int(folded)))
    }
}

fn identity_add_zero(node: &UOp, _ctx: &mut FoldContext) -> Option<UOp> {
    let Opcode::Alu(AluOp::Add) = node.op() else { return None };
    let [a, b] = node.src() else { return None };
    if matches!(b.arg(), UOpArg::Const(ConstValue::Int(0))) || matches!(b.arg(), UOpArg::Const(ConstValue::Float(f)) if *f == 0.0) {
        return Some(a.clone());
    }
    if matches!(a.arg(), UOpArg::Const(ConstValue::Int(0))) || matches!(a.arg(), UOpArg::Const(ConstValue::Float(f)) if *f == 0.0) {
        return Some(b.clone());
    }
    None
}

fn identity_mul_one_or_zero(node: &UOp, _ctx: &mut FoldContext) -> Option<UOp> {
    let Opcode::Alu(AluOp::Mul) = node.op() else { return None };
    let [a, b] = node.src() else { return None };
    let is_one = |n: &UOp| matches!(n.arg(), UOpArg::Const(ConstValue::Int(1))) || matches!(n.arg(), UOpArg::Const(ConstValue::Float(f)) if *f == 1.0);
    let is_zero = |n: &UOp| matches!(n.arg(), UOpArg::Const(ConstValue::Int(0))) || matches!(n.arg(), UOpArg::Const(ConstValue::Float(f)) if *f == 0.0);
    if is_zero(a) {
        return Some(a.clone());
    }
    if is_zero(b) {
        return Some(b.clone());
    }
    if is_one(b) {
        return Some(a.clone());
    }
    if is_one(a) {
        return Some(b.clone());
    }
    None
}

/// `View(View(base, inner), outer)` -> `View(base, inner + outer)`. The
/// only "movement op removal" left to do once movement is represented
/// structurally (see module docs).
fn merge_adjacent_views(node: &UOp, _ctx: &mut FoldContext) -> Option<UOp> {
    if node.op() != Opcode::View {
        return None;
    }
    let [inner] = node.src() else { return None };
    if inner.op() != Opcode::View {
        return None;
    }
    let [base] = inner.src() else { return None };
    let composed = inner.shapetracker()?.clone() + node.shapetracker()?.clone();
    Some(UOp::view(base.clone(), composed))
}

fn collapse_double_contiguous(node: &UOp, _ctx: &mut FoldContext) -> Option<UOp> {
    if node.op() != Opcode::Contiguous {
        return None;
    }
    let [src] = node.src() else { return None };
    if src.op() == Opcode::Contiguous {
        Some(src.clone())
    } else {
        None
    }
}

/// `BIND(DEFINE_VAR, CONST)` records the binding and folds away to the
/// `DEFINE_VAR` itself, so every later pass sees one symbolic handle per
/// variable rather than a BIND/DEFINE_VAR pair.
fn bind_resolves_var(node: &UOp, ctx: &mut FoldContext) -> Option<UOp> {
    if node.op() != Opcode::Bind {
        return None;
    }
    let [var, value] = node.src() else { return None };
    if var.op() != Opcode::DefineVar {
        return None;
    }
    let UOpArg::Var(variable) = var.arg() else { return None };
    let bound = as_int(value)?;
    ctx.var_vals.insert(variable.clone(), bound);
    Some(var.clone())
}

/// `ReduceAxis(op2, axes2)` over another `ReduceAxis(op1, axes1)` with the
/// same `AluOp` merges into one reduce over the union of both axis sets,
/// reducing the inner reduce's own source directly — two passes over the
/// same data become one (mirrors `FUSE_CONV_BW`'s double-reduce merge).
/// `ReduceAxis` never removes a dimension (it only zeroes it, see
/// `ShapeTracker::reduce`), so `axes1`/`axes2` index the same shape and can
/// simply be unioned.
fn merge_double_reduce(node: &UOp, _ctx: &mut FoldContext) -> Option<UOp> {
    let Opcode::ReduceAxis = node.op() else { return None };
    let UOpArg::Reduce(op2, axes2) = node.arg().clone() else { return None };
    let [src] = node.src() else { return None };
    let inner = if src.op() == Opcode::View { src.src().first()? } else { src };
    let Opcode::ReduceAxis = inner.op() else { return None };
    let UOpArg::Reduce(op1, axes1) = inner.arg().clone() else { return None };
    if op1 != op2 {
        return None;
    }
    let mut axes = axes1;
    for a in axes2 {
        if !axes.contains(&a) {
            axes.push(a);
        }
    }
    axes.sort_unstable();
    let [inner_src] = inner.src() else { return None };
    Some(UOp::reduce_axis(inner_src.clone(), op1, axes))
}

/// A `CAST` between two `IMAGE` dtypes of equal item size is a pure
/// reinterpretation of the same bytes — demote it to `BITCAST` so it never
/// forces a realize boundary the way an arbitrary `CAST` would.
fn fold_image_cast(node: &UOp, _ctx: &mut FoldContext) -> Option<UOp> {
    let Opcode::Cast = node.op() else { return None };
    let [src] = node.src() else { return None };
    if !src.dtype().is_image() || !node.dtype().is_image() {
        return None;
    }
    if src.dtype().itemsize() != node.dtype().itemsize() {
        return None;
    }
    Some(UOp::bitcast(src.clone(), node.dtype().clone()))
}

/// `Contiguous`/`Bitcast` directly over a `View(Buffer)` on a disk device
/// reinterprets a byte range of an already-mapped file — no kernel needed,
/// just a new `Buffer` handle sharing the same allocation at a new
/// offset/dtype.
fn fold_disk_buffer_view(node: &UOp, _ctx: &mut FoldContext) -> Option<UOp> {
    if !matches!(node.op(), Opcode::Contiguous | Opcode::Bitcast) {
        return None;
    }
    let [src] = node.src() else { return None };
    if src.op() != Opcode::View {
        return None;
    }
    let [base] = src.src() else { return None };
    let buf = base.buffer()?;
    if !buf.device().starts_with("DISK") {
        return None;
    }
    let st = src.shapetracker()?;
    if !st.contiguous() {
        return None;
    }
    let itemsize = node.dtype().itemsize();
    if itemsize == 0 {
        return None;
    }
    let offset_bytes = st.views().first()?.offset as usize * buf.dtype().itemsize();
    if offset_bytes % itemsize != 0 {
        return None;
    }
    let aliased = buf.view(st.size() as usize, node.dtype().clone(), offset_bytes);
    let device = base.src().first()?.clone();
    Some(UOp::buffer_view(device, aliased))
}
