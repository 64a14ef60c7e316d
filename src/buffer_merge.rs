//! Component E: the buffer merge pass. Buffer injection mints a fresh
//! buffer per realized node in isolation; this pass reconciles the one
//! case that must instead alias an *existing* buffer: an `ASSIGN` whose
//! value is computed into the same storage its target already owns
//! (in-place update). Without this, the value side would realize into a
//! brand new allocation and the assign would become a copy rather than an
//! in-place write.
//!
//! Every rewrite performed here is also recorded in `ctx.becomes_map`, the
//! map `create_schedule` hands back so callers can translate references to
//! the old (pre-merge) buffer view into the merged one.

use std::collections::HashSet;

use crate::context::ScheduleContext;
use crate::op::{Opcode, UOp};

pub fn merge_assign_buffers(ctx: &mut ScheduleContext, sink: &UOp) {
    let _span = tracing::debug_span!("merge_assign_buffers").entered();
    let mut seen = HashSet::new();
    let mut stack = vec![sink.clone()];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.identity()) {
            continue;
        }
        if node.op() == Opcode::Assign {
            let target = node.src()[0].base().clone();
            let value = node.src()[1].base().clone();
            if let (Some(target_view), Some(value_view)) = (ctx.realizes.get(&target).cloned(), ctx.realizes.get(&value).cloned()) {
                if target_view != value_view {
                    ctx.becomes_map.insert(value_view.clone(), target_view.clone());
                    ctx.realizes.insert(value, target_view);
                }
            }
        }
        stack.extend(node.src().iter().cloned());
    }
    tracing::debug!(aliased = ctx.becomes_map.len(), "merge_assign_buffers: done");
}
