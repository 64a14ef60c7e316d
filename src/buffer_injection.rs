//! Component C: buffer injection. For every node the fusion pass decided
//! must be realized (materialized to memory rather than fused into its
//! consumer), make sure it has a backing `Buffer` and register the
//! `base -> View(Buffer)` mapping in `ctx.realizes` — this is the map
//! `buffer_merge.rs` and `kernel_lowering.rs` read from.
//!
//! A realize with a `forced_outputs` entry (it came straight from a
//! `SINK` child) uses that exact view rather than minting a new buffer —
//! the caller already named the destination. Everything else gets a fresh
//! allocation sized from its own shape, after a possible image-dtype
//! demotion (see [`demoted_dtype`]).

use std::collections::{HashMap, HashSet};

use crate::buffer::Buffer;
use crate::context::ScheduleContext;
use crate::dtype::DType;
use crate::op::{Opcode, UOp};
use crate::shapetracker::ShapeTracker;

pub fn inject_buffers(ctx: &mut ScheduleContext, realizes: &HashSet<UOp>, forced_outputs: &HashMap<UOp, UOp>, device: &str) {
    inject_buffers_with_debug(ctx, realizes, forced_outputs, device, 0);
}

pub fn inject_buffers_with_debug(ctx: &mut ScheduleContext, realizes: &HashSet<UOp>, forced_outputs: &HashMap<UOp, UOp>, device: &str, debug_level: u8) {
    for node in realizes {
        if ctx.realizes.contains_key(node) {
            continue;
        }
        if let Some(forced) = forced_outputs.get(node) {
            if let Some(buf) = forced.base().buffer() {
                ctx.allbufs.insert(buf.clone(), forced.clone());
            }
            ctx.realizes.insert(node.clone(), forced.clone());
            continue;
        }
        if let Some(existing) = already_buffer_backed(node) {
            ctx.realizes.insert(node.clone(), existing);
            continue;
        }
        let shape = node.shapetracker().map_or_else(Vec::new, |st| st.shape().to_vec());
        let size = shape.iter().product::<i64>().max(1) as usize;
        let dtype = demoted_dtype(node.dtype(), &shape, node, debug_level);
        let buf = Buffer::new(device, size, dtype);
        let device_uop = UOp::device(device);
        let buf_uop = UOp::buffer(device_uop, buf.clone());
        let view = UOp::view(buf_uop, ShapeTracker::from_shape(shape));
        ctx.allbufs.insert(buf, view.clone());
        ctx.realizes.insert(node.clone(), view);
    }
}

/// An `Image` dtype can only back a buffer whose shape tiles into 4-wide
/// rows along a unit-stride axis (the device's texture unit reads 4
/// elements at a time). When no axis qualifies, fall back to the image's
/// scalar base dtype rather than minting a buffer the device can't
/// actually address as a texture.
fn demoted_dtype(dtype: &DType, shape: &[i64], node: &UOp, debug_level: u8) -> DType {
    if !dtype.is_image() {
        return dtype.clone();
    }
    let tileable = ShapeTracker::from_shape(shape.to_vec())
        .views()
        .last()
        .is_some_and(|v| v.unit_stride_axes().iter().any(|&axis| shape.get(axis).is_some_and(|&d| d % 4 == 0)));
    if tileable {
        dtype.clone()
    } else {
        if debug_level >= 2 {
            tracing::debug!(node = %node, from = %dtype, to = %dtype.demoted_to_base(), "demoting image dtype: shape has no 4-wide unit-stride axis");
        }
        dtype.demoted_to_base()
    }
}

fn already_buffer_backed(node: &UOp) -> Option<UOp> {
    if node.op() == Opcode::View && node.src().first().is_some_and(|s| s.op() == Opcode::Buffer) {
        Some(node.clone())
    } else {
        None
    }
}
