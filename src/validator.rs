//! Component B: the tensor-IR validator. Runs once, on the incoming
//! `Sink`, before any rewriting starts — catches a malformed graph early
//! rather than letting later passes fail in confusing ways.
//!
//! This is a representative subset of the full IR spec, not an exhaustive
//! re-derivation of every invariant the type system could in principle
//! enforce (see DESIGN.md): each rule below is one a later pass actually
//! depends on holding.

use std::collections::HashSet;

use crate::error::ScheduleError;
use crate::op::{Opcode, UOp};

pub fn validate(sink: &UOp) -> Result<(), ScheduleError> {
    let _span = tracing::debug_span!("validate").entered();
    if sink.op() != Opcode::Sink {
        return Err(violation("root of the graph passed to create_schedule must be SINK", sink));
    }
    let mut seen = HashSet::new();
    let mut stack = vec![sink.clone()];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.identity()) {
            continue;
        }
        check_node(&node)?;
        stack.extend(node.src().iter().cloned());
    }
    tracing::debug!(nodes = seen.len(), "validate: done");
    Ok(())
}

fn check_node(node: &UOp) -> Result<(), ScheduleError> {
    match node.op() {
        Opcode::Sink => {
            for child in node.src() {
                if !matches!(child.op(), Opcode::Store | Opcode::Assign) {
                    return Err(violation("SINK children must be STORE or ASSIGN", node));
                }
            }
        }
        Opcode::View => {
            if node.src().len() > 1 {
                return Err(violation("VIEW must have at most one source", node));
            }
            if let [child] = node.src() {
                let st = node.shapetracker().expect("VIEW always carries a ShapeTracker arg");
                match child.op() {
                    Opcode::Buffer => {
                        if !st.contiguous() {
                            return Err(violation("VIEW(BUFFER) must be contiguous", node));
                        }
                        if let Some(buf) = child.buffer() {
                            if st.size() as usize != buf.size() {
                                return Err(violation("VIEW(BUFFER) must be size-matched to its buffer", node));
                            }
                        }
                    }
                    Opcode::Const => {
                        if st.views().iter().any(|v| v.strides.iter().any(|&s| s != 0)) {
                            return Err(violation("VIEW(CONST) must carry an all-zero-stride view — a constant has no position to stride over", node));
                        }
                        if st.mask().is_some() {
                            return Err(violation("VIEW(CONST) must be unmasked", node));
                        }
                    }
                    _ => {
                        let demoted_ok = child.dtype().is_image() && *node.dtype() == child.dtype().demoted_to_base();
                        if node.dtype() != child.dtype() && !demoted_ok {
                            return Err(violation("VIEW must preserve its source's dtype (except demoting an already-realized IMAGE to its base)", node));
                        }
                    }
                }
            }
        }
        Opcode::Copy => {
            let [src, device] = node.src() else {
                return Err(violation("COPY must have exactly two sources", node));
            };
            if device.op() != Opcode::Device {
                return Err(violation("COPY second source must be a DEVICE", node));
            }
            if node.dtype() != src.dtype() {
                return Err(violation("COPY must preserve its source's dtype", node));
            }
        }
        Opcode::Assign => {
            let [target, value] = node.src() else {
                return Err(violation("ASSIGN must have exactly two sources", node));
            };
            if target.base().op() != Opcode::Buffer {
                return Err(violation("ASSIGN target must resolve to a BUFFER", node));
            }
            if target.dtype() != value.dtype() {
                return Err(violation("ASSIGN target/value dtype mismatch", node));
            }
        }
        Opcode::Bind => {
            let [var, _val] = node.src() else {
                return Err(violation("BIND must have exactly two sources", node));
            };
            if var.op() != Opcode::DefineVar {
                return Err(violation("BIND first source must be DEFINE_VAR", node));
            }
        }
        Opcode::ReduceAxis => {
            if node.src().len() != 1 {
                return Err(violation("REDUCE_AXIS must have exactly one source", node));
            }
        }
        _ => {}
    }
    Ok(())
}

fn violation(rule: &str, node: &UOp) -> ScheduleError {
    ScheduleError::IrSpecViolation { rule: rule.to_string(), node: format!("{node:?}") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::op::ConstValue;

    #[test]
    fn rejects_non_sink_root() {
        let c = UOp::constant(DType::I32, ConstValue::Int(1));
        assert!(validate(&c).is_err());
    }

    #[test]
    fn accepts_sink_over_store() {
        let device = UOp::device("CPU");
        let buf = crate::buffer::Buffer::new("CPU", 4, DType::I32);
        let buf_uop = UOp::buffer(device, buf);
        let view = UOp::view(buf_uop, crate::shapetracker::ShapeTracker::from_shape(vec![4]));
        let value = UOp::constant(DType::I32, ConstValue::Int(0));
        let store = UOp::store(view, value);
        let sink = UOp::sink(vec![store]);
        assert!(validate(&sink).is_ok());
    }

    #[test]
    fn rejects_sink_child_that_is_not_store_or_assign() {
        let c = UOp::constant(DType::I32, ConstValue::Int(1));
        let sink = UOp::sink(vec![c]);
        assert!(validate(&sink).is_err());
    }

    #[test]
    fn rejects_noncontiguous_view_over_buffer() {
        let device = UOp::device("CPU");
        let buf = crate::buffer::Buffer::new("CPU", 8, DType::I32);
        let buf_uop = UOp::buffer(device, buf);
        let bad_view = UOp::view(
            buf_uop,
            crate::shapetracker::ShapeTracker::from_shape(vec![4, 4]).shrink(&[(0, 2), (0, 2)]),
        );
        let value = UOp::constant(DType::I32, ConstValue::Int(0));
        let store = UOp::store(bad_view, value);
        let sink = UOp::sink(vec![store]);
        assert!(validate(&sink).is_err());
    }

    #[test]
    fn accepts_broadcast_view_over_const() {
        let c = UOp::constant(DType::I32, ConstValue::Int(2));
        let broadcast = UOp::view(c, crate::shapetracker::ShapeTracker::from_shape(vec![1, 1]).expand(&[4, 4]));
        let store = UOp::store(broadcast.clone(), broadcast);
        let sink = UOp::sink(vec![store]);
        assert!(validate(&sink).is_ok());
    }

    #[test]
    fn rejects_masked_view_over_const() {
        let c = UOp::constant(DType::I32, ConstValue::Int(2));
        let masked = crate::shapetracker::View::create(vec![4], vec![0], 0, Some(vec![(0, 4)]));
        let view = UOp::view(c, crate::shapetracker::ShapeTracker::from_view(masked));
        let store = UOp::store(view.clone(), view);
        let sink = UOp::sink(vec![store]);
        assert!(validate(&sink).is_err());
    }

    #[test]
    fn rejects_view_that_changes_dtype_of_a_non_buffer_source() {
        let x = UOp::constant(DType::I32, ConstValue::Int(1));
        let view = UOp::view(x, crate::shapetracker::ShapeTracker::from_shape(vec![1]));
        // swap in a differently-typed source while `with_src` keeps the VIEW's own dtype fixed
        let y = UOp::constant(DType::F32, ConstValue::Float(1.0));
        let mismatched_src = UOp::alu(crate::op::AluOp::Add, vec![y.clone(), y], DType::F32);
        let mismatched = view.with_src(vec![mismatched_src]);
        let store = UOp::store(mismatched.clone(), mismatched);
        let sink = UOp::sink(vec![store]);
        assert!(validate(&sink).is_err());
    }

    #[test]
    fn rejects_copy_with_non_device_second_source() {
        let src = UOp::constant(DType::I32, ConstValue::Int(1));
        let not_a_device = UOp::constant(DType::I32, ConstValue::Int(0));
        let copy = UOp::copy(src, not_a_device);
        let store = UOp::store(copy.clone(), copy);
        let sink = UOp::sink(vec![store]);
        assert!(validate(&sink).is_err());
    }

    #[test]
    fn accepts_copy_to_a_real_device() {
        let src = UOp::constant(DType::I32, ConstValue::Int(1));
        let device = UOp::device("GPU");
        let copy = UOp::copy(src, device);
        let store = UOp::store(copy.clone(), copy);
        let sink = UOp::sink(vec![store]);
        assert!(validate(&sink).is_ok());
    }
}
