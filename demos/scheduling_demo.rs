//! Scheduling Pipeline Demonstration
//!
//! This example walks through `create_schedule` on a handful of graphs and
//! prints what each stage decided, stage by stage:
//! 1. Build a tensor op graph by hand (no front-end lazy-tensor layer here,
//!    just the `UOp` IR the scheduler consumes).
//! 2. Schedule it.
//! 3. Inspect the resulting kernels: how many, what each one reads.

use tensorsched::config::SchedulerConfig;
use tensorsched::dtype::DType;
use tensorsched::op::{AluOp, ConstValue, UOp};
use tensorsched::schedule::create_schedule;
use tensorsched::shapetracker::ShapeTracker;

fn output_buffer(shape: Vec<i64>, dtype: DType) -> UOp {
    let device = UOp::device("CPU");
    let size = shape.iter().product::<i64>().max(1) as usize;
    let buf = tensorsched::buffer::Buffer::new("CPU", size, dtype);
    UOp::view(UOp::buffer(device, buf), ShapeTracker::from_shape(shape))
}

fn main() {
    println!("=== tensorsched Scheduling Demo ===\n");
    let cfg = SchedulerConfig::default();

    // ========================================================================
    // Demo 1: A chain of elementwise ops fuses into a single kernel.
    // ========================================================================
    println!("--- Demo 1: Elementwise Fusion ---");

    let a = output_buffer(vec![4, 4], DType::F32);
    let b = output_buffer(vec![4, 4], DType::F32);
    let sum = UOp::alu(AluOp::Add, vec![a, b], DType::F32);
    let one = UOp::constant(DType::F32, ConstValue::Float(1.0));
    let shifted = UOp::alu(AluOp::Mul, vec![sum, one], DType::F32);
    let out = output_buffer(vec![4, 4], DType::F32);
    let sink = UOp::sink(vec![UOp::store(out, shifted)]);

    match create_schedule(&sink, &cfg) {
        Ok((items, _vars, _becomes)) => {
            println!("Scheduled into {} kernel(s)", items.len());
            for (i, item) in items.iter().enumerate() {
                println!("  [{i}] reads {} buffer(s)", item.bufs.len());
            }
        }
        Err(e) => println!("scheduling failed: {e}"),
    }

    // ========================================================================
    // Demo 2: A shared subexpression realizes once, then feeds two consumers.
    // ========================================================================
    println!("\n--- Demo 2: Shared Subexpression Realizes Once ---");

    let x = output_buffer(vec![8], DType::F32);
    let two = UOp::constant(DType::F32, ConstValue::Float(2.0));
    let scaled = UOp::alu(AluOp::Mul, vec![x, two], DType::F32);

    let lhs = UOp::alu(AluOp::Add, vec![scaled.clone(), scaled.clone()], DType::F32);
    let rhs = UOp::reduce_axis(scaled, AluOp::Add, vec![0]);

    let lhs_out = output_buffer(vec![8], DType::F32);
    let rhs_out = output_buffer(vec![1], DType::F32);
    let sink = UOp::sink(vec![UOp::store(lhs_out, lhs), UOp::store(rhs_out, rhs)]);

    match create_schedule(&sink, &cfg) {
        Ok((items, _vars, _becomes)) => {
            println!("Scheduled into {} kernel(s)", items.len());
            println!("(the shared Mul(x, 2) realizes once instead of recomputing in both branches)");
        }
        Err(e) => println!("scheduling failed: {e}"),
    }

    // ========================================================================
    // Demo 3: An invalid non-contiguous self-assign is rejected, not
    // silently miscomputed.
    // ========================================================================
    println!("\n--- Demo 3: Rejecting an Unsafe In-Place Update ---");

    let device = UOp::device("CPU");
    let buf = tensorsched::buffer::Buffer::new("CPU", 4, DType::I32);
    let buf_uop = UOp::buffer(device, buf);
    let target = UOp::view(buf_uop.clone(), ShapeTracker::from_shape(vec![2, 2]));
    let contiguous_read = UOp::view(buf_uop, ShapeTracker::from_shape(vec![2, 2]));
    let permuted_read = UOp::view(contiguous_read, ShapeTracker::from_shape(vec![2, 2]).permute(&[1, 0]));
    let value = UOp::alu(AluOp::Add, vec![permuted_read.clone(), permuted_read], DType::I32);
    let sink = UOp::sink(vec![UOp::assign(target, value)]);

    match create_schedule(&sink, &cfg) {
        Ok((items, _, _)) => println!("unexpected success: {} kernel(s)", items.len()),
        Err(e) => println!("rejected, as expected: {e}"),
    }

    println!("\nDone.");
}
