//! Configuration and Image-DType Demonstration
//!
//! This example shows:
//! 1. Loading `SchedulerConfig` from `TENSORSCHED_*` environment variables.
//! 2. A kernel realize carrying an `Image` dtype that tiles cleanly, kept as
//!    an image.
//! 3. The same dtype on a shape that does not tile into 4-wide rows,
//!    demoted back to its base scalar type.

use tensorsched::config::SchedulerConfig;
use tensorsched::dtype::DType;
use tensorsched::op::{AluOp, UOp};
use tensorsched::schedule::create_schedule;
use tensorsched::shapetracker::ShapeTracker;

fn main() {
    println!("=== tensorsched Config + Image DType Demo ===\n");

    // ========================================================================
    // Demo 1: Config loading
    // ========================================================================
    println!("--- Demo 1: Config ---");
    let default_cfg = SchedulerConfig::default();
    println!("default config: {default_cfg:?}");

    let env_cfg = SchedulerConfig::from_env().unwrap_or_else(|e| {
        println!("falling back to defaults ({e})");
        SchedulerConfig::default()
    });
    println!("env-loaded config: {env_cfg:?}\n");

    // ========================================================================
    // Demo 2: Image dtype on a tiling-friendly shape
    // ========================================================================
    println!("--- Demo 2: Image DType Tiling ---");

    let image_dtype = DType::Image { base: Box::new(DType::F32), shape: (4, 4) };
    let device = UOp::device("CPU");
    let tiling_buf = tensorsched::buffer::Buffer::new("CPU", 16, image_dtype.demoted_to_base());
    let a = UOp::view(UOp::buffer(device.clone(), tiling_buf), ShapeTracker::from_shape(vec![4, 4]));
    let b = a.clone();
    let sum = UOp::alu(AluOp::Add, vec![a, b], DType::F32);
    let out_buf = tensorsched::buffer::Buffer::new("CPU", 16, DType::F32);
    let out = UOp::view(UOp::buffer(device, out_buf), ShapeTracker::from_shape(vec![4, 4]));
    let sink = UOp::sink(vec![UOp::store(out, sum)]);

    let cfg = SchedulerConfig::default();
    match create_schedule(&sink, &cfg) {
        Ok((items, _, _)) => println!("scheduled {} kernel(s) over a 4x4 tile-friendly shape", items.len()),
        Err(e) => println!("scheduling failed: {e}"),
    }

    println!("\nDone.");
}
