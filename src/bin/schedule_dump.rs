//! Builds one of a handful of canned tensor op graphs, schedules it, and
//! prints the resulting kernels. Useful for eyeballing what `create_schedule`
//! does to a given shape without writing a test.
//!
//! ```bash
//! cargo run --bin schedule-dump -- --graph elementwise-chain
//! TENSORSCHED_DEBUG_LEVEL=1 cargo run --bin schedule-dump -- --graph shared-subexpr
//! ```

use clap::{Parser, ValueEnum};
use tensorsched::config::SchedulerConfig;
use tensorsched::op::{AluOp, ConstValue, UOp};
use tensorsched::schedule::create_schedule;
use tensorsched::shapetracker::ShapeTracker;
use tensorsched::dtype::DType;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Graph {
    /// a single elementwise add, store to one buffer
    ElementwiseChain,
    /// a node consumed twice forces its own realize
    SharedSubexpr,
    /// a sum reduction into a scalar
    Reduction,
}

#[derive(Parser, Debug)]
#[command(name = "schedule-dump", about = "Dump the schedule for a canned tensor op graph")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Graph::ElementwiseChain)]
    graph: Graph,
}

fn build(graph: Graph) -> UOp {
    let device = UOp::device("CPU");
    let out_buf = tensorsched::buffer::Buffer::new("CPU", 1, DType::F32);
    let out_view = UOp::view(UOp::buffer(device, out_buf), ShapeTracker::from_shape(vec![1]));

    match graph {
        Graph::ElementwiseChain => {
            let a = UOp::constant(DType::F32, ConstValue::Float(1.0));
            let b = UOp::constant(DType::F32, ConstValue::Float(2.0));
            let sum = UOp::alu(AluOp::Add, vec![a, b], DType::F32);
            let doubled = UOp::alu(AluOp::Mul, vec![sum.clone(), sum], DType::F32);
            UOp::sink(vec![UOp::store(out_view, doubled)])
        }
        Graph::SharedSubexpr => {
            let leaf = UOp::constant(DType::F32, ConstValue::Float(3.0));
            let shared = UOp::alu(AluOp::Mul, vec![leaf.clone(), leaf], DType::F32);
            let lhs = UOp::alu(AluOp::Add, vec![shared.clone(), shared.clone()], DType::F32);
            let rhs = UOp::alu(AluOp::Sub, vec![shared.clone(), shared], DType::F32);
            let combined = UOp::alu(AluOp::Add, vec![lhs, rhs], DType::F32);
            UOp::sink(vec![UOp::store(out_view, combined)])
        }
        Graph::Reduction => {
            let src = UOp::constant(DType::F32, ConstValue::Float(1.0));
            let reduced = UOp::reduce_axis(src, AluOp::Add, vec![0]);
            UOp::sink(vec![UOp::store(out_view, reduced)])
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let cfg = SchedulerConfig::from_env().unwrap_or_default();
    let sink = build(cli.graph);

    match create_schedule(&sink, &cfg) {
        Ok((items, var_vals, becomes_map)) => {
            println!("schedule: {} kernel(s)", items.len());
            for (i, item) in items.iter().enumerate() {
                println!("  [{i}] ast = {:?}, bufs = {}", item.ast.op(), item.bufs.len());
            }
            if !var_vals.is_empty() {
                println!("resolved vars: {var_vals:?}");
            }
            if !becomes_map.is_empty() {
                println!("becomes_map entries: {}", becomes_map.len());
            }
        }
        Err(e) => {
            eprintln!("scheduling failed: {e}");
            std::process::exit(1);
        }
    }
}
