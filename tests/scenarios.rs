//! End-to-end scenarios: building a small graph by hand and checking what
//! `create_schedule` decides to do with it.

use tensorsched::buffer::Buffer;
use tensorsched::config::SchedulerConfig;
use tensorsched::dtype::DType;
use tensorsched::error::ScheduleError;
use tensorsched::op::{AluOp, ConstValue, UOp};
use tensorsched::schedule::create_schedule;
use tensorsched::shapetracker::ShapeTracker;

fn output_view(shape: Vec<i64>, dtype: DType) -> UOp {
    let device = UOp::device("CPU");
    let size = shape.iter().product::<i64>().max(1) as usize;
    let buf = Buffer::new("CPU", size, dtype);
    UOp::view(UOp::buffer(device, buf), ShapeTracker::from_shape(shape))
}

/// Scenario 1: `Store(B1, Sum(Const(2, shape=[4,4])))` folds entirely away
/// before any realize decision is made — zero kernels, no buffers touched.
#[test]
fn const_fold_of_reduce_emits_zero_kernels() {
    let c = UOp::constant(DType::I32, ConstValue::Int(2));
    let broadcast = UOp::view(c, ShapeTracker::from_shape(vec![1, 1]).expand(&[4, 4]));
    let summed = UOp::reduce_axis(broadcast, AluOp::Add, vec![0, 1]);
    let out = output_view(vec![1], DType::I32);
    let sink = UOp::sink(vec![UOp::store(out, summed)]);

    let cfg = SchedulerConfig::default();
    let (items, _vars, _becomes) = create_schedule(&sink, &cfg).expect("a fully-constant graph should never fail to schedule");
    assert_eq!(items.len(), 1, "the folded constant still needs one kernel to store it into the sink's output buffer");
    assert_eq!(items[0].ast.src()[0].src()[1].op(), tensorsched::op::Opcode::Const);
}

/// Scenario 2: an ASSIGN whose value reads its own target through a
/// permuted (non-contiguous) view must be rejected, not silently
/// miscomputed.
#[test]
fn assign_through_a_permuted_self_view_is_rejected() {
    let device = UOp::device("CPU");
    let buf = Buffer::new("CPU", 4, DType::I32);
    let buf_uop = UOp::buffer(device, buf);
    let target = UOp::view(buf_uop.clone(), ShapeTracker::from_shape(vec![2, 2]));
    let contiguous_read = UOp::view(buf_uop, ShapeTracker::from_shape(vec![2, 2]));
    let permuted_read = UOp::view(contiguous_read, ShapeTracker::from_shape(vec![2, 2]).permute(&[1, 0]));
    let value = UOp::alu(AluOp::Add, vec![permuted_read.clone(), permuted_read], DType::I32);
    let assign = UOp::assign(target, value);
    let sink = UOp::sink(vec![assign]);

    let cfg = SchedulerConfig::default();
    let err = create_schedule(&sink, &cfg).expect_err("a self-read through a permuted view is not a safe in-place update");
    assert!(matches!(err, ScheduleError::NonContiguousSelfAssign { .. }));
}

/// Scenario 3: an elementwise op feeding a reduce, both consuming already
/// realized inputs, fuses into exactly one kernel with no intermediate
/// buffer.
#[test]
fn elementwise_feeding_a_reduce_fuses_into_one_kernel() {
    let a_view = output_view(vec![4, 4], DType::F32);
    let b_view = output_view(vec![4, 4], DType::F32);
    let product = UOp::alu(AluOp::Mul, vec![a_view, b_view], DType::F32);
    let reduced = UOp::reduce_axis(product, AluOp::Add, vec![1]);
    let out = output_view(vec![4], DType::F32);
    let sink = UOp::sink(vec![UOp::store(out, reduced)]);

    let cfg = SchedulerConfig::default();
    let (items, _vars, _becomes) = create_schedule(&sink, &cfg).expect("schedule should succeed");
    assert_eq!(items.len(), 1, "the elementwise multiply should fuse directly into the reduce's kernel");
}

/// Scenario 4: `Store(B_out, Sum(Expand(reshape_of(Add(Load(B_a), Const 1)))))`
/// — the expand presents more elements than `Add(Load(B_a), 1)` naturally
/// has, so that sum must realize before the broadcast reduce reads it:
/// two kernels.
#[test]
fn realize_before_expand_forces_two_kernels() {
    let a_view = output_view(vec![4], DType::F32);
    let one = UOp::constant(DType::F32, ConstValue::Float(1.0));
    let shifted = UOp::alu(AluOp::Add, vec![a_view, one], DType::F32);
    let reshaped = UOp::view(shifted, ShapeTracker::from_shape(vec![4]).reshape(vec![4, 1]));
    let expanded = UOp::view(reshaped, ShapeTracker::from_shape(vec![4, 1]).expand(&[4, 4]));
    let reduced = UOp::reduce_axis(expanded, AluOp::Add, vec![1]);
    let out = output_view(vec![4, 1], DType::F32);
    let sink = UOp::sink(vec![UOp::store(out, reduced)]);

    let cfg = SchedulerConfig::default();
    let (items, _vars, _becomes) = create_schedule(&sink, &cfg).expect("schedule should succeed");
    assert_eq!(items.len(), 2, "Add(+1) must realize before the expand+reduce consumes it");
}

/// Scenario 5: `Sum_axis0(Sum_axis1(X))` merges into a single kernel
/// containing one `ReduceAxis` with `axes=(0,1)`.
#[test]
fn nested_reduce_merges_into_one_kernel() {
    let x_view = output_view(vec![4, 4], DType::F32);
    let inner = UOp::reduce_axis(x_view, AluOp::Add, vec![1]);
    let outer = UOp::reduce_axis(inner, AluOp::Add, vec![0]);
    let out = output_view(vec![1], DType::F32);
    let sink = UOp::sink(vec![UOp::store(out, outer)]);

    let cfg = SchedulerConfig::default();
    let (items, _vars, _becomes) = create_schedule(&sink, &cfg).expect("schedule should succeed");
    assert_eq!(items.len(), 1, "the nested reduces merge into one ReduceAxis(axes=(0,1)) kernel");
}

/// Scenario 6: `Sum(arange(N)) * Y` where `Y` has downstream consumers —
/// with `fuse_arange` enabled the arange is not realized on its own; each
/// consumer rebuilds it internally, so the multiply and the arange land in
/// the same kernel per consumer instead of the arange getting a kernel of
/// its own.
#[test]
fn arange_like_reduce_with_two_consumers_is_not_realized_when_fuse_arange_is_enabled() {
    use tensorsched::shapetracker::View;

    let c = UOp::constant(DType::I32, ConstValue::Int(1));
    let masked = UOp::view(c, ShapeTracker::from_view(View::create(vec![4], vec![0], 0, Some(vec![(0, 4)]))));
    let arange_sum = UOp::reduce_axis(masked, AluOp::Add, vec![0]);
    let y_view = output_view(vec![1], DType::I32);

    let lhs = UOp::alu(AluOp::Mul, vec![arange_sum.clone(), y_view.clone()], DType::I32);
    let rhs = UOp::alu(AluOp::Add, vec![arange_sum, y_view], DType::I32);

    let lhs_out = output_view(vec![1], DType::I32);
    let rhs_out = output_view(vec![1], DType::I32);
    let sink = UOp::sink(vec![UOp::store(lhs_out, lhs), UOp::store(rhs_out, rhs)]);

    let mut cfg = SchedulerConfig::default();
    cfg.fuse_arange = true;
    let (items, _vars, _becomes) = create_schedule(&sink, &cfg).expect("schedule should succeed");
    assert_eq!(items.len(), 2, "the arange is rebuilt inline in each consumer instead of realizing on its own");
    for item in &items {
        assert_eq!(item.bufs.len(), 2, "each consumer kernel reads only Y — the arange is computed inline, not loaded");
    }
}

/// Dependency soundness (spec §8 universal invariants): if buffer `b` is an
/// assign-preload of kernel `K`, and `K' != K` writes `b`, `K` precedes
/// `K'` — a preload reads the pre-assign value, so the assign can't run
/// first.
#[test]
fn assign_preload_reader_is_scheduled_before_its_buffers_writer() {
    let device = UOp::device("CPU");
    let a_buf = Buffer::new("CPU", 4, DType::F32);
    let a_view = UOp::view(UOp::buffer(device, a_buf.clone()), ShapeTracker::from_shape(vec![4]));

    // K: an ordinary elementwise kernel reading A's pre-assign value.
    let one = UOp::constant(DType::F32, ConstValue::Float(1.0));
    let reader = UOp::alu(AluOp::Add, vec![a_view.clone(), one], DType::F32);
    let reader_out = output_view(vec![4], DType::F32);

    // K': assigns an unrelated new value into A.
    let four = UOp::constant(DType::F32, ConstValue::Float(4.0));
    let assign = UOp::assign(a_view, four);

    let sink = UOp::sink(vec![UOp::store(reader_out, reader), assign]);

    let cfg = SchedulerConfig::default();
    let (items, _vars, _becomes) = create_schedule(&sink, &cfg).expect("schedule should succeed");

    let reader_idx = items.iter().position(|i| i.assign_preloads.contains(&a_buf)).expect("reader kernel must preload A");
    let writer_idx = items.iter().position(|i| i.bufs.first() == Some(&a_buf)).expect("writer kernel must output into A");
    assert!(reader_idx < writer_idx, "the preload reader must run before the kernel that overwrites its buffer");
}
