//! `UOp`: the hash-consed tagged-union IR node (spec §3, §9). Every `UOp`
//! handed out by the constructors below is interned in a thread-local
//! table keyed on `(opcode, dtype, source identities, arg)`, so two
//! structurally-identical nodes are always the *same* handle. `PartialEq`/
//! `Hash`/`Eq` on `UOp` reduce to that identity (pointer comparison), never
//! a recursive structural walk — this is what lets `children`/`realizes`
//! (context.rs) key safely by node.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::dtype::DType;
use crate::shapetracker::{ShapeTracker, Variable};

/// Arithmetic/logic ops carried by `Opcode::Alu` and `ReduceAxis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Max,
    Min,
    Lt,
    Ne,
    And,
    Or,
    Xor,
    Neg,
    Recip,
    Sqrt,
    Exp2,
    Log2,
    Sin,
    Where,
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
    Float(f64),
}

impl Eq for ConstValue {}

impl std::hash::Hash for ConstValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            ConstValue::Int(i) => (0u8, *i).hash(state),
            ConstValue::Bool(b) => (1u8, *b).hash(state),
            ConstValue::Float(v) => (2u8, v.to_bits()).hash(state),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(i) => write!(f, "{i}"),
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// The opcode tag. `Alu` nests the specific arithmetic op so pattern
/// matchers can branch on `Opcode::Alu(_)` for "is this elementwise
/// compute" and on the nested value for the specific operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Device,
    Buffer,
    Const,
    Bind,
    DefineVar,
    DefineGlobal,
    DefineLocal,
    View,
    Load,
    Preload,
    Store,
    Sink,
    Assign,
    Contiguous,
    Detach,
    Copy,
    BufferView,
    ReduceAxis,
    Cast,
    Bitcast,
    Alu(AluOp),
}

impl Opcode {
    /// The "elementwise or elementwise-adjacent" set `elementwise_view_right`
    /// (kernel_lowering.rs) swizzles views through — `ALU ∪ {Cast, Bitcast,
    /// Assign, Contiguous, Store}` verbatim per spec §9's open question.
    pub fn is_elementwise_view_right(self) -> bool {
        matches!(self, Opcode::Alu(_) | Opcode::Cast | Opcode::Bitcast | Opcode::Assign | Opcode::Contiguous | Opcode::Store)
    }

    pub fn is_movement_free(self) -> bool {
        matches!(self, Opcode::View)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The op-specific payload. Which variant is meaningful depends on the
/// node's `Opcode`; see the constructors below for the pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UOpArg {
    None,
    Int(i64),
    Const(ConstValue),
    Str(String),
    View(ShapeTracker),
    Reduce(AluOp, Vec<usize>),
    Var(Variable),
    Buf(Buffer),
}

struct UOpData {
    op: Opcode,
    dtype: DType,
    src: Vec<UOp>,
    arg: UOpArg,
}

/// A hash-consed handle to an IR node. Cheap to clone (`Rc` bump);
/// equality and hashing are pointer identity, not structural.
#[derive(Clone)]
pub struct UOp(Rc<UOpData>);

#[derive(PartialEq, Eq, Hash)]
struct InternKey {
    op: Opcode,
    dtype: DType,
    src: Vec<usize>,
    arg: UOpArg,
}

thread_local! {
    static INTERN: RefCell<HashMap<InternKey, UOp>> = RefCell::new(HashMap::new());
}

impl UOp {
    fn intern(op: Opcode, dtype: DType, src: Vec<UOp>, arg: UOpArg) -> UOp {
        let key = InternKey {
            op,
            dtype: dtype.clone(),
            src: src.iter().map(|s| Rc::as_ptr(&s.0) as usize).collect(),
            arg: arg.clone(),
        };
        INTERN.with(|cell| {
            if let Some(existing) = cell.borrow().get(&key) {
                return existing.clone();
            }
            let uop = UOp(Rc::new(UOpData { op, dtype, src, arg }));
            cell.borrow_mut().insert(key, uop.clone());
            uop
        })
    }

    pub fn op(&self) -> Opcode {
        self.0.op
    }

    pub fn dtype(&self) -> &DType {
        &self.0.dtype
    }

    pub fn src(&self) -> &[UOp] {
        &self.0.src
    }

    pub fn arg(&self) -> &UOpArg {
        &self.0.arg
    }

    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn shapetracker(&self) -> Option<&ShapeTracker> {
        match &self.0.arg {
            UOpArg::View(st) => Some(st),
            _ => None,
        }
    }

    pub fn buffer(&self) -> Option<&Buffer> {
        match &self.0.arg {
            UOpArg::Buf(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_buffer_op(&self) -> bool {
        self.0.op == Opcode::Buffer
    }

    /// The `base` of a view chain: walk past `View` nodes with a single
    /// source to the underlying op, matching `UOp.base` in the source
    /// implementation.
    pub fn base(&self) -> &UOp {
        if self.0.op == Opcode::View && self.0.src.len() == 1 {
            self.0.src[0].base()
        } else {
            self
        }
    }

    // ---- constructors, one per opcode family ----

    pub fn device(name: impl Into<String>) -> UOp {
        UOp::intern(Opcode::Device, DType::Void, vec![], UOpArg::Str(name.into()))
    }

    pub fn buffer(device: UOp, buf: Buffer) -> UOp {
        let dtype = buf.dtype().clone();
        UOp::intern(Opcode::Buffer, dtype, vec![device], UOpArg::Buf(buf))
    }

    pub fn constant(dtype: DType, value: ConstValue) -> UOp {
        UOp::intern(Opcode::Const, dtype, vec![], UOpArg::Const(value))
    }

    pub fn define_var(var: Variable, dtype: DType) -> UOp {
        UOp::intern(Opcode::DefineVar, dtype, vec![], UOpArg::Var(var))
    }

    pub fn define_global(index: i64, dtype: DType) -> UOp {
        UOp::intern(Opcode::DefineGlobal, dtype, vec![], UOpArg::Int(index))
    }

    pub fn bind(var: UOp, value: UOp) -> UOp {
        let dtype = var.dtype().clone();
        UOp::intern(Opcode::Bind, dtype, vec![var, value], UOpArg::None)
    }

    pub fn view(src: UOp, st: ShapeTracker) -> UOp {
        let dtype = src.dtype().clone();
        UOp::intern(Opcode::View, dtype, vec![src], UOpArg::View(st))
    }

    pub fn load(src: Vec<UOp>, dtype: DType) -> UOp {
        UOp::intern(Opcode::Load, dtype, src, UOpArg::None)
    }

    pub fn preload(src: Vec<UOp>, dtype: DType) -> UOp {
        UOp::intern(Opcode::Preload, dtype, src, UOpArg::None)
    }

    pub fn store(target: UOp, value: UOp) -> UOp {
        UOp::intern(Opcode::Store, DType::Void, vec![target, value], UOpArg::None)
    }

    pub fn sink(srcs: Vec<UOp>) -> UOp {
        UOp::intern(Opcode::Sink, DType::Void, srcs, UOpArg::None)
    }

    pub fn assign(target: UOp, value: UOp) -> UOp {
        let dtype = target.dtype().clone();
        UOp::intern(Opcode::Assign, dtype, vec![target, value], UOpArg::None)
    }

    pub fn contiguous(src: UOp) -> UOp {
        let dtype = src.dtype().clone();
        UOp::intern(Opcode::Contiguous, dtype, vec![src], UOpArg::None)
    }

    pub fn detach(src: UOp) -> UOp {
        let dtype = src.dtype().clone();
        UOp::intern(Opcode::Detach, dtype, vec![src], UOpArg::None)
    }

    pub fn copy(src: UOp, device: UOp) -> UOp {
        let dtype = src.dtype().clone();
        UOp::intern(Opcode::Copy, dtype, vec![src, device], UOpArg::None)
    }

    /// A disk-device sub-region alias: `buf` is already a `Buffer::view` of
    /// some larger mapped allocation, reinterpreted with its own dtype in
    /// place — no copy, no realize.
    pub fn buffer_view(device: UOp, buf: Buffer) -> UOp {
        let dtype = buf.dtype().clone();
        UOp::intern(Opcode::BufferView, dtype, vec![device], UOpArg::Buf(buf))
    }

    pub fn reduce_axis(src: UOp, op: AluOp, axes: Vec<usize>) -> UOp {
        let dtype = src.dtype().clone();
        UOp::intern(Opcode::ReduceAxis, dtype, vec![src], UOpArg::Reduce(op, axes))
    }

    pub fn cast(src: UOp, dtype: DType) -> UOp {
        UOp::intern(Opcode::Cast, dtype, vec![src], UOpArg::None)
    }

    pub fn bitcast(src: UOp, dtype: DType) -> UOp {
        UOp::intern(Opcode::Bitcast, dtype, vec![src], UOpArg::None)
    }

    pub fn alu(op: AluOp, srcs: Vec<UOp>, dtype: DType) -> UOp {
        UOp::intern(Opcode::Alu(op), dtype, srcs, UOpArg::None)
    }

    /// Rebuild this node with different sources, same opcode/dtype/arg.
    /// Used by the rewrite engine (rewrite.rs) to reconstruct a node after
    /// its children were rewritten, without re-deriving op-specific logic.
    pub fn with_src(&self, new_src: Vec<UOp>) -> UOp {
        UOp::intern(self.0.op, self.0.dtype.clone(), new_src, self.0.arg.clone())
    }

    /// Build a standalone `View` node directly from a `ShapeTracker`, with
    /// no underlying source — used when a view needs to stand in for a
    /// shape alone (e.g. swizzle bookkeeping in kernel_lowering.rs).
    pub fn from_shapetracker(st: ShapeTracker, dtype: DType) -> UOp {
        UOp::intern(Opcode::View, dtype, vec![], UOpArg::View(st))
    }
}

impl PartialEq for UOp {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for UOp {}

impl std::hash::Hash for UOp {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for UOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UOp({:?}, {}, {} src, arg={:?})", self.0.op, self.0.dtype, self.0.src.len(), self.0.arg)
    }
}

impl fmt::Display for UOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
