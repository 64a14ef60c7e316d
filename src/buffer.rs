//! `Buffer`: the device-memory handle a `BUFFER` op carries once buffer
//! injection (component C) has run. Identity is `(device, size, dtype,
//! buffer_num)` — two buffers with equal fields are the same allocation,
//! which is what lets `allbufs`/`children` key safely by `Buffer`.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::dtype::DType;

static NEXT_BUFFER_NUM: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

fn next_buffer_num() -> u64 {
    NEXT_BUFFER_NUM.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

#[derive(Debug)]
struct BufferInner {
    device: String,
    size: usize,
    dtype: DType,
    buffer_num: u64,
    /// Byte offset into the underlying allocation this handle starts at.
    /// Nonzero only for a `Buffer::view` sub-region alias.
    offset: usize,
    refcount: Cell<u32>,
}

/// Cheaply cloneable handle; equality/hash are by `(device, size, dtype,
/// buffer_num)`, not by `Rc` pointer, so two independently constructed
/// handles for the "same" allocation still compare equal.
#[derive(Debug, Clone)]
pub struct Buffer(Rc<BufferInner>);

impl Buffer {
    pub fn new(device: impl Into<String>, size: usize, dtype: DType) -> Self {
        Buffer(Rc::new(BufferInner {
            device: device.into(),
            size,
            dtype,
            buffer_num: next_buffer_num(),
            offset: 0,
            refcount: Cell::new(1),
        }))
    }

    pub fn device(&self) -> &str {
        &self.0.device
    }

    pub fn size(&self) -> usize {
        self.0.size
    }

    pub fn dtype(&self) -> &DType {
        &self.0.dtype
    }

    pub fn buffer_num(&self) -> u64 {
        self.0.buffer_num
    }

    pub fn offset(&self) -> usize {
        self.0.offset
    }

    /// A sub-region alias over this buffer's own storage: same underlying
    /// allocation (`buffer_num` carries over), different `size`/`dtype`/
    /// `offset`. Grounds the disk-device `BufferView` case, where a byte
    /// range of an already-mapped file is reinterpreted without a copy.
    pub fn view(&self, size: usize, dtype: DType, offset: usize) -> Self {
        Buffer(Rc::new(BufferInner {
            device: self.0.device.clone(),
            size,
            dtype,
            buffer_num: self.0.buffer_num,
            offset: self.0.offset + offset,
            refcount: Cell::new(1),
        }))
    }

    pub fn refcount(&self) -> u32 {
        self.0.refcount.get()
    }

    /// Bump the refcount and return `self` — mirrors the `ref(1)` idiom used
    /// when a buffer gains another owning reference during scheduling.
    pub fn take_ref(&self) -> Self {
        self.0.refcount.set(self.0.refcount.get() + 1);
        self.clone()
    }

    pub fn release(&self) {
        let n = self.0.refcount.get();
        if n > 0 {
            self.0.refcount.set(n - 1);
        }
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.0.device == other.0.device
            && self.0.size == other.0.size
            && self.0.dtype == other.0.dtype
            && self.0.buffer_num == other.0.buffer_num
            && self.0.offset == other.0.offset
    }
}
impl Eq for Buffer {}

impl std::hash::Hash for Buffer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.device.hash(state);
        self.0.size.hash(state);
        self.0.dtype.hash(state);
        self.0.buffer_num.hash(state);
        self.0.offset.hash(state);
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.offset == 0 {
            write!(f, "buffer<{}, {} x {}, #{}>", self.0.device, self.0.size, self.0.dtype, self.0.buffer_num)
        } else {
            write!(f, "buffer<{}, {} x {}, #{}+{}>", self.0.device, self.0.size, self.0.dtype, self.0.buffer_num, self.0.offset)
        }
    }
}
