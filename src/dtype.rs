//! Scalar element types for tensor buffers.
//!
//! `DType` is a closed enumeration plus one composite case, `Image`, which
//! carries a secondary 2D shape for texture-backed buffers on devices that
//! want image memory. Everything else in the crate treats `DType` as a
//! small value type: cheap to clone, compared structurally.

use std::fmt;

/// Scalar element type of a buffer or computed value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DType {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
    /// An image-backed dtype: `base` is the underlying scalar type, `shape`
    /// is the `(rows, cols)` tiling used by the device's texture unit.
    Image {
        base: Box<DType>,
        shape: (usize, usize),
    },
    /// A pointer to `size` elements of `base` — the dtype `DefineGlobal`
    /// nodes carry after buffer erasure in kernel lowering.
    Ptr { base: Box<DType>, size: usize },
}

impl DType {
    /// Size in bytes of one scalar element (ignores `Image`/`Ptr` wrapping).
    pub fn itemsize(&self) -> usize {
        match self.base() {
            DType::Void => 0,
            DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 | DType::F16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
            DType::Image { .. } | DType::Ptr { .. } => unreachable!("base() strips wrappers"),
        }
    }

    /// Strip `Image`/`Ptr` wrapping down to the underlying scalar type.
    pub fn base(&self) -> &DType {
        match self {
            DType::Image { base, .. } | DType::Ptr { base, .. } => base.base(),
            other => other,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, DType::Image { .. })
    }

    /// Demote an image dtype to its scalar base, leaving other dtypes untouched.
    pub fn demoted_to_base(&self) -> DType {
        match self {
            DType::Image { base, .. } => base.base().clone(),
            other => other.clone(),
        }
    }

    pub fn ptr(&self, size: usize) -> DType {
        DType::Ptr {
            base: Box::new(self.clone()),
            size,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self.base(), DType::F16 | DType::F32 | DType::F64)
    }

    pub fn is_int(&self) -> bool {
        matches!(
            self.base(),
            DType::I8 | DType::I16 | DType::I32 | DType::I64 | DType::U8 | DType::U16 | DType::U32 | DType::U64
        )
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Void => write!(f, "void"),
            DType::Bool => write!(f, "bool"),
            DType::I8 => write!(f, "i8"),
            DType::I16 => write!(f, "i16"),
            DType::I32 => write!(f, "i32"),
            DType::I64 => write!(f, "i64"),
            DType::U8 => write!(f, "u8"),
            DType::U16 => write!(f, "u16"),
            DType::U32 => write!(f, "u32"),
            DType::U64 => write!(f, "u64"),
            DType::F16 => write!(f, "f16"),
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
            DType::Image { base, shape } => write!(f, "image<{base}, {}x{}>", shape.0, shape.1),
            DType::Ptr { base, size } => write!(f, "ptr<{base}, {size}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn itemsize_matches_scalar_width() {
        assert_eq!(DType::I32.itemsize(), 4);
        assert_eq!(DType::F64.itemsize(), 8);
        assert_eq!(DType::Bool.itemsize(), 1);
    }

    #[test]
    fn image_itemsize_uses_base() {
        let img = DType::Image {
            base: Box::new(DType::F32),
            shape: (4, 4),
        };
        assert_eq!(img.itemsize(), 4);
        assert!(img.is_image());
    }

    #[test]
    fn demoted_to_base_strips_image() {
        let img = DType::Image {
            base: Box::new(DType::F32),
            shape: (4, 4),
        };
        assert_eq!(img.demoted_to_base(), DType::F32);
        assert_eq!(DType::F32.demoted_to_base(), DType::F32);
    }

    #[test]
    fn ptr_wraps_and_strips() {
        let p = DType::F32.ptr(16);
        assert_eq!(p.base(), &DType::F32);
        assert_eq!(p.itemsize(), 4);
    }
}
