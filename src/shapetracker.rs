//! `View`/`ShapeTracker`: the shape/layout algebra the scheduler treats as
//! an opaque, already-correct dependency (spec §3, §6 "opaque
//! dependencies"). The scheduler never inspects view internals beyond the
//! methods below; everything here exists to give those methods a concrete
//! (if simplified) body so the rest of the crate has something to call.
//!
//! Simplification (documented, see DESIGN.md): shapes/strides are concrete
//! `i64`s, not the fully symbolic `sint` of the system this is modeled on.
//! `Variable`/`unbind` are kept in the public surface so call sites read the
//! same as they would against a symbolic implementation, but `unbind` is a
//! no-op here since no view ever carries a free variable.

use std::fmt;

pub type Dim = i64;

/// A symbolic dimension variable bound by a `Bind`/`DefineVar` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: String,
    pub min: i64,
    pub max: i64,
}

impl Variable {
    pub fn new(name: impl Into<String>, min: i64, max: i64) -> Self {
        Variable { name: name.into(), min, max }
    }
}

/// One layer of shape/stride/offset/mask over a flat buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct View {
    pub shape: Vec<Dim>,
    pub strides: Vec<Dim>,
    pub offset: Dim,
    pub mask: Option<Vec<(Dim, Dim)>>,
}

/// Row-major strides for `shape`, with stride 0 on any unit dimension
/// (unit dims carry no information, so giving them stride 0 lets later
/// passes recognize them as broadcastable without special-casing size 1).
pub fn strides_for_shape(shape: &[Dim]) -> Vec<Dim> {
    let mut strides = vec![0; shape.len()];
    let mut acc: Dim = 1;
    for i in (0..shape.len()).rev() {
        strides[i] = if shape[i] == 1 { 0 } else { acc };
        acc *= shape[i].max(1);
    }
    strides
}

impl View {
    pub fn contiguous(shape: Vec<Dim>) -> View {
        let strides = strides_for_shape(&shape);
        View { shape, strides, offset: 0, mask: None }
    }

    pub fn create(shape: Vec<Dim>, strides: Vec<Dim>, offset: Dim, mask: Option<Vec<(Dim, Dim)>>) -> View {
        View { shape, strides, offset, mask }
    }

    pub fn size(&self) -> Dim {
        self.shape.iter().product()
    }

    pub fn is_contiguous(&self) -> bool {
        self.mask.is_none() && self.offset == 0 && self.strides == strides_for_shape(&self.shape)
    }

    /// True if any masked axis is an empty range — the view denotes no
    /// elements and should fold to a zero constant (spec §4.D).
    pub fn is_empty_masked(&self) -> bool {
        matches!(&self.mask, Some(m) if m.iter().any(|&(lo, hi)| hi <= lo))
    }

    pub fn unit_stride_axes(&self) -> Vec<usize> {
        self.strides
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s == 1)
            .map(|(i, _)| i)
            .collect()
    }
}

/// A stack of `View`s; composition (`+`) appends layers outer-to-inner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeTracker {
    views: Vec<View>,
}

impl ShapeTracker {
    pub fn from_shape(shape: Vec<Dim>) -> Self {
        ShapeTracker { views: vec![View::contiguous(shape)] }
    }

    pub fn from_view(view: View) -> Self {
        ShapeTracker { views: vec![view] }
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn shape(&self) -> &[Dim] {
        &self.views.last().expect("ShapeTracker always has >=1 view").shape
    }

    pub fn size(&self) -> Dim {
        self.shape().iter().product()
    }

    pub fn mask(&self) -> Option<&Vec<(Dim, Dim)>> {
        self.views.last().and_then(|v| v.mask.as_ref())
    }

    pub fn contiguous(&self) -> bool {
        self.views.len() == 1 && self.views[0].is_contiguous()
    }

    /// Merge adjacent views when the outer view is a plain contiguous
    /// reshape of the inner one. This is a deliberately conservative subset
    /// of full view-stack simplification (see DESIGN.md).
    pub fn simplify(&self) -> ShapeTracker {
        if self.views.len() < 2 {
            return self.clone();
        }
        let mut views = self.views.clone();
        let mut changed = true;
        while changed && views.len() >= 2 {
            changed = false;
            let n = views.len();
            let outer = &views[n - 1];
            let inner = &views[n - 2];
            if outer.is_contiguous() && inner.is_contiguous() && outer.size() == inner.size() {
                views.truncate(n - 2);
                views.push(View::contiguous(outer.shape.clone()));
                changed = true;
            }
        }
        ShapeTracker { views }
    }

    /// No-op in this concrete implementation: no view here ever carries a
    /// free `Variable`, so there is nothing to extract.
    pub fn unbind(&self) -> (ShapeTracker, std::collections::HashMap<Variable, i64>) {
        (self.clone(), std::collections::HashMap::new())
    }

    /// Best-effort inverse: only defined when `self` is a single contiguous
    /// view whose size matches `old_shape`'s product (a pure reshape), which
    /// is the only case `found_contiguous` (folding.rs) needs.
    pub fn invert(&self, old_shape: &[Dim]) -> Option<ShapeTracker> {
        if self.contiguous() && self.size() == old_shape.iter().product() {
            Some(ShapeTracker::from_shape(old_shape.to_vec()))
        } else {
            None
        }
    }

    /// Zero out the given axes (a reduction's output shape).
    pub fn reduce(&self, axes: &[usize]) -> Vec<Dim> {
        let mut shape = self.shape().to_vec();
        for &ax in axes {
            if ax < shape.len() {
                shape[ax] = 1;
            }
        }
        shape
    }

    // ---- movement ops: each appends a new outer view ----

    pub fn reshape(&self, new_shape: Vec<Dim>) -> ShapeTracker {
        debug_assert_eq!(self.size(), new_shape.iter().product::<Dim>(), "reshape must preserve element count");
        let mut st = self.clone();
        st.views.push(View::contiguous(new_shape));
        st.simplify()
    }

    pub fn permute(&self, order: &[usize]) -> ShapeTracker {
        let base = self.views.last().unwrap();
        let shape: Vec<Dim> = order.iter().map(|&i| base.shape[i]).collect();
        let strides: Vec<Dim> = order.iter().map(|&i| base.strides[i]).collect();
        let mask = base.mask.as_ref().map(|m| order.iter().map(|&i| m[i]).collect());
        let mut st = self.clone();
        *st.views.last_mut().unwrap() = View::create(shape, strides, base.offset, mask);
        st
    }

    pub fn expand(&self, new_shape: &[Dim]) -> ShapeTracker {
        let base = self.views.last().unwrap();
        let mut strides = base.strides.clone();
        for (i, (&old, &new)) in base.shape.iter().zip(new_shape.iter()).enumerate() {
            if old == 1 && new != 1 {
                strides[i] = 0;
            }
        }
        let mut st = self.clone();
        *st.views.last_mut().unwrap() = View::create(new_shape.to_vec(), strides, base.offset, base.mask.clone());
        st
    }

    pub fn pad(&self, pads: &[(Dim, Dim)]) -> ShapeTracker {
        let base = self.views.last().unwrap();
        let new_shape: Vec<Dim> = base.shape.iter().zip(pads).map(|(&s, &(lo, hi))| s + lo + hi).collect();
        let new_offset = base.offset - pads.iter().zip(&base.strides).map(|(&(lo, _), &s)| lo * s).sum::<Dim>();
        let mask: Vec<(Dim, Dim)> = base.shape.iter().zip(pads).map(|(&s, &(lo, _))| (lo, lo + s)).collect();
        let mut st = self.clone();
        *st.views.last_mut().unwrap() = View::create(new_shape, base.strides.clone(), new_offset, Some(mask));
        st
    }

    pub fn shrink(&self, bounds: &[(Dim, Dim)]) -> ShapeTracker {
        let base = self.views.last().unwrap();
        let new_shape: Vec<Dim> = bounds.iter().map(|&(lo, hi)| hi - lo).collect();
        let new_offset = base.offset + bounds.iter().zip(&base.strides).map(|(&(lo, _), &s)| lo * s).sum::<Dim>();
        let mask = base.mask.as_ref().map(|m| {
            m.iter()
                .zip(bounds)
                .map(|(&(mlo, mhi), &(blo, _))| ((mlo - blo).max(0), (mhi - blo).max(0)))
                .collect()
        });
        let mut st = self.clone();
        *st.views.last_mut().unwrap() = View::create(new_shape, base.strides.clone(), new_offset, mask);
        st
    }

    pub fn stride(&self, steps: &[Dim]) -> ShapeTracker {
        let base = self.views.last().unwrap();
        let new_shape: Vec<Dim> = base.shape.iter().zip(steps).map(|(&s, &step)| (s + step.abs() - 1) / step.abs()).collect();
        let new_strides: Vec<Dim> = base.strides.iter().zip(steps).map(|(&s, &step)| s * step).collect();
        let mut st = self.clone();
        *st.views.last_mut().unwrap() = View::create(new_shape, new_strides, base.offset, base.mask.clone());
        st
    }
}

impl std::ops::Add for ShapeTracker {
    type Output = ShapeTracker;
    fn add(self, other: ShapeTracker) -> ShapeTracker {
        let mut views = self.views;
        views.extend(other.views);
        ShapeTracker { views }.simplify()
    }
}

impl fmt::Display for ShapeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShapeTracker(shape={:?}, contiguous={})", self.shape(), self.contiguous())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_from_shape() {
        let st = ShapeTracker::from_shape(vec![4, 4]);
        assert!(st.contiguous());
        assert_eq!(st.size(), 16);
    }

    #[test]
    fn reshape_preserves_size() {
        let st = ShapeTracker::from_shape(vec![4, 4]).reshape(vec![16]);
        assert_eq!(st.shape(), &[16]);
        assert_eq!(st.size(), 16);
    }

    #[test]
    fn permute_swaps_axes() {
        let st = ShapeTracker::from_shape(vec![2, 3]).permute(&[1, 0]);
        assert_eq!(st.shape(), &[3, 2]);
    }

    #[test]
    fn expand_sets_zero_stride() {
        let st = ShapeTracker::from_shape(vec![1, 3]).expand(&[4, 3]);
        assert_eq!(st.shape(), &[4, 3]);
        assert_eq!(st.views().last().unwrap().strides[0], 0);
    }

    #[test]
    fn pad_then_shrink_round_trips_shape() {
        let st = ShapeTracker::from_shape(vec![4]).pad(&[(1, 1)]);
        assert_eq!(st.shape(), &[6]);
        assert!(st.mask().is_some());
        let back = st.shrink(&[(1, 5)]);
        assert_eq!(back.shape(), &[4]);
    }

    #[test]
    fn masked_empty_range_detected() {
        let v = View::create(vec![4], vec![1], 0, Some(vec![(2, 2)]));
        assert!(v.is_empty_masked());
    }

    #[test]
    fn reduce_zeroes_axis() {
        let st = ShapeTracker::from_shape(vec![2, 3, 4]);
        assert_eq!(st.reduce(&[1]), vec![2, 1, 4]);
    }

    #[test]
    fn composition_appends_views() {
        let a = ShapeTracker::from_shape(vec![4, 4]);
        let b = ShapeTracker::from_shape(vec![16]);
        let composed = a + b;
        assert_eq!(composed.shape(), &[16]);
    }
}
