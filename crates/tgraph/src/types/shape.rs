use std::fmt;

use serde::{Deserialize, Serialize};

/// One axis of a partial shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic,
}

impl Dimension {
    pub fn is_static(self) -> bool {
        matches!(self, Dimension::Static(_))
    }

    pub fn length(self) -> Option<usize> {
        match self {
            Dimension::Static(len) => Some(len),
            Dimension::Dynamic => None,
        }
    }

    /// Unifies two dimensions that must describe the same extent.
    pub fn merge(self, other: Dimension) -> Option<Dimension> {
        match (self, other) {
            (Dimension::Dynamic, dim) | (dim, Dimension::Dynamic) => Some(dim),
            (Dimension::Static(a), Dimension::Static(b)) if a == b => Some(self),
            _ => None,
        }
    }

    /// Numpy-style broadcast of two dimensions.
    ///
    /// A static `1` stretches to the other side. A dynamic dimension paired with a static
    /// extent other than `1` resolves to that extent, since broadcasting would fail otherwise.
    pub fn broadcast_merge(self, other: Dimension) -> Option<Dimension> {
        match (self, other) {
            (Dimension::Static(1), dim) | (dim, Dimension::Static(1)) => Some(dim),
            (Dimension::Dynamic, dim) | (dim, Dimension::Dynamic) => Some(dim),
            (Dimension::Static(a), Dimension::Static(b)) if a == b => Some(self),
            _ => None,
        }
    }

    pub fn compatible(self, other: Dimension) -> bool {
        self.merge(other).is_some()
    }

    /// `true` when `self` is at least as specific as `other` and agrees with it.
    pub fn refines(self, other: Dimension) -> bool {
        match (self, other) {
            (_, Dimension::Dynamic) => true,
            (Dimension::Static(a), Dimension::Static(b)) => a == b,
            (Dimension::Dynamic, Dimension::Static(_)) => false,
        }
    }
}

impl From<usize> for Dimension {
    fn from(len: usize) -> Self {
        Dimension::Static(len)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Static(len) => write!(f, "{len}"),
            Dimension::Dynamic => f.write_str("?"),
        }
    }
}

/// Fully static tensor shape. Rank zero is a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Number of elements; `1` for scalars.
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.dims.len()];
        for axis in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.dims[axis + 1];
        }
        strides
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dims(f, self.dims.iter())
    }
}

/// Shape whose rank and/or individual extents may still be unknown.
///
/// Inference refines partial shapes as more becomes known about the inputs; a fully
/// static partial shape converts into a [`Shape`] with [`PartialShape::to_shape`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartialShape {
    dims: Option<Vec<Dimension>>,
}

impl PartialShape {
    pub fn new(dims: impl Into<Vec<Dimension>>) -> Self {
        Self {
            dims: Some(dims.into()),
        }
    }

    /// Shape of unknown rank.
    pub fn dynamic() -> Self {
        Self { dims: None }
    }

    /// Shape of known rank whose extents are all unknown.
    pub fn dynamic_of_rank(rank: usize) -> Self {
        Self::new(vec![Dimension::Dynamic; rank])
    }

    pub fn from_static(dims: &[usize]) -> Self {
        Self::new(dims.iter().copied().map(Dimension::Static).collect::<Vec<_>>())
    }

    pub fn rank(&self) -> Option<usize> {
        self.dims.as_ref().map(Vec::len)
    }

    pub fn rank_is_static(&self) -> bool {
        self.dims.is_some()
    }

    pub fn dims(&self) -> Option<&[Dimension]> {
        self.dims.as_deref()
    }

    pub fn is_static(&self) -> bool {
        self.dims
            .as_ref()
            .is_some_and(|dims| dims.iter().all(|dim| dim.is_static()))
    }

    pub fn is_dynamic(&self) -> bool {
        !self.is_static()
    }

    pub fn to_shape(&self) -> Option<Shape> {
        let dims = self.dims.as_ref()?;
        dims.iter()
            .map(|dim| dim.length())
            .collect::<Option<Vec<_>>>()
            .map(Shape::new)
    }

    /// Unifies two shapes that must describe the same tensor.
    pub fn merge(&self, other: &PartialShape) -> Option<PartialShape> {
        match (&self.dims, &other.dims) {
            (None, _) => Some(other.clone()),
            (_, None) => Some(self.clone()),
            (Some(lhs), Some(rhs)) => {
                if lhs.len() != rhs.len() {
                    return None;
                }
                lhs.iter()
                    .zip(rhs)
                    .map(|(a, b)| a.merge(*b))
                    .collect::<Option<Vec<_>>>()
                    .map(PartialShape::new)
            }
        }
    }

    /// Numpy-style broadcast: shapes are right-aligned and the shorter one is padded with 1s.
    pub fn broadcast_merge(&self, other: &PartialShape) -> Option<PartialShape> {
        let (Some(lhs), Some(rhs)) = (&self.dims, &other.dims) else {
            return Some(PartialShape::dynamic());
        };
        let rank = lhs.len().max(rhs.len());
        let pad = |dims: &[Dimension], axis: usize| -> Dimension {
            let offset = rank - dims.len();
            if axis < offset {
                Dimension::Static(1)
            } else {
                dims[axis - offset]
            }
        };
        (0..rank)
            .map(|axis| pad(lhs, axis).broadcast_merge(pad(rhs, axis)))
            .collect::<Option<Vec<_>>>()
            .map(PartialShape::new)
    }

    pub fn compatible(&self, other: &PartialShape) -> bool {
        self.merge(other).is_some()
    }

    /// `true` when every extent known in `other` is known and equal in `self`.
    pub fn refines(&self, other: &PartialShape) -> bool {
        match (&self.dims, &other.dims) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(lhs), Some(rhs)) => {
                lhs.len() == rhs.len() && lhs.iter().zip(rhs).all(|(a, b)| a.refines(*b))
            }
        }
    }
}

impl From<Shape> for PartialShape {
    fn from(shape: Shape) -> Self {
        PartialShape::from_static(shape.dims())
    }
}

impl From<&Shape> for PartialShape {
    fn from(shape: &Shape) -> Self {
        PartialShape::from_static(shape.dims())
    }
}

impl fmt::Display for PartialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dims {
            Some(dims) => write_dims(f, dims.iter()),
            None => f.write_str("[...]"),
        }
    }
}

fn write_dims<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    dims: impl Iterator<Item = T>,
) -> fmt::Result {
    f.write_str("[")?;
    for (index, dim) in dims.enumerate() {
        if index > 0 {
            f.write_str(",")?;
        }
        write!(f, "{dim}")?;
    }
    f.write_str("]")
}
