use std::fmt;

use crate::dtype::DType;

// Shape: N-dimensional shape representation
//
//   - Scalar: Shape([])         : 0 dimensions, 1 element
//   - Vector: Shape([5])        : 1 dimension, 5 elements
//   - Matrix: Shape([3, 4])     : 2 dimensions, 12 elements
//   - Empty:  Shape([2, 0])     : 2 dimensions, 0 elements
//
// The element count times the dtype width is the exact byte length of the
// buffer an array with this shape owns.

/// N-dimensional shape of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// The scalar shape `()`.
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of elements. A scalar has 1, any zero dimension gives 0.
    ///
    /// Saturates at `usize::MAX`; allocated arrays never get there because
    /// creation goes through [`Shape::checked_size_in_bytes`].
    pub fn elem_count(&self) -> usize {
        self.checked_elem_count().unwrap_or(usize::MAX)
    }

    /// Buffer size in bytes for elements of `dtype`, saturating like
    /// [`Shape::elem_count`].
    pub fn size_in_bytes(&self, dtype: DType) -> usize {
        self.checked_size_in_bytes(dtype).unwrap_or(usize::MAX)
    }

    /// Element count, or `None` if the product overflows `usize`.
    pub fn checked_elem_count(&self) -> Option<usize> {
        if self.0.contains(&0) {
            return Some(0);
        }
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Byte length for `dtype`, or `None` if it overflows `usize`.
    pub fn checked_size_in_bytes(&self, dtype: DType) -> Option<usize> {
        self.checked_elem_count()?.checked_mul(dtype.size_in_bytes())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ")")
    }
}

// These let you write: Shape::from((3, 4)) instead of Shape::from(vec![3, 4])

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape::scalar()
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize,)> for Shape {
    fn from((d0,): (usize,)) -> Self {
        Shape(vec![d0])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(s: &Shape) -> Self {
        s.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::from(());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.elem_count(), 1);
        assert_eq!(s.to_string(), "()");
    }

    #[test]
    fn test_zero_dim_has_no_elements() {
        let s = Shape::from((2, 0, 3));
        assert_eq!(s.elem_count(), 0);
        assert_eq!(s.size_in_bytes(DType::F64), 0);
    }

    #[test]
    fn test_matrix_shape() {
        let s = Shape::from((3, 4));
        assert_eq!(s.rank(), 2);
        assert_eq!(s.elem_count(), 12);
        assert_eq!(s.size_in_bytes(DType::I32), 48);
    }

    #[test]
    fn test_checked_size_overflow() {
        let s = Shape::from((usize::MAX / 2, 4));
        assert_eq!(s.checked_elem_count(), None);
        assert_eq!(s.checked_size_in_bytes(DType::U8), None);

        let s = Shape::from(usize::MAX / 4);
        assert_eq!(s.checked_elem_count(), Some(usize::MAX / 4));
        assert_eq!(s.checked_size_in_bytes(DType::U8), Some(usize::MAX / 4));
        assert_eq!(s.checked_size_in_bytes(DType::F64), None);

        assert_eq!(Shape::from((usize::MAX, 4, 0)).checked_size_in_bytes(DType::F64), Some(0));
        assert_eq!(Shape::from((usize::MAX, 4)).elem_count(), usize::MAX);
        assert_eq!(Shape::from((3, 4)).checked_size_in_bytes(DType::I32), Some(48));
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::from(3).to_string(), "(3)");
        assert_eq!(Shape::from((3, 1)).to_string(), "(3, 1)");
    }
}
