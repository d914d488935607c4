use crate::axes::Axes;
use core::fmt::{Display, Formatter};

/// Shape of tensor
///
/// Shapes always have rank at least one, scalars are `[1]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Shape(Box<[usize]>);

impl Shape {
    /// Get shape's rank
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.0.len()
    }

    /// Get number of elements in tensor with this shape
    /// (a product of it's dimensions).
    #[must_use]
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    /// Iter
    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.into_iter()
    }

    /// Dimensions as slice
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Shape is usable for nodes, non empty and without zero sized dimensions
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|&d| d > 0)
    }

    /// Get shape's strides
    #[must_use]
    pub fn strides(&self) -> Shape {
        let mut a = 1;
        let mut strides: Vec<usize> = self
            .0
            .iter()
            .rev()
            .map(|d| {
                let t = a;
                a *= d;
                t
            })
            .collect();
        strides.reverse();
        strides.into()
    }

    /// Shape resulting from broadcasting self with other.
    /// Dimensions are aligned from the right, each pair must be equal
    /// or one of them must be 1.
    #[must_use]
    pub fn broadcast(&self, other: &Shape) -> Option<Shape> {
        let rank = self.rank().max(other.rank());
        let lhs = self.padded(rank);
        let rhs = other.padded(rank);
        lhs.into_iter()
            .zip(rhs)
            .map(|(l, r)| match (l, r) {
                (l, r) if l == r => Some(l),
                (1, r) => Some(r),
                (l, 1) => Some(l),
                _ => None,
            })
            .collect::<Option<Vec<usize>>>()
            .map(Shape::from)
    }

    /// Check if self can be expanded to shape
    #[must_use]
    pub fn expands_to(&self, shape: &Shape) -> bool {
        self.rank() <= shape.rank() && self.broadcast(shape).as_ref() == Some(shape)
    }

    /// Get axes along which self was expanded to shape.
    /// Missing leading dimensions of self count as expanded.
    #[must_use]
    pub fn expand_axes(&self, shape: &Shape) -> Axes {
        self.padded(shape.rank())
            .into_iter()
            .zip(shape)
            .enumerate()
            .filter_map(|(a, (d, e))| if d == *e { None } else { Some(a) })
            .collect::<Vec<usize>>()
            .into()
    }

    /// Reduce self along axes, keeping reduced dimensions as 1
    #[must_use]
    pub fn reduce(self, axes: &Axes) -> Shape {
        let mut shape = self;
        for a in axes {
            shape.0[*a] = 1;
        }
        shape
    }

    /// Remove axes from self. Removing all axes gives `[1]`.
    #[must_use]
    pub fn remove_axes(&self, axes: &Axes) -> Shape {
        let dims: Vec<usize> = self
            .0
            .iter()
            .enumerate()
            .filter_map(|(a, &d)| if axes.contains(a) { None } else { Some(d) })
            .collect();
        if dims.is_empty() {
            Shape::from(1)
        } else {
            dims.into()
        }
    }

    fn padded(&self, rank: usize) -> Vec<usize> {
        let mut vec = vec![1; rank.saturating_sub(self.rank())];
        vec.extend_from_slice(&self.0);
        vec
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{:?}", self.0))
    }
}

impl core::ops::Index<usize> for Shape {
    type Output = usize;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(value: Vec<usize>) -> Self {
        Shape(value.into_boxed_slice())
    }
}

impl From<&[usize]> for Shape {
    fn from(value: &[usize]) -> Self {
        Shape(value.iter().copied().collect())
    }
}

impl From<usize> for Shape {
    fn from(value: usize) -> Self {
        Shape(Box::new([value]))
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(value: [usize; N]) -> Self {
        Shape(value.into_iter().collect())
    }
}

impl From<&Shape> for Shape {
    fn from(value: &Shape) -> Self {
        value.clone()
    }
}

impl<'a> IntoIterator for &'a Shape {
    type IntoIter = <&'a [usize] as IntoIterator>::IntoIter;
    type Item = &'a usize;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
