use core::fmt::{Display, Formatter};

/// Axes of a shape, used by reduce ops
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Axes(pub(crate) Box<[usize]>);

impl Axes {
    /// Iterate over axes
    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.into_iter()
    }

    /// Number of axes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No axes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if axis is among self
    #[must_use]
    pub fn contains(&self, axis: usize) -> bool {
        self.0.contains(&axis)
    }

    /// All axes are smaller than rank and none repeats
    #[must_use]
    pub fn is_valid_for(&self, rank: usize) -> bool {
        self.0
            .iter()
            .enumerate()
            .all(|(i, &a)| a < rank && !self.0[..i].contains(&a))
    }
}

impl Display for Axes {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{:?}", self.0))
    }
}

impl From<Vec<usize>> for Axes {
    fn from(value: Vec<usize>) -> Self {
        Axes(value.into_boxed_slice())
    }
}

impl<const N: usize> From<[usize; N]> for Axes {
    fn from(value: [usize; N]) -> Self {
        Axes(value.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Axes {
    type IntoIter = <&'a [usize] as IntoIterator>::IntoIter;
    type Item = &'a usize;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
