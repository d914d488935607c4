//! Index map using unsigned integer indices to index
//! into vector of T. Pushing new values returns their
//! index. Removing elements is O(1), does not reallocate
//! and it does not change existing indices.

use std::{
    collections::BTreeSet,
    ops::{Index, IndexMut},
};

pub(crate) type Id = u32;

#[derive(Debug)]
pub(crate) struct Slab<T> {
    values: Vec<Option<T>>,
    empty: BTreeSet<Id>,
}

impl<T> Slab<T> {
    pub(crate) const fn new() -> Slab<T> {
        Slab {
            values: Vec::new(),
            empty: BTreeSet::new(),
        }
    }

    /// Lowest free index is reused first, so ids are deterministic
    /// for a given sequence of pushes and removals.
    pub(crate) fn push(&mut self, value: T) -> Id {
        if let Some(id) = self.empty.pop_first() {
            self.values[id as usize] = Some(value);
            id
        } else {
            self.values.push(Some(value));
            (self.values.len() - 1) as Id
        }
    }

    pub(crate) fn remove(&mut self, id: Id) -> Option<T> {
        let value = self.values.get_mut(id as usize)?.take()?;
        self.empty.insert(id);
        Some(value)
    }

    pub(crate) fn get(&self, id: Id) -> Option<&T> {
        self.values.get(id as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.values.get_mut(id as usize)?.as_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len() - self.empty.len()
    }
}

impl<T> Index<Id> for Slab<T> {
    type Output = T;
    #[track_caller]
    fn index(&self, index: Id) -> &Self::Output {
        match self.get(index) {
            Some(x) => x,
            None => panic!("Slab index {index} is not occupied."),
        }
    }
}

impl<T> IndexMut<Id> for Slab<T> {
    #[track_caller]
    fn index_mut(&mut self, index: Id) -> &mut Self::Output {
        match self.get_mut(index) {
            Some(x) => x,
            None => panic!("Slab index {index} is not occupied."),
        }
    }
}
