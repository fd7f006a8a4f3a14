//! Append-only arenas with typed handles.
//!
//! Instructions and computations are stored in arenas owned by the module;
//! everything else refers to them through copyable [`Handle`]s. Handles are
//! stable for the lifetime of the arena, which makes them usable as map keys
//! across the whole lowering pipeline.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed index into an [`Arena`].
///
/// A handle is a `u32` wrapped with the element type, so a
/// `Handle<Instruction>` cannot be confused with a `Handle<Computation>`.
pub struct Handle<T> {
    index: u32,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.index)
    }
}

impl<T> Handle<T> {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            _phantom: PhantomData,
        }
    }

    /// Returns the zero-based index of this handle.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// An append-only arena addressed by typed [`Handle`]s.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    data: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Returns the number of elements in the arena.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the arena contains no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the handle the next appended value will receive.
    pub fn next_handle(&self) -> Handle<T> {
        let index = u32::try_from(self.data.len()).unwrap_or_else(|_| {
            panic!("arena overflow: {} items exceeds u32::MAX", self.data.len())
        });
        Handle::new(index)
    }

    /// Appends a value and returns its handle.
    pub fn append(&mut self, value: T) -> Handle<T> {
        let handle = self.next_handle();
        self.data.push(value);
        handle
    }

    /// Returns a reference to the value if the handle is valid.
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.data.get(handle.index())
    }

    /// Iterates over `(handle, &value)` pairs in append order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        // Arena size is bounded by u32::MAX (enforced in next_handle).
        self.data
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::new(i as u32), v))
    }

    /// Iterates over `(handle, &mut value)` pairs in append order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.data
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (Handle::new(i as u32), v))
    }
}

impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.data[handle.index()]
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.data[handle.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_index() {
        let mut arena = Arena::new();
        let a = arena.append("alpha");
        let b = arena.append("beta");
        assert_eq!(arena[a], "alpha");
        assert_eq!(arena[b], "beta");
        assert_eq!(arena.len(), 2);
        assert!(!arena.is_empty());
    }

    #[test]
    fn next_handle_predicts_append() {
        let mut arena = Arena::<i32>::new();
        let predicted = arena.next_handle();
        let actual = arena.append(7);
        assert_eq!(predicted, actual);
        assert_eq!(arena.next_handle().index(), 1);
    }

    #[test]
    fn iter_yields_append_order() {
        let mut arena = Arena::new();
        arena.append(1);
        arena.append(2);
        arena.append(3);
        let items: Vec<_> = arena.iter().map(|(h, &v)| (h.index(), v)).collect();
        assert_eq!(items, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn try_get_rejects_stale_handle() {
        let mut arena = Arena::new();
        let h = arena.append(9);
        assert_eq!(arena.try_get(h), Some(&9));
        assert_eq!(arena.try_get(Handle::new(4)), None);
    }

    #[test]
    fn handles_order_by_index() {
        let h0: Handle<u8> = Handle::new(0);
        let h1: Handle<u8> = Handle::new(1);
        assert!(h0 < h1);
        assert_eq!(format!("{h0:?}"), "[0]");
    }
}
