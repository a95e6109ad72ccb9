//! Bounded Containers

use smallvec::SmallVec;
use std::fmt;

/// A LIFO container with inline storage for `N` items and a runtime limit
/// `<= N`. Pushing onto a full stack hands the item back instead of growing.
#[derive(Clone)]
pub struct BoundedStack<T, const N: usize> {
    /// Stored items, bottom first.
    items: SmallVec<[T; N]>,

    /// Maximum number of items.
    limit: usize,
}

impl<T, const N: usize> BoundedStack<T, N> {
    /// Create an empty stack holding at most `limit` items. The limit is
    /// clamped to the inline capacity `N`.
    ///
    /// * `limit` - Maximum number of items.
    pub fn new(limit: usize) -> Self {
        Self {
            items: SmallVec::new(),
            limit: limit.min(N),
        }
    }

    /// Returns the maximum number of items.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if no more items can be pushed.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.limit
    }

    /// Push an item. A full stack returns the item as the error.
    ///
    /// * `item` - The item.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            Err(item)
        } else {
            self.items.push(item);
            Ok(())
        }
    }

    /// Pop the most recently pushed item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Returns the most recently pushed item.
    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// Returns the item at `index` counting from the bottom.
    ///
    /// * `index` - Index.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Iterate from the bottom.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Keep only the items matching `f`, preserving order.
    ///
    /// * `f` - Predicate.
    pub fn retain<F: FnMut(&mut T) -> bool>(&mut self, f: F) {
        self.items.retain(f);
    }

    /// Remove the item at `index`, shifting the ones above it down.
    ///
    /// * `index` - Index.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T, const N: usize> Default for BoundedStack<T, N> {
    fn default() -> Self {
        Self::new(N)
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for BoundedStack<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedStack")
            .field("items", &self.items.as_slice())
            .field("limit", &self.limit)
            .finish()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a BoundedStack<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
