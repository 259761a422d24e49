//! Diff-driven list rendering.
//!
//! A [`DiffList`] owns the current items, a [`DiffCallback`] deciding identity
//! and content equality, and a stateless render closure. Submitting a new list
//! yields the [`ListChange`] script a view applies to its rows; only inserted
//! and changed positions need re-rendering.

mod cache;
mod diff;

pub use cache::{ContentCache, DEFAULT_CACHE_CAPACITY};
pub use diff::{diff, ByKey, DiffCallback, ListChange};

/// List component parameterized by a difference function `D` and a renderer `R`.
pub struct DiffList<T, D, R> {
    items: Vec<T>,
    differ: D,
    render: R,
}

impl<T, D, R> DiffList<T, D, R>
where
    D: DiffCallback<T>,
{
    pub fn new(differ: D, render: R) -> Self {
        Self {
            items: Vec::new(),
            differ,
            render,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the items, returning the edit script from the previous list.
    pub fn submit(&mut self, items: Vec<T>) -> Vec<ListChange> {
        let changes = diff(&self.items, &items, &self.differ);
        self.items = items;
        changes
    }

    /// Render the row at `position`, or `None` when out of range.
    pub fn render_at<V>(&self, position: usize) -> Option<V>
    where
        R: Fn(&T, usize) -> V,
    {
        self.items
            .get(position)
            .map(|item| (self.render)(item, position))
    }

    pub fn render_all<V>(&self) -> Vec<V>
    where
        R: Fn(&T, usize) -> V,
    {
        self.items
            .iter()
            .enumerate()
            .map(|(position, item)| (self.render)(item, position))
            .collect()
    }

    /// Render the rows an edit script inserted or changed, keyed by position
    /// in the current list.
    pub fn render_changes<V>(&self, changes: &[ListChange]) -> Vec<(usize, V)>
    where
        R: Fn(&T, usize) -> V,
    {
        changes
            .iter()
            .filter_map(|change| match *change {
                ListChange::Insert { index } | ListChange::Change { index } => Some(index),
                ListChange::Remove { .. } => None,
            })
            .filter_map(|index| self.render_at(index).map(|row| (index, row)))
            .collect()
    }
}

impl<T: std::fmt::Debug, D, R> std::fmt::Debug for DiffList<T, D, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffList")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}
