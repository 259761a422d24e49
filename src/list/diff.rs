//! Pure list difference.
//!
//! Produces an edit script that turns `old` into `new` when applied in order to
//! a working copy of `old`. Items are matched with [`DiffCallback::same_item`]
//! (identity) along a longest common subsequence; matched items whose contents
//! differ are reported as [`ListChange::Change`]. Moves show up as a remove
//! plus an insert.
//!
//! `Insert` and `Change` indices are positions in the working list at the
//! time of the edit, which are also positions in `new`.

use serde::{Deserialize, Serialize};

/// Identity and content comparison for list items.
pub trait DiffCallback<T> {
    /// Do `old` and `new` represent the same item (e.g. same id)?
    fn same_item(&self, old: &T, new: &T) -> bool;

    /// Given `same_item`, is there anything to re-render?
    fn same_contents(&self, old: &T, new: &T) -> bool;
}

/// Identity by key, contents by `PartialEq`.
#[derive(Debug, Clone, Copy)]
pub struct ByKey<F>(pub F);

impl<T, K, F> DiffCallback<T> for ByKey<F>
where
    T: PartialEq,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    fn same_item(&self, old: &T, new: &T) -> bool {
        (self.0)(old) == (self.0)(new)
    }

    fn same_contents(&self, old: &T, new: &T) -> bool {
        old == new
    }
}

/// One step of an edit script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ListChange {
    Insert { index: usize },
    Remove { index: usize },
    Change { index: usize },
}

/// Compute the edit script from `old` to `new`.
pub fn diff<T, D>(old: &[T], new: &[T], callback: &D) -> Vec<ListChange>
where
    D: DiffCallback<T> + ?Sized,
{
    let (n, m) = (old.len(), new.len());

    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if callback.same_item(&old[i], &new[j]) {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut changes = Vec::new();
    let (mut i, mut j, mut position) = (0, 0, 0);
    while i < n || j < m {
        if i < n && j < m && callback.same_item(&old[i], &new[j]) {
            if !callback.same_contents(&old[i], &new[j]) {
                changes.push(ListChange::Change { index: position });
            }
            i += 1;
            j += 1;
            position += 1;
        } else if j < m && (i == n || lcs[i][j + 1] >= lcs[i + 1][j]) {
            changes.push(ListChange::Insert { index: position });
            j += 1;
            position += 1;
        } else {
            changes.push(ListChange::Remove { index: position });
            i += 1;
        }
    }

    changes
}
