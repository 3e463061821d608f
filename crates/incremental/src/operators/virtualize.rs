//! Windowed views over an ordered list stream.
//!
//! The full upstream sequence is mirrored; the window is recomputed after
//! every upstream change set and every new request, then diffed against the
//! previously emitted window so only the difference goes downstream.

use ripple_core::{Error, ListChange, ListChangeSet, Result};
use tracing::trace;

/// Largest alignment table, in cells, before a changed middle is replaced
/// wholesale instead of aligned.
const MAX_ALIGN_CELLS: usize = 1 << 20;

/// A window by offset and length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VirtualRequest {
    pub start_index: usize,
    pub size: usize,
}

impl VirtualRequest {
    pub fn new(start_index: usize, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::argument("virtual window size must be positive"));
        }
        Ok(Self { start_index, size })
    }
}

/// A window by page number (1-based) and page size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Result<Self> {
        if page == 0 {
            return Err(Error::argument("pages are numbered from 1"));
        }
        if size == 0 {
            return Err(Error::argument("page size must be positive"));
        }
        Ok(Self { page, size })
    }

    /// The window this page covers.
    pub fn window(&self) -> VirtualRequest {
        VirtualRequest {
            start_index: (self.page - 1).saturating_mul(self.size),
            size: self.size,
        }
    }
}

/// Window state shared by `virtualize` and `page`.
pub struct Window<T> {
    items: Vec<T>,
    request: Option<VirtualRequest>,
    window: Vec<T>,
}

impl<T: Clone + PartialEq> Default for Window<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq> Window<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            request: None,
            window: Vec::new(),
        }
    }

    /// Items currently inside the window.
    pub fn visible(&self) -> &[T] {
        &self.window
    }

    pub fn process(&mut self, changes: &ListChangeSet<T>, errors: &mut Vec<Error>) -> ListChangeSet<T> {
        for change in changes {
            if let Err(err) = change.apply_to(&mut self.items) {
                errors.push(err);
            }
        }
        self.refresh_window()
    }

    pub fn set_request(&mut self, request: VirtualRequest) -> ListChangeSet<T> {
        self.request = Some(request);
        self.refresh_window()
    }

    fn refresh_window(&mut self) -> ListChangeSet<T> {
        let Some(request) = self.request else {
            return ListChangeSet::new();
        };
        let start = request.start_index.min(self.items.len());
        let end = request.start_index.saturating_add(request.size).min(self.items.len());
        let next = self.items[start..end].to_vec();
        let changes = diff_window(&self.window, &next);
        self.window = next;
        changes
    }
}

enum Edit<'a, T> {
    Keep,
    Remove(&'a T),
    Add(&'a T),
}

/// Computes the changes that turn `old` into `new`.
///
/// The common prefix and suffix are skipped; the middle is aligned on its
/// longest common subsequence. A removal directly followed by an addition
/// at the same index collapses into a `Replace`. A middle too large to align
/// within `MAX_ALIGN_CELLS` is removed and re-added as two ranges.
pub(crate) fn diff_window<T: Clone + PartialEq>(old: &[T], new: &[T]) -> ListChangeSet<T> {
    let mut out = ListChangeSet::new();
    if new.is_empty() {
        if !old.is_empty() {
            out.push(ListChange::Clear { items: old.to_vec() });
        }
        return out;
    }
    if old.is_empty() {
        out.push(ListChange::AddRange {
            items: new.to_vec(),
            index: 0,
        });
        return out;
    }

    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let limit = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(limit)
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let cells = (old_mid.len() + 1).saturating_mul(new_mid.len() + 1);
    if cells > MAX_ALIGN_CELLS {
        trace!(removed = old_mid.len(), added = new_mid.len(), "window middle too large to align");
        if !old_mid.is_empty() {
            out.push(ListChange::RemoveRange {
                items: old_mid.to_vec(),
                index: prefix,
            });
        }
        if !new_mid.is_empty() {
            out.push(ListChange::AddRange {
                items: new_mid.to_vec(),
                index: prefix,
            });
        }
        return out;
    }

    let mut changes: Vec<ListChange<T>> = Vec::new();
    let mut at = prefix;
    for edit in align(old_mid, new_mid) {
        match edit {
            Edit::Keep => at += 1,
            Edit::Remove(item) => changes.push(ListChange::Remove {
                item: item.clone(),
                index: at,
            }),
            Edit::Add(item) => {
                let merges = matches!(changes.last(), Some(ListChange::Remove { index, .. }) if *index == at);
                let merged = if merges { changes.pop() } else { None };
                match merged {
                    Some(ListChange::Remove { item: previous, .. }) => changes.push(ListChange::Replace {
                        current: item.clone(),
                        previous,
                        index: at,
                    }),
                    _ => changes.push(ListChange::Add {
                        item: item.clone(),
                        index: at,
                    }),
                }
                at += 1;
            }
        }
    }
    changes.into()
}

/// Edit script from a longest-common-subsequence table.
fn align<'a, T: PartialEq>(old: &'a [T], new: &'a [T]) -> Vec<Edit<'a, T>> {
    let (n, m) = (old.len(), new.len());
    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut edits = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            edits.push(Edit::Keep);
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            edits.push(Edit::Remove(&old[i]));
            i += 1;
        } else {
            edits.push(Edit::Add(&new[j]));
            j += 1;
        }
    }
    edits.extend(old[i..].iter().map(Edit::Remove));
    edits.extend(new[j..].iter().map(Edit::Add));
    edits
}
