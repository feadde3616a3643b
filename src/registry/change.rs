// ============================================================================
// Structural Change Events
// ============================================================================
//
// Each mutation of the registry's ordered collection is described by one
// `RegistryChange`. Row indices in an event refer to the collection as it was
// immediately before the mutation, which is exactly what an observer holding
// stale row numbers needs to move them forward.
//
// ============================================================================

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Inserted,
    Removed,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// A record was appended at `row`, which equals `count() - 1` after the add.
    Inserted { row: usize, sequence: u64 },

    /// Rows were removed. Ranges are ascending, disjoint, non-adjacent and in
    /// pre-removal coordinates.
    Removed { ranges: Vec<Range<usize>> },

    /// Every row is gone; observers drop all row state.
    Reset,
}

impl RegistryChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            RegistryChange::Inserted { .. } => ChangeKind::Inserted,
            RegistryChange::Removed { .. } => ChangeKind::Removed,
            RegistryChange::Reset => ChangeKind::Reset,
        }
    }

    /// Number of rows this change removed. `None` for a reset, where the
    /// count is whatever the observer was displaying.
    pub fn removed_count(&self) -> Option<usize> {
        match self {
            RegistryChange::Inserted { .. } => Some(0),
            RegistryChange::Removed { ranges } => Some(ranges.iter().map(|r| r.len()).sum()),
            RegistryChange::Reset => None,
        }
    }

    /// Map a row index valid before this change to its index afterwards.
    /// Returns `None` when the row no longer exists.
    ///
    /// # Examples
    ///
    /// ```
    /// use pipetable::RegistryChange;
    ///
    /// let change = RegistryChange::Removed { ranges: vec![1..3, 5..6] };
    /// assert_eq!(change.remap_row(0), Some(0));
    /// assert_eq!(change.remap_row(2), None);
    /// assert_eq!(change.remap_row(4), Some(2));
    /// assert_eq!(change.remap_row(7), Some(4));
    /// ```
    pub fn remap_row(&self, row: usize) -> Option<usize> {
        match self {
            RegistryChange::Inserted { row: at, .. } => Some(if row >= *at { row + 1 } else { row }),
            RegistryChange::Removed { ranges } => {
                let mut shift = 0;
                for range in ranges {
                    if row < range.start {
                        break;
                    }
                    if range.contains(&row) {
                        return None;
                    }
                    shift += range.len();
                }
                Some(row - shift)
            }
            RegistryChange::Reset => None,
        }
    }
}

/// Collapse ascending row indices into half-open contiguous ranges.
pub(crate) fn coalesce_rows(rows: impl IntoIterator<Item = usize>) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for row in rows {
        match ranges.last_mut() {
            Some(last) if last.end == row => last.end += 1,
            _ => ranges.push(row..row + 1),
        }
    }
    ranges
}
