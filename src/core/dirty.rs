//! Dirty-row tracking
//!
//! One bit per screen row. Writers set bits as they change a row; the
//! render pipeline reads the tight span of set bits and clears exactly the
//! rows it refreshed.

use serde::{Deserialize, Serialize};

/// Set of rows whose displayed image is stale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyRows {
    bits: Vec<bool>,
}

impl DirtyRows {
    /// Create a tracker for `rows` rows, all clean
    pub fn new(rows: usize) -> Self {
        Self {
            bits: vec![false; rows],
        }
    }

    /// Number of rows tracked
    pub fn rows(&self) -> usize {
        self.bits.len()
    }

    /// Mark a single row. Out-of-range rows are ignored.
    pub fn mark(&mut self, row: usize) {
        if let Some(bit) = self.bits.get_mut(row) {
            *bit = true;
        }
    }

    /// Mark rows `start..=end`
    pub fn mark_range(&mut self, start: usize, end: usize) {
        for bit in self.bits.iter_mut().take(end.saturating_add(1)).skip(start) {
            *bit = true;
        }
    }

    /// Mark every row
    pub fn mark_all(&mut self) {
        self.bits.iter_mut().for_each(|b| *b = true);
    }

    /// Check a single row
    pub fn is_dirty(&self, row: usize) -> bool {
        self.bits.get(row).copied().unwrap_or(false)
    }

    /// Check whether any row is dirty
    pub fn any(&self) -> bool {
        self.bits.iter().any(|&b| b)
    }

    /// Number of dirty rows
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Indices of dirty rows in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(row, &b)| b.then_some(row))
    }

    /// Tight inclusive range covering every dirty row
    pub fn span(&self) -> Option<(usize, usize)> {
        let first = self.bits.iter().position(|&b| b)?;
        let last = self.bits.iter().rposition(|&b| b)?;
        Some((first, last))
    }

    /// Clear rows `start..=end`
    pub fn clear_range(&mut self, start: usize, end: usize) {
        for bit in self.bits.iter_mut().take(end.saturating_add(1)).skip(start) {
            *bit = false;
        }
    }

    /// Clear every row
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|b| *b = false);
    }
}
