//! Secondary coordinate index.
//!
//! Entries are ordered by `(x, y, id)`, so a range scan over the X interval
//! touches only candidates in `[min_x, max_x)` and the Y predicate filters
//! within that slice.

use std::collections::BTreeSet;
use std::ops::Bound;

use crate::geometry::{CoordKey, Rect};

type IndexKey = (CoordKey, CoordKey, String);

/// Ordered `(x, y) -> id` index supporting half-open range scans.
#[derive(Debug, Default, Clone)]
pub struct CoordIndex {
    entries: BTreeSet<IndexKey>,
}

impl CoordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `id` at `(x, y)`.
    pub fn insert(&mut self, id: &str, x: f64, y: f64) {
        self.entries
            .insert((CoordKey::new(x), CoordKey::new(y), id.to_string()));
    }

    /// Remove the entry for `id` at `(x, y)`. Returns whether it existed.
    pub fn remove(&mut self, id: &str, x: f64, y: f64) -> bool {
        self.entries
            .remove(&(CoordKey::new(x), CoordKey::new(y), id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Identifiers with `x ∈ [min_x, max_x)` and `y ∈ [min_y, max_y)`, in
    /// `(x, y, id)` order.
    pub fn range<'a>(&'a self, rect: &Rect) -> impl Iterator<Item = &'a str> + 'a {
        let rect = *rect;
        let scan = if rect.is_empty() {
            None
        } else {
            let lower = (
                CoordKey::new(rect.min_x),
                CoordKey::new(f64::NEG_INFINITY),
                String::new(),
            );
            let upper = (
                CoordKey::new(rect.max_x),
                CoordKey::new(f64::NEG_INFINITY),
                String::new(),
            );
            Some(
                self.entries
                    .range((Bound::Included(lower), Bound::Excluded(upper))),
            )
        };

        scan.into_iter()
            .flatten()
            .filter(move |(x, y, _)| rect.contains(x.value(), y.value()))
            .map(|(_, _, id)| id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<'a>(index: &'a CoordIndex, rect: &Rect) -> Vec<&'a str> {
        index.range(rect).collect()
    }

    #[test]
    fn test_range_half_open_on_both_axes() {
        let mut index = CoordIndex::new();
        index.insert("origin", 0.0, 0.0);
        index.insert("edge-x", 10.0, 5.0);
        index.insert("edge-y", 5.0, 10.0);
        index.insert("inside", 9.5, 9.5);

        assert_eq!(ids(&index, &Rect::new(0.0, 0.0, 10.0, 10.0)), vec!["origin", "inside"]);
    }

    #[test]
    fn test_remove_entry() {
        let mut index = CoordIndex::new();
        index.insert("a", 1.0, 1.0);
        assert!(index.remove("a", 1.0, 1.0));
        assert!(!index.remove("a", 1.0, 1.0));
        assert!(index.is_empty());
    }

    #[test]
    fn test_same_coordinates_distinct_ids() {
        let mut index = CoordIndex::new();
        index.insert("b", 3.0, 3.0);
        index.insert("a", 3.0, 3.0);
        assert_eq!(index.len(), 2);
        assert_eq!(ids(&index, &Rect::new(0.0, 0.0, 5.0, 5.0)), vec!["a", "b"]);
    }

    #[test]
    fn test_negative_zero_on_lower_bound() {
        let mut index = CoordIndex::new();
        index.insert("neg-zero", -0.0, -0.0);
        assert_eq!(ids(&index, &Rect::new(0.0, 0.0, 1.0, 1.0)), vec!["neg-zero"]);
    }

    #[test]
    fn test_empty_rect_yields_nothing() {
        let mut index = CoordIndex::new();
        index.insert("a", 1.0, 1.0);
        assert!(ids(&index, &Rect::new(5.0, 5.0, 1.0, 1.0)).is_empty());
    }
}
