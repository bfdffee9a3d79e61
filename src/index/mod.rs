//! Sparse pointing × tile association index.

pub mod builder;
pub mod store;

use crate::error::{Result, SkytileError};

/// Boolean sparse matrix of shape `(n_pointings, n_tiles)`.
///
/// Rows are stored compressed (CSR) with each row's tile ids sorted and
/// unique. Column lookups go through a second copy of the entries sorted by
/// `(tile, row)`, since `n_tiles` can be far too large for a dense column
/// offset table.
#[derive(Clone, PartialEq, Eq)]
pub struct AssociationIndex {
    n_tiles: u64,
    /// `row_offsets[p]..row_offsets[p + 1]` spans row `p` in `row_tiles`.
    row_offsets: Vec<usize>,
    row_tiles: Vec<u64>,
    /// All `(tile, row)` entries, sorted.
    by_tile: Vec<(u64, usize)>,
}

impl AssociationIndex {
    /// Build from coordinate lists, where entry `k` is `(rows[k], cols[k])`.
    ///
    /// Duplicate coordinates collapse into a single nonzero.
    ///
    /// # Panics
    ///
    /// If the lists differ in length, or a coordinate lies outside the shape.
    pub fn from_coordinates(n_pointings: usize, n_tiles: u64, rows: &[usize], cols: &[u64]) -> Self {
        assert_eq!(rows.len(), cols.len(), "coordinate lists differ in length");

        let mut counts = vec![0usize; n_pointings + 1];
        for (&r, &c) in rows.iter().zip(cols) {
            assert!(r < n_pointings, "row {r} outside {n_pointings} pointings");
            assert!(c < n_tiles, "tile {c} outside {n_tiles} tiles");
            counts[r + 1] += 1;
        }
        for i in 0..n_pointings {
            counts[i + 1] += counts[i];
        }

        // Scatter into rows, then sort and dedup each row in place.
        let mut cursor = counts.clone();
        let mut scattered = vec![0u64; cols.len()];
        for (&r, &c) in rows.iter().zip(cols) {
            scattered[cursor[r]] = c;
            cursor[r] += 1;
        }

        let mut row_offsets = Vec::with_capacity(n_pointings + 1);
        let mut row_tiles = Vec::with_capacity(cols.len());
        row_offsets.push(0);
        for p in 0..n_pointings {
            let row = &mut scattered[counts[p]..counts[p + 1]];
            row.sort_unstable();
            let start = row_tiles.len();
            for &t in row.iter() {
                if row_tiles.len() == start || row_tiles.last() != Some(&t) {
                    row_tiles.push(t);
                }
            }
            row_offsets.push(row_tiles.len());
        }

        let mut by_tile: Vec<(u64, usize)> = Vec::with_capacity(row_tiles.len());
        for p in 0..n_pointings {
            for &t in &row_tiles[row_offsets[p]..row_offsets[p + 1]] {
                by_tile.push((t, p));
            }
        }
        by_tile.sort_unstable();

        AssociationIndex {
            n_tiles,
            row_offsets,
            row_tiles,
            by_tile,
        }
    }

    /// `(pointing count, tile count)`.
    pub fn shape(&self) -> (usize, u64) {
        (self.row_offsets.len() - 1, self.n_tiles)
    }

    /// Number of nonzero entries.
    pub fn nnz(&self) -> usize {
        self.row_tiles.len()
    }

    /// Sorted tile ids associated with pointing position `row`.
    ///
    /// # Panics
    ///
    /// If `row` is not a valid pointing position.
    pub fn row(&self, row: usize) -> &[u64] {
        &self.row_tiles[self.row_offsets[row]..self.row_offsets[row + 1]]
    }

    /// Pointing positions associated with `tile`, in ascending order.
    pub fn column(&self, tile: u64) -> Result<Vec<usize>> {
        if tile >= self.n_tiles {
            return Err(SkytileError::OutOfRange {
                tile,
                npix: self.n_tiles,
            });
        }
        let start = self.by_tile.partition_point(|&(t, _)| t < tile);
        let end = self.by_tile.partition_point(|&(t, _)| t <= tile);
        Ok(self.by_tile[start..end].iter().map(|&(_, p)| p).collect())
    }

    /// Entry numbers (positions in [`iter`](Self::iter) order) of pointing
    /// position `row`.
    pub fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        self.row_offsets[row]..self.row_offsets[row + 1]
    }

    /// Entry numbers ordered by `(tile, row)`.
    pub fn entries_by_tile(&self) -> impl Iterator<Item = usize> + '_ {
        self.by_tile.iter().map(move |&(t, p)| {
            let row = self.row(p);
            self.row_offsets[p] + row.partition_point(|&x| x < t)
        })
    }

    /// Whether `(row, tile)` is a nonzero entry.
    pub fn contains(&self, row: usize, tile: u64) -> bool {
        row + 1 < self.row_offsets.len() && self.row(row).binary_search(&tile).is_ok()
    }

    /// All `(row, tile)` entries in row order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        (0..self.row_offsets.len() - 1)
            .flat_map(move |p| self.row(p).iter().map(move |&t| (p, t)))
    }

    /// Tiles with at least one pointing, paired with their pointing count,
    /// in ascending tile order.
    pub fn tile_coverage(&self) -> Vec<(u64, usize)> {
        let mut coverage: Vec<(u64, usize)> = Vec::new();
        for &(t, _) in &self.by_tile {
            match coverage.last_mut() {
                Some((last, count)) if *last == t => *count += 1,
                _ => coverage.push((t, 1)),
            }
        }
        coverage
    }
}

impl std::fmt::Debug for AssociationIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (rows, cols) = self.shape();
        f.debug_struct("AssociationIndex")
            .field("pointings", &rows)
            .field("tiles", &cols)
            .field("nnz", &self.nnz())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AssociationIndex {
        // Row 1 has no entries; row 2 repeats tile 5.
        AssociationIndex::from_coordinates(
            3,
            12,
            &[0, 0, 2, 2, 2, 0],
            &[4, 0, 5, 11, 5, 3],
        )
    }

    #[test]
    fn rows_sorted_and_deduplicated() {
        let idx = sample();
        assert_eq!(idx.shape(), (3, 12));
        assert_eq!(idx.row(0), &[0, 3, 4]);
        assert!(idx.row(1).is_empty());
        assert_eq!(idx.row(2), &[5, 11]);
        assert_eq!(idx.nnz(), 5);
    }

    #[test]
    fn columns() {
        let idx = sample();
        assert_eq!(idx.column(5).unwrap(), vec![2]);
        assert_eq!(idx.column(4).unwrap(), vec![0]);
        assert!(idx.column(7).unwrap().is_empty());
    }

    #[test]
    fn column_out_of_range() {
        let idx = sample();
        match idx.column(12) {
            Err(SkytileError::OutOfRange { tile, npix }) => {
                assert_eq!(tile, 12);
                assert_eq!(npix, 12);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn rows_and_columns_agree() {
        let idx = sample();
        for (p, t) in idx.iter() {
            assert!(idx.column(t).unwrap().contains(&p));
            assert!(idx.contains(p, t));
        }
        for t in 0..12 {
            for p in idx.column(t).unwrap() {
                assert!(idx.row(p).contains(&t));
            }
        }
        assert!(!idx.contains(1, 0));
        assert!(!idx.contains(9, 0));
    }

    #[test]
    fn entry_numbers_follow_tile_order() {
        let idx = sample();
        let entries: Vec<(usize, u64)> = idx.iter().collect();
        let by_tile: Vec<(u64, usize)> = idx
            .entries_by_tile()
            .map(|e| (entries[e].1, entries[e].0))
            .collect();
        assert_eq!(by_tile, vec![(0, 0), (3, 0), (4, 0), (5, 2), (11, 2)]);
        assert_eq!(idx.row_range(0), 0..3);
        assert_eq!(idx.row_range(1), 3..3);
        assert_eq!(idx.row_range(2), 3..5);
    }

    #[test]
    fn coverage_counts() {
        let idx = AssociationIndex::from_coordinates(2, 12, &[0, 0, 1, 1], &[1, 2, 2, 3]);
        assert_eq!(idx.tile_coverage(), vec![(1, 1), (2, 2), (3, 1)]);
    }

    #[test]
    fn empty_index() {
        let idx = AssociationIndex::from_coordinates(0, 12, &[], &[]);
        assert_eq!(idx.shape(), (0, 12));
        assert_eq!(idx.nnz(), 0);
        assert_eq!(idx.iter().count(), 0);
        assert!(idx.column(0).unwrap().is_empty());
    }
}
