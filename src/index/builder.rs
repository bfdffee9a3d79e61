use tracing::{debug, warn};

use crate::tiling::{Resolution, TilingOracle};

use super::AssociationIndex;

/// Flattened overlap coordinates: entry `k` associates pointing position
/// `rows[k]` with tile `cols[k]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coordinates {
    pub rows: Vec<usize>,
    pub cols: Vec<u64>,
}

impl Coordinates {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Query the oracle once per pointing, in input order, and flatten the
/// per-pointing tile lists.
///
/// `rows` repeats each pointing's position once per returned tile; `cols`
/// concatenates the tile lists in the order the oracle produced them. A
/// pointing whose disc touches no tile contributes nothing. Tile ids at or
/// past the resolution's tile count are dropped with a warning.
pub fn overlap_coordinates(
    oracle: &impl TilingOracle,
    resolution: Resolution,
    vectors: &[[f64; 3]],
    radii: &[f64],
) -> Coordinates {
    assert_eq!(vectors.len(), radii.len(), "one radius per pointing");

    let npix = resolution.npix();
    let per_pointing: Vec<Vec<u64>> = vectors
        .iter()
        .zip(radii)
        .enumerate()
        .map(|(i, (&vec, &radius))| {
            let mut tiles = oracle.query_disc(resolution, vec, radius);
            let before = tiles.len();
            tiles.retain(|&t| t < npix);
            if tiles.len() < before {
                warn!(
                    "Oracle returned {} tile id(s) >= {npix} for pointing {i}; dropped",
                    before - tiles.len()
                );
            }
            tiles
        })
        .collect();

    let total: usize = per_pointing.iter().map(Vec::len).sum();
    let mut coords = Coordinates {
        rows: Vec::with_capacity(total),
        cols: Vec::with_capacity(total),
    };
    for (i, tiles) in per_pointing.into_iter().enumerate() {
        coords.rows.extend(std::iter::repeat_n(i, tiles.len()));
        coords.cols.extend(tiles);
    }

    debug!(
        "Overlap: {} pointings, {} (pointing, tile) pairs at {}",
        vectors.len(),
        coords.len(),
        resolution
    );
    coords
}

/// Run the overlap computation and pack the result into an index.
pub fn build_index(
    oracle: &impl TilingOracle,
    resolution: Resolution,
    vectors: &[[f64; 3]],
    radii: &[f64],
) -> AssociationIndex {
    let coords = overlap_coordinates(oracle, resolution, vectors, radii);
    AssociationIndex::from_coordinates(vectors.len(), resolution.npix(), &coords.rows, &coords.cols)
}
