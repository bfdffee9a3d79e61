//! Association of survey pointings with HEALPix tiles.

use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::path::Path;
use std::sync::OnceLock;

use tracing::info;

use crate::error::{Result, SkytileError};
use crate::index::AssociationIndex;
use crate::index::builder::build_index;
use crate::index::store::{ExportConfig, ExportSummary, write_index};
use crate::pointing::{Pointing, PointingSchema, load_pointings_csv};
use crate::tiling::{HealpixOracle, Resolution, TilingOracle};

/// Configuration for an [`Associator`].
#[derive(Debug, Clone, Copy)]
pub struct AssociatorConfig {
    pub resolution: Resolution,
    /// Field-of-view radius in degrees, used for pointings that carry no
    /// radius of their own.
    pub field_radius_deg: f64,
}

impl Default for AssociatorConfig {
    fn default() -> Self {
        AssociatorConfig {
            resolution: Resolution::BASE,
            field_radius_deg: 1.75,
        }
    }
}

fn radius_to_radians(radius_deg: f64) -> Result<f64> {
    if !radius_deg.is_finite() || radius_deg < 0.0 {
        return Err(SkytileError::InvalidRadius(radius_deg));
    }
    Ok(radius_deg.to_radians())
}

/// Associates a frozen set of pointings with the tiles their fields cover.
///
/// The association index is computed on first use and cached for the
/// lifetime of the associator. Initialization goes through a [`OnceLock`],
/// so the associator can be shared across threads and the computation still
/// runs exactly once.
pub struct Associator<O: TilingOracle = HealpixOracle> {
    pointings: Vec<Pointing>,
    vectors: Vec<[f64; 3]>,
    radii: Vec<f64>,
    positions: HashMap<i64, usize>,
    resolution: Resolution,
    field_radius: f64,
    oracle: O,
    index: OnceLock<AssociationIndex>,
}

impl Associator<HealpixOracle> {
    pub fn new(pointings: Vec<Pointing>, config: &AssociatorConfig) -> Result<Self> {
        Self::with_oracle(pointings, config, HealpixOracle)
    }

    /// Load pointings from a CSV table and build an associator over them.
    ///
    /// Fails with [`SkytileError::Schema`] if the table lacks the id, RA or
    /// Dec columns named by `schema`.
    pub fn from_csv(path: &Path, schema: &PointingSchema, config: &AssociatorConfig) -> Result<Self> {
        let pointings = load_pointings_csv(path, schema)?;
        Self::new(pointings, config)
    }
}

impl<O: TilingOracle> Associator<O> {
    /// Validates ids, directions and radii. Supplied direction vectors are
    /// scaled to unit length; pointings without one get a vector derived
    /// from (ra, dec).
    pub fn with_oracle(pointings: Vec<Pointing>, config: &AssociatorConfig, oracle: O) -> Result<Self> {
        let field_radius = radius_to_radians(config.field_radius_deg)?;

        let mut positions = HashMap::with_capacity(pointings.len());
        let mut vectors = Vec::with_capacity(pointings.len());
        let mut radii = Vec::with_capacity(pointings.len());
        for (i, p) in pointings.iter().enumerate() {
            if positions.insert(p.id, i).is_some() {
                return Err(SkytileError::DuplicatePointing(p.id));
            }
            if !(-FRAC_PI_2..=FRAC_PI_2).contains(&p.dec) {
                return Err(SkytileError::InvalidDeclination { id: p.id, dec: p.dec });
            }
            let direction = p
                .unit_direction()
                .ok_or(SkytileError::InvalidDirection { id: p.id })?;
            vectors.push(direction);
            radii.push(match p.field_radius_deg {
                Some(r) => radius_to_radians(r)?,
                None => field_radius,
            });
        }

        Ok(Associator {
            pointings,
            vectors,
            radii,
            positions,
            resolution: config.resolution,
            field_radius,
            oracle,
            index: OnceLock::new(),
        })
    }

    pub fn pointings(&self) -> &[Pointing] {
        &self.pointings
    }

    pub fn len(&self) -> usize {
        self.pointings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointings.is_empty()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Default field radius in radians.
    pub fn field_radius(&self) -> f64 {
        self.field_radius
    }

    /// Direction vectors, one per pointing in input order.
    pub fn vectors(&self) -> &[[f64; 3]] {
        &self.vectors
    }

    /// The association index, computing it on first call.
    pub fn association_index(&self) -> &AssociationIndex {
        self.index.get_or_init(|| {
            let index = build_index(&self.oracle, self.resolution, &self.vectors, &self.radii);
            info!(
                "Built association index: {} pointings, {} tiles, {} associations",
                self.pointings.len(),
                self.resolution.npix(),
                index.nnz()
            );
            index
        })
    }

    /// Force the index to be computed now, e.g. before sharing the
    /// associator with other threads.
    pub fn ensure_computed(&self) {
        self.association_index();
    }

    pub fn is_computed(&self) -> bool {
        self.index.get().is_some()
    }

    /// Position of a pointing id in input order.
    pub fn position_of(&self, pointing_id: i64) -> Result<usize> {
        self.positions
            .get(&pointing_id)
            .copied()
            .ok_or(SkytileError::UnknownPointing(pointing_id))
    }

    /// Sorted tile ids covered by a pointing's field.
    pub fn tiles_for_pointing(&self, pointing_id: i64) -> Result<&[u64]> {
        let row = self.position_of(pointing_id)?;
        Ok(self.association_index().row(row))
    }

    /// Ids of the pointings whose fields cover `tile`, in input order.
    ///
    /// Fails with [`SkytileError::OutOfRange`] unless `tile < npix`.
    pub fn pointings_for_tile(&self, tile: u64) -> Result<Vec<i64>> {
        let rows = self.association_index().column(tile)?;
        Ok(rows.into_iter().map(|r| self.pointings[r].id).collect())
    }

    /// Every association as `(tile id, pointing id)`, grouped by pointing in
    /// input order.
    pub fn pairs(&self) -> Vec<(u64, i64)> {
        self.association_index()
            .iter()
            .map(|(row, tile)| (tile, self.pointings[row].id))
            .collect()
    }

    /// Write all associations to a new two-column table at `path`.
    ///
    /// Rows are streamed from the in-memory index, which is left untouched.
    pub fn export(&self, path: &Path, config: &ExportConfig) -> Result<ExportSummary> {
        let ids: Vec<i64> = self.pointings.iter().map(|p| p.id).collect();
        write_index(path, self.resolution, self.association_index(), &ids, config)
    }
}

impl<O: TilingOracle> std::fmt::Debug for Associator<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Associator")
            .field("pointings", &self.pointings.len())
            .field("resolution", &self.resolution)
            .field("field_radius", &self.field_radius)
            .field("computed", &self.is_computed())
            .finish()
    }
}
