//! Tiling oracles: map a disc on the sky to the tiles it touches.

use std::fmt;

use crate::error::{Result, SkytileError};
use crate::healpix;

/// HEALPix resolution, stored as the nested depth (`nside = 2^depth`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    depth: u8,
}

impl Resolution {
    /// Nside 1: the 12 base pixels.
    pub const BASE: Resolution = Resolution { depth: 0 };

    pub fn from_depth(depth: u8) -> Result<Self> {
        if depth > healpix::MAX_DEPTH {
            return Err(SkytileError::InvalidResolution(format!(
                "depth {depth} exceeds maximum {}",
                healpix::MAX_DEPTH
            )));
        }
        Ok(Resolution { depth })
    }

    /// Nested numbering requires `nside` to be a power of two.
    pub fn from_nside(nside: u64) -> Result<Self> {
        if !nside.is_power_of_two() {
            return Err(SkytileError::InvalidResolution(format!(
                "nside {nside} is not a power of two"
            )));
        }
        Self::from_depth(nside.trailing_zeros() as u8)
    }

    pub fn depth(self) -> u8 {
        self.depth
    }

    pub fn nside(self) -> u64 {
        healpix::nside(self.depth)
    }

    /// Total number of tiles: `12 * nside^2`.
    pub fn npix(self) -> u64 {
        healpix::npix(self.depth)
    }

    /// Solid angle of one tile in steradians.
    pub fn pixel_area(self) -> f64 {
        healpix::pixel_area(self.depth)
    }

    /// Tile containing the given direction.
    pub fn tile_of(self, ra: f64, dec: f64) -> u64 {
        healpix::lon_lat_to_nested(ra, dec, self.depth)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::BASE
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nside={} (depth {})", self.nside(), self.depth)
    }
}

/// Maps a direction plus angular radius to the tiles whose cells intersect
/// that disc.
///
/// Implementations must be inclusive: a tile touched by the disc anywhere is
/// returned, not only tiles whose centre falls inside it. Returning the same
/// tile twice is tolerated; the association index collapses duplicates.
/// Ids must be below `resolution.npix()`; larger ids are dropped when the
/// association index is built.
pub trait TilingOracle {
    /// `center` is a unit vector, `radius` is in radians.
    fn query_disc(&self, resolution: Resolution, center: [f64; 3], radius: f64) -> Vec<u64>;
}

/// Oracle backed by the crate's own nested HEALPix implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealpixOracle;

impl TilingOracle for HealpixOracle {
    fn query_disc(&self, resolution: Resolution, center: [f64; 3], radius: f64) -> Vec<u64> {
        healpix::query_disc(resolution.depth(), center, radius)
    }
}

/// Oracle backed by the `cdshealpix` crate's approximate cone coverage.
#[cfg(feature = "cds")]
#[derive(Debug, Clone, Copy, Default)]
pub struct CdsOracle;

#[cfg(feature = "cds")]
impl TilingOracle for CdsOracle {
    fn query_disc(&self, resolution: Resolution, center: [f64; 3], radius: f64) -> Vec<u64> {
        let (lon, lat) = crate::geom::sphere::xyz_to_radec(center);
        cdshealpix::nested::cone_coverage_approx(resolution.depth(), lon, lat, radius)
            .flat_iter()
            .collect()
    }
}
