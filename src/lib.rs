//! Survey pointing to HEALPix tile association.
//!
//! Skytile computes, for every telescope pointing, the set of nested HEALPix
//! tiles its field of view touches, packs the (pointing, tile) pairs into a
//! sparse association index answering lookups in both directions, and
//! persists the pairs as a two-column table indexed on each column.

pub mod associator;
pub mod error;
pub mod geom;
pub mod healpix;
pub mod index;
pub mod pointing;
pub mod tiling;

pub use associator::{Associator, AssociatorConfig};
pub use error::{Result, SkytileError};
pub use index::AssociationIndex;
pub use index::store::{AssociationTable, ExportConfig, ExportSummary};
pub use pointing::{Pointing, PointingSchema};
pub use tiling::{HealpixOracle, Resolution, TilingOracle};
