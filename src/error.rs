//! Error types for association building, lookup and persistence.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the library.
#[derive(Debug, Error)]
pub enum SkytileError {
    /// Required columns are missing from a pointing table, or a field could
    /// not be parsed.
    #[error("schema error: {0}")]
    Schema(String),

    /// The export target already exists.
    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },

    /// A tile id outside `[0, npix)` was queried.
    #[error("tile id {tile} out of range (resolution has {npix} tiles)")]
    OutOfRange { tile: u64, npix: u64 },

    #[error("unknown pointing id {0}")]
    UnknownPointing(i64),

    #[error("duplicate pointing id {0}")]
    DuplicatePointing(i64),

    #[error("declination {dec} of pointing {id} outside [-pi/2, pi/2]")]
    InvalidDeclination { id: i64, dec: f64 },

    /// RA is not finite, or a supplied direction vector is zero or not
    /// finite.
    #[error("pointing {id} has no valid sky direction")]
    InvalidDirection { id: i64 },

    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("invalid field radius: {0} degrees")]
    InvalidRadius(f64),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Persisted table is malformed (bad magic, unsupported version,
    /// truncated, or missing its index section).
    #[error("format error: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, SkytileError>;
