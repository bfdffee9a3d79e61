//! Survey pointings and loading them from CSV tables.

use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::error::{Result, SkytileError};
use crate::geom::sphere::direction_vector;

/// A single telescope observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Pointing {
    /// Unique observation id.
    pub id: i64,
    /// Right ascension in radians.
    pub ra: f64,
    /// Declination in radians.
    pub dec: f64,
    /// Precomputed unit direction vector, if the source table carried one.
    pub vec: Option<[f64; 3]>,
    /// Per-pointing field radius in degrees, overriding the associator's.
    pub field_radius_deg: Option<f64>,
}

impl Pointing {
    pub fn new(id: i64, ra: f64, dec: f64) -> Self {
        Pointing {
            id,
            ra,
            dec,
            vec: None,
            field_radius_deg: None,
        }
    }

    pub fn with_vector(mut self, vec: [f64; 3]) -> Self {
        self.vec = Some(vec);
        self
    }

    pub fn with_field_radius_deg(mut self, radius_deg: f64) -> Self {
        self.field_radius_deg = Some(radius_deg);
        self
    }

    /// Unit direction of the pointing: the stored vector scaled to unit
    /// length, or one derived from (ra, dec).
    ///
    /// `None` if RA is not finite, or the stored vector is zero or not finite.
    pub fn unit_direction(&self) -> Option<[f64; 3]> {
        if !self.ra.is_finite() {
            return None;
        }
        match self.vec {
            None => Some(direction_vector(self.ra, self.dec)),
            Some(v) => {
                let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
                (norm.is_finite() && norm > 0.0).then(|| v.map(|c| c / norm))
            }
        }
    }
}

/// Column names of a pointing table.
#[derive(Debug, Clone)]
pub struct PointingSchema {
    pub id_col: String,
    pub ra_col: String,
    pub dec_col: String,
    /// Components of a precomputed direction vector. Used only when all
    /// three columns are present.
    pub vec_cols: [String; 3],
    /// Optional per-pointing field radius column (degrees). Must exist when set.
    pub radius_col: Option<String>,
}

impl Default for PointingSchema {
    fn default() -> Self {
        PointingSchema {
            id_col: "obsHistID".to_string(),
            ra_col: "ditheredRA".to_string(),
            dec_col: "ditheredDec".to_string(),
            vec_cols: ["vec_x".to_string(), "vec_y".to_string(), "vec_z".to_string()],
            radius_col: None,
        }
    }
}

/// Column positions resolved against a header row.
struct Columns {
    id: usize,
    ra: usize,
    dec: usize,
    vec: Option<[usize; 3]>,
    radius: Option<usize>,
}

impl PointingSchema {
    fn resolve(&self, headers: &csv::StringRecord) -> Result<Columns> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                SkytileError::Schema(format!("column '{name}' not in pointing table"))
            })
        };

        let id = require(self.id_col.as_str())?;
        let ra = require(self.ra_col.as_str())?;
        let dec = require(self.dec_col.as_str())?;

        let vec = match self.vec_cols.each_ref().map(|c| find(c.as_str())) {
            [Some(x), Some(y), Some(z)] => Some([x, y, z]),
            _ => None,
        };
        let radius = match &self.radius_col {
            Some(col) => Some(require(col.as_str())?),
            None => None,
        };

        Ok(Columns {
            id,
            ra,
            dec,
            vec,
            radius,
        })
    }
}

fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    idx: usize,
    headers: &csv::StringRecord,
    row: usize,
) -> Result<T> {
    let raw = record.get(idx).unwrap_or("");
    raw.parse().map_err(|_| {
        SkytileError::Schema(format!(
            "row {row}: invalid value '{raw}' in column '{}'",
            headers.get(idx).unwrap_or("?")
        ))
    })
}

/// Read pointings from any CSV source with a header row.
///
/// The schema is checked against the header before any row is parsed.
pub fn read_pointings<R: Read>(reader: R, schema: &PointingSchema) -> Result<Vec<Pointing>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let cols = schema.resolve(&headers)?;

    let mut pointings = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let mut pointing = Pointing::new(
            parse_field(&record, cols.id, &headers, row)?,
            parse_field(&record, cols.ra, &headers, row)?,
            parse_field(&record, cols.dec, &headers, row)?,
        );
        if let Some([x, y, z]) = cols.vec {
            pointing.vec = Some([
                parse_field(&record, x, &headers, row)?,
                parse_field(&record, y, &headers, row)?,
                parse_field(&record, z, &headers, row)?,
            ]);
        }
        if let Some(r) = cols.radius {
            pointing.field_radius_deg = Some(parse_field(&record, r, &headers, row)?);
        }
        pointings.push(pointing);
    }
    Ok(pointings)
}

/// Load pointings from a CSV file.
pub fn load_pointings_csv(path: &Path, schema: &PointingSchema) -> Result<Vec<Pointing>> {
    let file = std::fs::File::open(path)?;
    let pointings = read_pointings(std::io::BufReader::new(file), schema)?;
    info!("Loaded {} pointings from {}", pointings.len(), path.display());
    Ok(pointings)
}
