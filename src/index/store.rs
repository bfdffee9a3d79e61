//! On-disk association table.
//!
//! Layout (little-endian):
//!
//! ```text
//! "SKYT" | version u32 | depth u32 | n_rows u64
//! n_rows × (tile id u64, pointing id i64)
//! "IDXS" | n_rows × u64 row numbers ordered by tile id
//!        | n_rows × u64 row numbers ordered by pointing id
//! ```
//!
//! Rows carry no uniqueness constraint. The index section is appended only
//! after every row is on disk, so an interrupted export leaves a file that
//! `AssociationTable::read` rejects.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, SkytileError};
use crate::tiling::Resolution;

use super::AssociationIndex;

const MAGIC: &[u8; 4] = b"SKYT";
const INDEX_MAGIC: &[u8; 4] = b"IDXS";
const VERSION: u32 = 1;

/// Export tuning.
#[derive(Debug, Clone, Copy)]
pub struct ExportConfig {
    /// Rows written between commits (flush + fsync).
    pub batch_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            batch_size: 10_000_000,
        }
    }
}

/// What an export wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: usize,
    /// Commits issued while writing rows, including the final partial batch.
    pub commits: usize,
}

fn write_u32(w: &mut impl Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64(w: &mut impl Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_i64(w: &mut impl Write, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64(r: &mut impl Read) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn commit(w: &mut BufWriter<File>) -> io::Result<()> {
    w.flush()?;
    w.get_ref().sync_data()
}

fn truncated(what: &str) -> impl FnOnce(io::Error) -> SkytileError + '_ {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SkytileError::Format(format!("truncated table: {what} incomplete"))
        } else {
            SkytileError::Io(e)
        }
    }
}

/// Row numbers sorted by `key`, ties kept in row order.
fn sorted_rows<K: Ord>(n: usize, key: impl Fn(usize) -> K) -> Vec<u64> {
    let mut perm: Vec<usize> = (0..n).collect();
    perm.sort_by_key(|&i| key(i));
    perm.into_iter().map(|i| i as u64).collect()
}

fn is_ordered<K: Ord>(index: &[u64], key: impl Fn(usize) -> K) -> bool {
    index
        .windows(2)
        .all(|w| key(w[0] as usize) <= key(w[1] as usize))
}

fn create_target(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => SkytileError::AlreadyExists {
                path: path.to_path_buf(),
            },
            _ => SkytileError::Io(e),
        })?;
    Ok(BufWriter::new(file))
}

/// Stream `n_rows` rows, then the two column indexes, into a new file.
///
/// `tile_order` and `pointing_order` must each yield every row number once,
/// ordered by tile id and by pointing id respectively.
fn write_rows(
    path: &Path,
    resolution: Resolution,
    n_rows: usize,
    rows: impl Iterator<Item = (u64, i64)>,
    tile_order: impl Iterator<Item = u64>,
    pointing_order: impl Iterator<Item = u64>,
    config: &ExportConfig,
) -> Result<ExportSummary> {
    let mut w = create_target(path)?;

    w.write_all(MAGIC)?;
    write_u32(&mut w, VERSION)?;
    write_u32(&mut w, resolution.depth() as u32)?;
    write_u64(&mut w, n_rows as u64)?;

    let batch_size = config.batch_size.max(1);
    let mut commits = 0;
    let mut written = 0;
    for (tile, pointing) in rows {
        write_u64(&mut w, tile)?;
        write_i64(&mut w, pointing)?;
        written += 1;
        if written % batch_size == 0 {
            commit(&mut w)?;
            commits += 1;
            debug!("Committed {written} of {n_rows} rows");
        }
    }
    debug_assert_eq!(written, n_rows);
    if written == 0 || written % batch_size != 0 {
        commit(&mut w)?;
        commits += 1;
    }
    info!("Committed {written} rows to {}", path.display());

    w.write_all(INDEX_MAGIC)?;
    info!("Creating tile index");
    for row in tile_order {
        write_u64(&mut w, row)?;
    }
    info!("Creating pointing index");
    for row in pointing_order {
        write_u64(&mut w, row)?;
    }
    commit(&mut w)?;

    Ok(ExportSummary {
        rows: written,
        commits,
    })
}

/// Write arbitrary `(tile id, pointing id)` rows to a new table at `path`,
/// followed by one lookup index per column.
///
/// Fails with [`SkytileError::AlreadyExists`] if `path` exists; the file is
/// never overwritten.
pub fn write_table(
    path: &Path,
    resolution: Resolution,
    pairs: &[(u64, i64)],
    config: &ExportConfig,
) -> Result<ExportSummary> {
    let tile_order = sorted_rows(pairs.len(), |i| pairs[i].0);
    let pointing_order = sorted_rows(pairs.len(), |i| pairs[i].1);
    write_rows(
        path,
        resolution,
        pairs.len(),
        pairs.iter().copied(),
        tile_order.into_iter(),
        pointing_order.into_iter(),
        config,
    )
}

/// Write the entries of `index` as `(tile id, pointing id)` rows, in
/// pointing order, without materializing the pairs.
///
/// `pointing_ids[p]` is the id of pointing position `p`. The tile index
/// comes straight from the index's column ordering; only the pointing
/// positions are sorted by id.
///
/// # Panics
///
/// If `pointing_ids` does not have one id per index row.
pub fn write_index(
    path: &Path,
    resolution: Resolution,
    index: &AssociationIndex,
    pointing_ids: &[i64],
    config: &ExportConfig,
) -> Result<ExportSummary> {
    let (n_pointings, _) = index.shape();
    assert_eq!(pointing_ids.len(), n_pointings, "one id per pointing");

    let mut by_id: Vec<usize> = (0..n_pointings).collect();
    by_id.sort_by_key(|&p| pointing_ids[p]);

    write_rows(
        path,
        resolution,
        index.nnz(),
        index.iter().map(|(p, tile)| (tile, pointing_ids[p])),
        index.entries_by_tile().map(|e| e as u64),
        by_id
            .into_iter()
            .flat_map(|p| index.row_range(p))
            .map(|e| e as u64),
        config,
    )
}

/// A persisted association table loaded into memory.
#[derive(Debug, Clone)]
pub struct AssociationTable {
    resolution: Resolution,
    rows: Vec<(u64, i64)>,
    tile_index: Vec<u64>,
    pointing_index: Vec<u64>,
}

impl AssociationTable {
    pub fn read(path: &Path) -> Result<AssociationTable> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(truncated("header"))?;
        if &magic != MAGIC {
            return Err(SkytileError::Format("invalid magic bytes".to_string()));
        }

        let version = read_u32(&mut r).map_err(truncated("header"))?;
        if version != VERSION {
            return Err(SkytileError::Format(format!(
                "unsupported version: {version}"
            )));
        }

        let depth = read_u32(&mut r).map_err(truncated("header"))?;
        let resolution = u8::try_from(depth)
            .map_err(|_| SkytileError::Format(format!("invalid depth {depth}")))
            .and_then(Resolution::from_depth)?;
        let n_rows = read_u64(&mut r).map_err(truncated("header"))? as usize;

        // Header counts are untrusted until the rows are actually read.
        let reserve = n_rows.min(1 << 20);
        let mut rows = Vec::with_capacity(reserve);
        for _ in 0..n_rows {
            let tile = read_u64(&mut r).map_err(truncated("rows"))?;
            let pointing = read_i64(&mut r).map_err(truncated("rows"))?;
            rows.push((tile, pointing));
        }

        let mut index_magic = [0u8; 4];
        r.read_exact(&mut index_magic).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                SkytileError::Format("table has no index section".to_string())
            } else {
                SkytileError::Io(e)
            }
        })?;
        if &index_magic != INDEX_MAGIC {
            return Err(SkytileError::Format("invalid index marker".to_string()));
        }

        let mut read_index = |name: &str| -> Result<Vec<u64>> {
            let mut index = Vec::with_capacity(reserve);
            for _ in 0..n_rows {
                let row = read_u64(&mut r).map_err(truncated(name))?;
                if row as usize >= n_rows {
                    return Err(SkytileError::Format(format!(
                        "{name} references row {row} of {n_rows}"
                    )));
                }
                index.push(row);
            }
            Ok(index)
        };
        let tile_index = read_index("tile index")?;
        let pointing_index = read_index("pointing index")?;

        if !is_ordered(&tile_index, |i| rows[i].0) || !is_ordered(&pointing_index, |i| rows[i].1) {
            return Err(SkytileError::Format("index out of order".to_string()));
        }

        info!(
            "Loaded association table: {} rows at {}",
            rows.len(),
            resolution
        );
        Ok(AssociationTable {
            resolution,
            rows,
            tile_index,
            pointing_index,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(tile id, pointing id)` rows in file order.
    pub fn pairs(&self) -> &[(u64, i64)] {
        &self.rows
    }

    /// Pointing ids stored against `tile`, via the tile index.
    pub fn pointing_ids_for_tile(&self, tile: u64) -> Result<Vec<i64>> {
        let npix = self.resolution.npix();
        if tile >= npix {
            return Err(SkytileError::OutOfRange { tile, npix });
        }
        let key = |row: &u64| self.rows[*row as usize].0;
        let start = self.tile_index.partition_point(|r| key(r) < tile);
        let end = self.tile_index.partition_point(|r| key(r) <= tile);
        Ok(self.tile_index[start..end]
            .iter()
            .map(|&r| self.rows[r as usize].1)
            .collect())
    }

    /// Tile ids stored against `pointing`, via the pointing index. Empty if
    /// the pointing does not appear in the table.
    pub fn tile_ids_for_pointing(&self, pointing: i64) -> Vec<u64> {
        let key = |row: &u64| self.rows[*row as usize].1;
        let start = self.pointing_index.partition_point(|r| key(r) < pointing);
        let end = self.pointing_index.partition_point(|r| key(r) <= pointing);
        self.pointing_index[start..end]
            .iter()
            .map(|&r| self.rows[r as usize].0)
            .collect()
    }
}
