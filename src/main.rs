use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use skytile::{
    AssociationTable, Associator, AssociatorConfig, ExportConfig, PointingSchema, Resolution,
};

#[derive(Parser)]
#[command(name = "skytile", about = "Associate survey pointings with HEALPix tiles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where pointings come from and how they are tiled.
#[derive(Args)]
struct PointingArgs {
    /// CSV table of pointings (RA/Dec in radians).
    #[arg(short, long)]
    pointings: PathBuf,

    /// HEALPix nside (power of two).
    #[arg(long, default_value = "1")]
    nside: u64,

    /// Field-of-view radius in degrees.
    #[arg(long, default_value = "1.75")]
    field_radius: f64,

    /// Pointing id column.
    #[arg(long, default_value = "obsHistID")]
    id_col: String,

    /// Right ascension column.
    #[arg(long, default_value = "ditheredRA")]
    ra_col: String,

    /// Declination column.
    #[arg(long, default_value = "ditheredDec")]
    dec_col: String,

    /// Optional per-pointing field radius column (degrees).
    #[arg(long)]
    radius_col: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the association and write it to a new table file.
    Build {
        #[command(flatten)]
        source: PointingArgs,

        /// Output table path. Must not exist.
        #[arg(short, long)]
        output: PathBuf,

        /// Rows written between commits.
        #[arg(long, default_value = "10000000")]
        batch_size: usize,
    },

    /// Look up a table by tile id or by pointing id.
    Query {
        /// Table written by `build`.
        #[arg(short, long)]
        table: PathBuf,

        /// Tile id to list pointings for.
        #[arg(long, conflicts_with = "pointing")]
        tile: Option<u64>,

        /// Pointing id to list tiles for.
        #[arg(long)]
        pointing: Option<i64>,
    },

    /// Print coverage statistics without writing anything.
    Summary {
        #[command(flatten)]
        source: PointingArgs,
    },
}

fn load_associator(args: &PointingArgs) -> Result<Associator> {
    let schema = PointingSchema {
        id_col: args.id_col.clone(),
        ra_col: args.ra_col.clone(),
        dec_col: args.dec_col.clone(),
        radius_col: args.radius_col.clone(),
        ..PointingSchema::default()
    };
    let config = AssociatorConfig {
        resolution: Resolution::from_nside(args.nside)?,
        field_radius_deg: args.field_radius,
    };
    Associator::from_csv(&args.pointings, &schema, &config)
        .with_context(|| format!("loading pointings from {}", args.pointings.display()))
}

fn cmd_build(source: &PointingArgs, output: &Path, batch_size: usize) -> Result<()> {
    let assoc = load_associator(source)?;
    eprintln!(
        "Associating {} pointings at {}, field radius {:.3} deg",
        assoc.len(),
        assoc.resolution(),
        source.field_radius
    );

    let summary = assoc
        .export(output, &ExportConfig { batch_size })
        .with_context(|| format!("writing table {}", output.display()))?;
    eprintln!(
        "Wrote {} rows in {} commit(s) to {}",
        summary.rows,
        summary.commits,
        output.display()
    );
    Ok(())
}

fn cmd_query(table_path: &Path, tile: Option<u64>, pointing: Option<i64>) -> Result<()> {
    let table = AssociationTable::read(table_path)
        .with_context(|| format!("reading table {}", table_path.display()))?;

    match (tile, pointing) {
        (Some(tile), _) => {
            let mut ids = table.pointing_ids_for_tile(tile)?;
            ids.sort_unstable();
            eprintln!("Tile {tile}: {} pointing(s)", ids.len());
            for id in ids {
                println!("{id}");
            }
        }
        (None, Some(pointing)) => {
            let mut tiles = table.tile_ids_for_pointing(pointing);
            tiles.sort_unstable();
            eprintln!("Pointing {pointing}: {} tile(s)", tiles.len());
            for t in tiles {
                println!("{t}");
            }
        }
        (None, None) => bail!("one of --tile or --pointing is required"),
    }
    Ok(())
}

fn cmd_summary(source: &PointingArgs) -> Result<()> {
    let assoc = load_associator(source)?;
    let index = assoc.association_index();
    let (n_pointings, n_tiles) = index.shape();

    println!("Pointings: {n_pointings}");
    println!("Resolution: {} ({n_tiles} tiles)", assoc.resolution());
    println!("Associations: {}", index.nnz());
    if n_pointings > 0 {
        println!(
            "Tiles per pointing: {:.2} (mean)",
            index.nnz() as f64 / n_pointings as f64
        );
    }

    let mut coverage: Vec<usize> = index.tile_coverage().iter().map(|&(_, n)| n).collect();
    println!(
        "Covered tiles: {} ({:.1}% of sky)",
        coverage.len(),
        100.0 * coverage.len() as f64 / n_tiles as f64
    );
    if !coverage.is_empty() {
        coverage.sort_unstable();
        println!("\nPointings per covered tile:");
        println!("  Min:    {}", coverage[0]);
        println!("  Median: {}", coverage[coverage.len() / 2]);
        println!(
            "  Mean:   {:.1}",
            coverage.iter().sum::<usize>() as f64 / coverage.len() as f64
        );
        println!("  Max:    {}", coverage[coverage.len() - 1]);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Build {
            source,
            output,
            batch_size,
        } => cmd_build(source, output, *batch_size),
        Commands::Query {
            table,
            tile,
            pointing,
        } => cmd_query(table, *tile, *pointing),
        Commands::Summary { source } => cmd_summary(source),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{e:#}");
        process::exit(1);
    }
}
