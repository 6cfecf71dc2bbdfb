use anyhow::Result;
use clap::{Parser, Subcommand};
use demgrid::Layer;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::ServiceArgs;

/// Ground and surface elevation tool for LiDAR raster tile libraries
#[derive(Parser)]
#[command(name = "demgrid")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the tile catalog of a directory
    Index {
        /// Directory to scan (defaults to the data directory)
        directory: Option<PathBuf>,
    },

    /// List catalogued raster tiles
    List,

    /// Display header information about a raster file
    Info {
        /// Path to a GeoTIFF tile
        file: PathBuf,
    },

    /// Query elevation for a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Only report this layer (ground or surface)
        #[arg(short, long)]
        layer: Option<Layer>,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add ground and surface elevations to a CSV of coordinates
    Batch {
        /// Input CSV file
        input: PathBuf,

        /// Output file (defaults to <input>_elevation.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude
        #[arg(long, default_value = "lon")]
        lon_col: String,
    },

    /// Load an area and write its layers as encoded tables
    Export {
        /// Southern boundary latitude
        #[arg(long, allow_hyphen_values = true)]
        min_lat: f64,

        /// Western boundary longitude
        #[arg(long, allow_hyphen_values = true)]
        min_lon: f64,

        /// Northern boundary latitude
        #[arg(long, allow_hyphen_values = true)]
        max_lat: f64,

        /// Eastern boundary longitude
        #[arg(long, allow_hyphen_values = true)]
        max_lon: f64,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Fill cells no raster covered with the layer's minimum
        #[arg(long)]
        fill_gaps: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demgrid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Index { directory } => commands::index::run(&cli.service, directory),
        Commands::List => commands::list::run(&cli.service),
        Commands::Info { file } => commands::info::run(file),
        Commands::Query {
            lat,
            lon,
            layer,
            json,
        } => commands::query::run(&cli.service, lat, lon, layer, json),
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
        } => commands::batch::run(&cli.service, input, output, lat_col, lon_col),
        Commands::Export {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
            output,
            fill_gaps,
        } => commands::export::run(
            &cli.service,
            demgrid::BoundingBox::new(min_lat, min_lon, max_lat, max_lon),
            output,
            fill_gaps,
        ),
    }
}
