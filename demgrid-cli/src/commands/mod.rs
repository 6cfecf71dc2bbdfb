pub mod batch;
pub mod export;
pub mod index;
pub mod info;
pub mod list;
pub mod query;

use anyhow::{Context, Result};
use clap::Args;
use demgrid::{BoundingBox, ElevationService, ElevationServiceBuilder, RegionTag};
use std::path::PathBuf;

/// Half-width of the box loaded around a single query point, in degrees.
pub const POINT_PAD_DEG: f64 = 1e-5;

/// Settings shared by every command that needs the elevation service.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    /// Directory containing raster tiles
    #[arg(short, long, env = "DEMGRID_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Maximum catalogs in cache
    #[arg(
        short,
        long,
        env = "DEMGRID_CACHE_SIZE",
        default_value = "16",
        global = true
    )]
    pub cache_size: u64,

    /// Region of the tile library
    #[arg(short, long, env = "DEMGRID_REGION", default_value = "nz", global = true)]
    pub region: RegionTag,

    /// Scan subdirectories of the data directory
    #[arg(
        long,
        env = "DEMGRID_RECURSIVE",
        global = true,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub recursive: bool,

    /// Margin added around requested areas, in metres
    #[arg(long, env = "DEMGRID_BUFFER_MARGIN", default_value = "50", global = true)]
    pub buffer_margin: f64,
}

impl ServiceArgs {
    /// The data directory, required by every catalog-backed command.
    pub fn data_dir(&self) -> Result<PathBuf> {
        self.data_dir.clone().context(
            "DEMGRID_DATA_DIR environment variable not set. Use --data-dir or set DEMGRID_DATA_DIR",
        )
    }

    /// Build the elevation service.
    pub fn build(&self) -> Result<ElevationService> {
        let data_dir = self.data_dir()?;
        if !data_dir.is_dir() {
            anyhow::bail!("Data directory does not exist: {}", data_dir.display());
        }
        tracing::debug!(
            data_dir = %data_dir.display(),
            region = %self.region,
            recursive = self.recursive,
            "building elevation service"
        );

        ElevationServiceBuilder::new(data_dir)
            .cache_size(self.cache_size)
            .region(self.region)
            .recursive(self.recursive)
            .buffer_margin(self.buffer_margin)
            .build()
            .context("Failed to create elevation service")
    }
}

/// A tiny box around one point, enough to cover its grid cell.
pub fn point_box(lat: f64, lon: f64) -> BoundingBox {
    BoundingBox::new(
        lat - POINT_PAD_DEG,
        lon - POINT_PAD_DEG,
        lat + POINT_PAD_DEG,
        lon + POINT_PAD_DEG,
    )
}

/// Format an elevation for display, `void` when missing.
pub fn format_elevation(value: f32) -> String {
    if value.is_nan() {
        "void".to_string()
    } else {
        format!("{:.2}", value)
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
