//! # demgrid - Quantized Elevation Grids
//!
//! Library for turning a directory of geo-referenced elevation rasters
//! (GeoTIFF LiDAR tiles) into dense, quantized ground and surface grids over
//! an area of interest.
//!
//! ## Features
//!
//! - **Region-aware projection**: latitude/longitude to a national planar
//!   system (NZTM2000 for New Zealand), verified by a round-trip self-test
//! - **Cached catalogs**: raster footprints are scanned once per directory
//!   and persisted next to the tiles
//! - **Windowed decoding**: only the raster blocks covering the area are read,
//!   through a memory map
//! - **Compact grids**: 1 m cells holding 16-bit values in 0.25 m steps, with
//!   first-write-wins merging of overlapping tiles
//! - **Swathe tracking**: rasterize rotated sensor footprints into a seen-area
//!   grid
//! - **Tabular persistence**: grids encode to hex-chunked CSV tables
//!
//! ## Quick Start
//!
//! ```ignore
//! use demgrid::{BoundingBox, ElevationService, GlobalPoint, Layer};
//!
//! let service = ElevationService::new("/data/lidar", 16)?;
//! let area = service.load_area(&BoundingBox::new(-41.29, 174.77, -41.28, 174.78), true)?;
//!
//! let ground = area.elevation_at(GlobalPoint::new(-41.285, 174.775), Layer::Ground)?;
//! println!("Ground: {ground:.2}m");
//! ```
//!
//! ## Raster Requirements
//!
//! Each tile must carry a model tie point, a square pixel scale, and a
//! coordinate-system name (GeoAsciiParams) or EPSG code. Files whose name
//! contains `DSM` are surface models; all others are ground models.
//!
//! ## Grid Layout
//!
//! Row 0 is the southernmost row and column 0 the westernmost column; the
//! cell containing planar point `(n, e)` is
//! `(floor(n - min_northing), floor(e - min_easting))`.

pub mod catalog;
pub mod encoding;
pub mod error;
pub mod grid;
pub mod projection;
pub mod raster;
pub mod region;
pub mod service;
pub mod swathe;

// Re-export main types at crate root for convenience
pub use catalog::{CatalogOptions, PlanarRect, RowOrigin, TileCatalogIndex, TileDescriptor};
pub use encoding::{EncodedGrid, GridMetadata};
pub use error::{DemError, Result};
pub use grid::{ElevationGrid, GridExtent, QUANTUM, UNKNOWN};
pub use projection::{GlobalPoint, PlanarPoint, TransverseMercator};
pub use raster::{RasterHeader, RasterTile};
pub use region::{NewZealand, RegionStrategy, RegionTag};
pub use service::{
    AreaElevation, BoundingBox, CacheStats, ElevationService, ElevationServiceBuilder, Layer,
};
pub use swathe::SwatheGrid;
