//! Error types for the demgrid library.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur when building catalogs, decoding rasters or
/// working with elevation grids.
///
/// Missing data and implausible elevation values are not errors: queries
/// return `None`/NaN and insertions report `false` instead.
#[derive(Error, Debug)]
pub enum DemError {
    /// IO error when reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Low-level TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Error reading or writing a tabular (CSV) file.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Coordinates are outside the supported region envelope.
    #[error("Unsupported location: lat={lat}, lon={lon} is outside the {region} envelope")]
    UnsupportedLocation {
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
        /// Name of the region whose envelope was checked.
        region: &'static str,
    },

    /// A region tag that is known but has no projection implemented yet,
    /// or that is not recognised at all.
    #[error("Unsupported region: {0}")]
    UnsupportedRegion(String),

    /// Raster file is missing required tags or cannot be read.
    #[error("Corrupt tile {path}: {reason}")]
    CorruptTile {
        /// Path of the offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Cached catalog no longer matches the directory contents.
    #[error("Stale catalog index for {directory}: cache lists {cached} files, found {on_disk}")]
    StaleIndex {
        /// Directory the cache belongs to.
        directory: PathBuf,
        /// File count recorded in the cache.
        cached: usize,
        /// File count currently on disk.
        on_disk: usize,
    },

    /// Grid dimensions or cell index exceed the representable range.
    #[error("Grid index overflow: {rows} rows x {cols} cols")]
    IndexOverflow {
        /// Requested row count (or row index).
        rows: u64,
        /// Requested column count (or column index).
        cols: u64,
    },

    /// Bounds are not ordered or not finite.
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    /// Projection parameters failed the forward/inverse round-trip check.
    #[error(
        "Projection self-test failed at lat={lat}, lon={lon}: round trip gave lat={round_lat}, lon={round_lon}"
    )]
    ProjectionSelfTest {
        /// Reference latitude.
        lat: f64,
        /// Reference longitude.
        lon: f64,
        /// Latitude after forward and inverse projection.
        round_lat: f64,
        /// Longitude after forward and inverse projection.
        round_lon: f64,
    },

    /// Persisted grid table is malformed.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Layer name not recognised.
    #[error("Unknown layer: {0} (expected ground, surface or swathe)")]
    UnknownLayer(String),

    /// A catalog load shared between concurrent callers failed.
    #[error("Catalog load failed: {0}")]
    CatalogLoad(Arc<DemError>),
}

impl DemError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DemError::CorruptTile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using [`DemError`].
pub type Result<T> = std::result::Result<T, DemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DemError::UnsupportedLocation {
            lat: 51.5,
            lon: -0.1,
            region: "New Zealand",
        };
        assert!(err.to_string().contains("51.5"));
        assert!(err.to_string().contains("New Zealand"));

        let err = DemError::corrupt("DEM_BQ31_2013.tif", "missing ModelPixelScale tag");
        assert!(err.to_string().contains("DEM_BQ31_2013.tif"));
        assert!(err.to_string().contains("ModelPixelScale"));

        let err = DemError::IndexOverflow {
            rows: 1_000_000_000_000,
            cols: 1_000_000_000_000,
        };
        assert!(err.to_string().contains("1000000000000"));
    }
}
