//! Dense, quantized elevation grids at 1 m resolution.
//!
//! An [`ElevationGrid`] covers a rectangular planar window (plus a buffer
//! margin) with one signed 16-bit value per 1 m × 1 m cell, in units of
//! 0.25 m. Cells start out unknown and are written at most once: the first
//! sample to land in a cell wins, so later (possibly lower quality)
//! overlapping tiles never clobber earlier ones.
//!
//! Unknown cells hold [`UNKNOWN`] (`i16::MIN`), which is distinct from zero:
//! a stored `0` always means sea level.
//!
//! Row 0 is the southernmost row; the cell index is
//! `row * cols + col` with both computed from the grid's minimum bounds.

use tracing::{debug, warn};

use crate::catalog::PlanarRect;
use crate::error::{DemError, Result};
use crate::projection::{GlobalPoint, PlanarPoint};
use crate::region::RegionStrategy;

/// Vertical resolution of stored elevations, in metres.
pub const QUANTUM: f32 = 0.25;

/// In-memory marker for cells that never received a sample.
pub const UNKNOWN: i16 = i16::MIN;

/// Default buffer margin around a requested area, in metres.
pub const DEFAULT_BUFFER_MARGIN: f64 = 50.0;

/// Largest cell count a grid may hold; flat indices must fit an `i32`.
///
/// About 46 km square at 1 m resolution, or 4 GiB of elevation values.
pub const MAX_CELLS: usize = i32::MAX as usize;

/// Quantize an elevation to the nearest 0.25 m unit.
///
/// Returns `None` for NaN, for values at or below the [`UNKNOWN`] sentinel,
/// and for values that do not fit the 16-bit range.
pub fn quantize(elevation_m: f32) -> Option<i16> {
    let units = (elevation_m / QUANTUM).round();
    if units.is_nan() || units <= UNKNOWN as f32 || units > i16::MAX as f32 {
        None
    } else {
        Some(units as i16)
    }
}

/// Convert quantized units back to metres.
pub fn dequantize(units: i16) -> f32 {
    units as f32 * QUANTUM
}

/// Bounds and index arithmetic shared by elevation and swathe grids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridExtent {
    min_northing: f64,
    max_northing: f64,
    min_easting: f64,
    max_easting: f64,
    rows: usize,
    cols: usize,
}

impl GridExtent {
    /// Extent covering `[min - margin, max + margin]`, snapped outwards to
    /// whole metres.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::InvalidBounds`] unless `min < max` on both axes
    /// and all values are finite, or [`DemError::IndexOverflow`] if the cell
    /// count exceeds [`MAX_CELLS`].
    pub fn new(min: PlanarPoint, max: PlanarPoint, margin: f64) -> Result<Self> {
        if !(margin >= 0.0 && margin.is_finite()) {
            return Err(DemError::InvalidBounds(format!("bad margin {margin}")));
        }
        Self::check_order(min, max)?;
        Self::from_bounds(
            (min.northing - margin).floor(),
            (max.northing + margin).ceil(),
            (min.easting - margin).floor(),
            (max.easting + margin).ceil(),
        )
    }

    /// Extent with exact whole-metre bounds (both inclusive).
    pub fn from_bounds(
        min_northing: f64,
        max_northing: f64,
        min_easting: f64,
        max_easting: f64,
    ) -> Result<Self> {
        Self::check_order(
            PlanarPoint::new(min_northing, min_easting),
            PlanarPoint::new(max_northing, max_easting),
        )?;

        let rows = Self::span(max_northing - min_northing);
        let cols = Self::span(max_easting - min_easting);
        let (rows, cols) = match (rows, cols) {
            (Some(r), Some(c)) => (r, c),
            _ => {
                return Err(DemError::IndexOverflow {
                    rows: (max_northing - min_northing) as u64,
                    cols: (max_easting - min_easting) as u64,
                })
            }
        };
        if rows.checked_mul(cols).map_or(true, |cells| cells > MAX_CELLS) {
            return Err(DemError::IndexOverflow {
                rows: rows as u64,
                cols: cols as u64,
            });
        }

        Ok(Self {
            min_northing,
            max_northing,
            min_easting,
            max_easting,
            rows,
            cols,
        })
    }

    fn check_order(min: PlanarPoint, max: PlanarPoint) -> Result<()> {
        let finite = [min.northing, min.easting, max.northing, max.easting]
            .iter()
            .all(|v| v.is_finite());
        if !finite || min.northing >= max.northing || min.easting >= max.easting {
            return Err(DemError::InvalidBounds(format!(
                "min ({}, {}) must be below max ({}, {})",
                min.northing, min.easting, max.northing, max.easting
            )));
        }
        Ok(())
    }

    /// Number of whole-metre cells spanning `length` (inclusive bounds).
    fn span(length: f64) -> Option<usize> {
        let cells = length.ceil() + 1.0;
        if cells.is_finite() && cells >= 1.0 && cells < usize::MAX as f64 {
            Some(cells as usize)
        } else {
            None
        }
    }

    /// Row count.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column count.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total cell count.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Always false: an extent has at least one cell.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Southern bound.
    pub fn min_northing(&self) -> f64 {
        self.min_northing
    }

    /// Northern bound.
    pub fn max_northing(&self) -> f64 {
        self.max_northing
    }

    /// Western bound.
    pub fn min_easting(&self) -> f64 {
        self.min_easting
    }

    /// Eastern bound.
    pub fn max_easting(&self) -> f64 {
        self.max_easting
    }

    /// The extent as a planar rectangle.
    pub fn rect(&self) -> PlanarRect {
        PlanarRect::new(
            self.min_northing,
            self.max_northing,
            self.min_easting,
            self.max_easting,
        )
    }

    /// Row and column of the cell containing `point`, if inside the grid.
    pub fn locate(&self, point: PlanarPoint) -> Option<(usize, usize)> {
        let dn = (point.northing - self.min_northing).floor();
        let de = (point.easting - self.min_easting).floor();
        if !(dn >= 0.0 && de >= 0.0) || dn >= self.rows as f64 || de >= self.cols as f64 {
            return None;
        }
        Some((dn as usize, de as usize))
    }

    /// Flat index of cell `(row, col)`.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::IndexOverflow`] if the arithmetic overflows.
    pub fn cell_index(&self, row: usize, col: usize) -> Result<usize> {
        row.checked_mul(self.cols)
            .and_then(|i| i.checked_add(col))
            .ok_or(DemError::IndexOverflow {
                rows: row as u64,
                cols: col as u64,
            })
    }

    /// Flat index of the cell containing `point`.
    pub fn index_of(&self, point: PlanarPoint) -> Result<Option<usize>> {
        match self.locate(point) {
            Some((row, col)) => self.cell_index(row, col).map(Some),
            None => Ok(None),
        }
    }

    /// Planar position of the centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> PlanarPoint {
        PlanarPoint::new(
            self.min_northing + row as f64 + 0.5,
            self.min_easting + col as f64 + 0.5,
        )
    }
}

/// A dense quantized elevation grid.
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    extent: GridExtent,
    values: Vec<i16>,
    count: usize,
    range: Option<(i16, i16)>,
    plausible_max: f32,
    source: String,
    vertical_accuracy: f32,
}

impl ElevationGrid {
    /// Allocate an empty grid covering `[min - margin, max + margin]`.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::InvalidBounds`] for unordered bounds and
    /// [`DemError::IndexOverflow`] for extents too large to index.
    pub fn new(min: PlanarPoint, max: PlanarPoint, buffer_margin: f64) -> Result<Self> {
        Ok(Self::from_extent(GridExtent::new(min, max, buffer_margin)?))
    }

    /// Allocate an empty grid over an existing extent.
    pub fn from_extent(extent: GridExtent) -> Self {
        Self {
            extent,
            values: vec![UNKNOWN; extent.len()],
            count: 0,
            range: None,
            plausible_max: i16::MAX as f32 * QUANTUM,
            source: String::new(),
            vertical_accuracy: 0.0,
        }
    }

    /// Rebuild a grid from persisted cell values and summary.
    pub(crate) fn from_parts(
        extent: GridExtent,
        values: Vec<i16>,
        count: usize,
        range: Option<(i16, i16)>,
    ) -> Self {
        debug_assert_eq!(values.len(), extent.len());
        Self {
            extent,
            values,
            count,
            range,
            plausible_max: i16::MAX as f32 * QUANTUM,
            source: String::new(),
            vertical_accuracy: 0.0,
        }
    }

    /// Reject elevations above `max` metres as bad data.
    pub fn with_plausible_max(mut self, max: f32) -> Self {
        self.plausible_max = max;
        self
    }

    /// Set the data source label.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the vertical accuracy estimate in metres.
    pub fn with_vertical_accuracy(mut self, accuracy: f32) -> Self {
        self.vertical_accuracy = accuracy;
        self
    }

    /// The grid's extent.
    pub fn extent(&self) -> &GridExtent {
        &self.extent
    }

    /// Data source label.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Vertical accuracy estimate in metres.
    pub fn vertical_accuracy(&self) -> f32 {
        self.vertical_accuracy
    }

    /// Plausible maximum elevation in metres.
    pub fn plausible_max(&self) -> f32 {
        self.plausible_max
    }

    /// Number of cells that received a sample.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Lowest and highest stored value, in quantized units.
    pub fn quantized_range(&self) -> Option<(i16, i16)> {
        self.range
    }

    /// Lowest stored elevation in metres.
    pub fn min_elevation(&self) -> Option<f32> {
        self.range.map(|(lo, _)| dequantize(lo))
    }

    /// Highest stored elevation in metres.
    pub fn max_elevation(&self) -> Option<f32> {
        self.range.map(|(_, hi)| dequantize(hi))
    }

    /// Raw quantized cell values, row 0 (south) first.
    pub fn values(&self) -> &[i16] {
        &self.values
    }

    /// Insert a sample; the first write to a cell wins.
    ///
    /// Returns `Ok(true)` if the cell was written, `Ok(false)` if it was
    /// already known, lies outside the grid, or the value is implausible.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::IndexOverflow`] if index arithmetic overflows.
    pub fn insert(&mut self, point: PlanarPoint, elevation_m: f32) -> Result<bool> {
        let Some(index) = self.extent.index_of(point)? else {
            return Ok(false);
        };
        Ok(self.insert_at(index, elevation_m))
    }

    /// Insert a sample at a flat cell index.
    pub(crate) fn insert_at(&mut self, index: usize, elevation_m: f32) -> bool {
        if self.values[index] != UNKNOWN {
            return false;
        }
        if elevation_m > self.plausible_max {
            return false;
        }
        let Some(units) = quantize(elevation_m) else {
            return false;
        };

        self.values[index] = units;
        self.count += 1;
        self.range = Some(match self.range {
            Some((lo, hi)) => (lo.min(units), hi.max(units)),
            None => (units, units),
        });
        true
    }

    /// Insert a batch of samples, returning how many cells were written.
    pub fn absorb<I>(&mut self, samples: I) -> Result<usize>
    where
        I: IntoIterator<Item = (PlanarPoint, f32)>,
    {
        let mut written = 0;
        for (point, elevation) in samples {
            if self.insert(point, elevation)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Set every unknown cell to the grid's minimum observed value.
    ///
    /// Raster sources commonly omit data over water, so gaps are modelled
    /// as lying at the lowest known elevation. Returns the number of cells
    /// filled; a grid with no samples is left untouched. The sample count
    /// and range are unchanged.
    pub fn fill_gaps(&mut self) -> usize {
        let Some((lo, _)) = self.range else {
            warn!("fill_gaps on a grid without samples");
            return 0;
        };
        let mut filled = 0;
        for v in self.values.iter_mut().filter(|v| **v == UNKNOWN) {
            *v = lo;
            filled += 1;
        }
        debug!(filled, fill_value = dequantize(lo), "filled grid gaps");
        filled
    }

    /// Whether any cell is still unknown.
    pub fn has_gaps(&self) -> bool {
        self.values.contains(&UNKNOWN)
    }

    /// Elevation at a planar point, or `None` if outside or unknown.
    pub fn query_by_planar(&self, point: PlanarPoint) -> Option<f32> {
        let index = self.extent.index_of(point).ok()??;
        match self.values[index] {
            UNKNOWN => None,
            v => Some(dequantize(v)),
        }
    }

    /// Elevation at a global point.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::UnsupportedLocation`] if the point lies outside the
    /// region's envelope. Missing data is `Ok(None)`.
    pub fn query_by_global(
        &self,
        region: &dyn RegionStrategy,
        point: GlobalPoint,
    ) -> Result<Option<f32>> {
        let planar = region.project(point)?;
        Ok(self.query_by_planar(planar))
    }

    /// Elevation at cell `(row, col)`, NaN if unknown.
    ///
    /// # Panics
    ///
    /// Panics if the cell lies outside the grid.
    pub fn query_by_grid_index(&self, row: usize, col: usize) -> f32 {
        assert!(
            row < self.extent.rows && col < self.extent.cols,
            "cell ({row}, {col}) outside {}x{} grid",
            self.extent.rows,
            self.extent.cols
        );
        match self.values[row * self.extent.cols + col] {
            UNKNOWN => f32::NAN,
            v => dequantize(v),
        }
    }
}
