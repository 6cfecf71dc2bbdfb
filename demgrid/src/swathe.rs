//! Rasterization of sensor footprints into a "seen" grid.
//!
//! Each footprint is the quadrilateral a moving sensor observed at one
//! instant. A cell counts as seen when its centre lies inside the
//! quadrilateral under the even-odd rule, so rotated, skewed and even
//! self-intersecting footprints are all handled the same way.

use tracing::trace;

use crate::error::Result;
use crate::grid::GridExtent;
use crate::projection::PlanarPoint;

/// Cells observed by a sensor, at 1 m resolution.
#[derive(Debug, Clone)]
pub struct SwatheGrid {
    extent: GridExtent,
    seen: Vec<bool>,
    seen_count: usize,
}

impl SwatheGrid {
    /// Allocate an all-unseen grid covering `[min - margin, max + margin]`.
    pub fn new(min: PlanarPoint, max: PlanarPoint, buffer_margin: f64) -> Result<Self> {
        Ok(Self::from_extent(GridExtent::new(min, max, buffer_margin)?))
    }

    /// Allocate an all-unseen grid over an existing extent.
    pub fn from_extent(extent: GridExtent) -> Self {
        Self {
            extent,
            seen: vec![false; extent.len()],
            seen_count: 0,
        }
    }

    /// The grid's extent.
    pub fn extent(&self) -> &GridExtent {
        &self.extent
    }

    /// Number of seen cells; one cell is one square metre.
    pub fn seen_count(&self) -> usize {
        self.seen_count
    }

    /// Whether cell `(row, col)` has been seen.
    ///
    /// # Panics
    ///
    /// Panics if the cell lies outside the grid.
    pub fn is_seen(&self, row: usize, col: usize) -> bool {
        assert!(
            row < self.extent.rows() && col < self.extent.cols(),
            "cell ({row}, {col}) outside swathe grid"
        );
        self.seen[row * self.extent.cols() + col]
    }

    /// Whether the cell containing `point` has been seen.
    pub fn is_seen_at(&self, point: PlanarPoint) -> bool {
        match self.extent.index_of(point) {
            Ok(Some(index)) => self.seen[index],
            _ => false,
        }
    }

    /// Mark one cell seen, returning whether it was newly marked.
    pub(crate) fn set_seen(&mut self, index: usize) -> bool {
        if self.seen[index] {
            return false;
        }
        self.seen[index] = true;
        self.seen_count += 1;
        true
    }

    /// Mark every cell whose centre lies inside `footprint` as seen.
    ///
    /// Returns the number of newly marked cells. Parts of the footprint
    /// outside the grid are ignored.
    pub fn mark_seen(&mut self, footprint: [PlanarPoint; 4]) -> Result<usize> {
        let mut min_n = f64::INFINITY;
        let mut max_n = f64::NEG_INFINITY;
        let mut min_e = f64::INFINITY;
        let mut max_e = f64::NEG_INFINITY;
        for p in &footprint {
            if !p.northing.is_finite() || !p.easting.is_finite() {
                return Ok(0);
            }
            min_n = min_n.min(p.northing);
            max_n = max_n.max(p.northing);
            min_e = min_e.min(p.easting);
            max_e = max_e.max(p.easting);
        }

        let Some((row_lo, row_hi)) = clip(
            min_n - self.extent.min_northing(),
            max_n - self.extent.min_northing(),
            self.extent.rows(),
        ) else {
            return Ok(0);
        };
        let Some((col_lo, col_hi)) = clip(
            min_e - self.extent.min_easting(),
            max_e - self.extent.min_easting(),
            self.extent.cols(),
        ) else {
            return Ok(0);
        };

        let mut marked = 0;
        for row in row_lo..row_hi {
            for col in col_lo..col_hi {
                let centre = self.extent.cell_center(row, col);
                if contains(&footprint, centre) {
                    let index = self.extent.cell_index(row, col)?;
                    if self.set_seen(index) {
                        marked += 1;
                    }
                }
            }
        }
        trace!(marked, "footprint rasterized");
        Ok(marked)
    }
}

/// Cell range `[lo, hi)` covering offsets `[from, to]`, clipped to `len`.
fn clip(from: f64, to: f64, len: usize) -> Option<(usize, usize)> {
    let lo = from.floor().max(0.0);
    let hi = (to.ceil() + 1.0).min(len as f64);
    if lo >= hi {
        return None;
    }
    Some((lo as usize, hi as usize))
}

/// Even-odd point-in-polygon test by edge crossing.
fn contains(polygon: &[PlanarPoint; 4], point: PlanarPoint) -> bool {
    let (x, y) = (point.easting, point.northing);
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].easting, polygon[i].northing);
        let (xj, yj) = (polygon[j].easting, polygon[j].northing);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SwatheGrid {
        SwatheGrid::new(PlanarPoint::new(0.0, 0.0), PlanarPoint::new(50.0, 50.0), 0.0).unwrap()
    }

    fn square(n: f64, e: f64, size: f64) -> [PlanarPoint; 4] {
        [
            PlanarPoint::new(n, e),
            PlanarPoint::new(n, e + size),
            PlanarPoint::new(n + size, e + size),
            PlanarPoint::new(n + size, e),
        ]
    }

    #[test]
    fn test_square_footprint_coverage() {
        let mut swathe = grid();
        let marked = swathe.mark_seen(square(10.0, 20.0, 10.0)).unwrap();
        assert_eq!(marked, 100);
        assert_eq!(swathe.seen_count(), 100);

        for row in 0..swathe.extent().rows() {
            for col in 0..swathe.extent().cols() {
                let inside = (10..20).contains(&row) && (20..30).contains(&col);
                assert_eq!(swathe.is_seen(row, col), inside, "cell ({row}, {col})");
            }
        }
    }

    #[test]
    fn test_marking_is_idempotent() {
        let mut swathe = grid();
        swathe.mark_seen(square(10.0, 10.0, 10.0)).unwrap();
        let again = swathe.mark_seen(square(15.0, 15.0, 10.0)).unwrap();
        assert_eq!(again, 100 - 25);
        assert_eq!(swathe.seen_count(), 175);
    }

    #[test]
    fn test_rotated_footprint_fills_interior() {
        let mut swathe = grid();
        // Diamond centred on (25, 25) with 10 m half-diagonals
        let diamond = [
            PlanarPoint::new(15.0, 25.0),
            PlanarPoint::new(25.0, 35.0),
            PlanarPoint::new(35.0, 25.0),
            PlanarPoint::new(25.0, 15.0),
        ];
        let marked = swathe.mark_seen(diamond).unwrap();

        // Area is 200 m², cells are counted by centre
        assert!((180..=220).contains(&marked), "marked {marked}");
        assert!(swathe.is_seen_at(PlanarPoint::new(25.0, 25.0)));
        assert!(swathe.is_seen_at(PlanarPoint::new(20.0, 25.0)));
        assert!(!swathe.is_seen_at(PlanarPoint::new(16.0, 16.0)));
        assert!(!swathe.is_seen_at(PlanarPoint::new(34.0, 34.0)));
    }

    #[test]
    fn test_footprint_clipped_to_grid() {
        let mut swathe = grid();
        let marked = swathe.mark_seen(square(-5.0, -5.0, 10.0)).unwrap();
        assert_eq!(marked, 25);
        assert!(swathe.is_seen(0, 0));
        assert!(swathe.is_seen(4, 4));
        assert!(!swathe.is_seen(5, 5));
    }

    #[test]
    fn test_footprint_outside_grid() {
        let mut swathe = grid();
        assert_eq!(swathe.mark_seen(square(500.0, 500.0, 10.0)).unwrap(), 0);
        assert_eq!(swathe.mark_seen(square(-50.0, 10.0, 10.0)).unwrap(), 0);
        assert_eq!(swathe.seen_count(), 0);
    }

    #[test]
    fn test_degenerate_footprint() {
        let mut swathe = grid();
        let line = [
            PlanarPoint::new(10.0, 10.0),
            PlanarPoint::new(10.0, 20.0),
            PlanarPoint::new(10.0, 20.0),
            PlanarPoint::new(10.0, 10.0),
        ];
        assert_eq!(swathe.mark_seen(line).unwrap(), 0);

        let mut bad = square(10.0, 10.0, 5.0);
        bad[2] = PlanarPoint::new(f64::NAN, 12.0);
        assert_eq!(swathe.mark_seen(bad).unwrap(), 0);
    }
}
