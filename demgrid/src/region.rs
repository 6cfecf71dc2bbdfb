//! Region strategies: which projection, catalog tag and elevation limits apply.
//!
//! A [`RegionStrategy`] bundles everything that is specific to one country's
//! elevation data. [`RegionTag`] selects a strategy at runtime; only New
//! Zealand is implemented, other known regions fail with
//! [`DemError::UnsupportedRegion`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::catalog::RowOrigin;
use crate::error::{DemError, Result};
use crate::projection::{
    Ellipsoid, GlobalPoint, PlanarPoint, TransverseMercator, TransverseMercatorParams,
};

/// Maximum round-trip error accepted by the projection self-test, in degrees.
pub const SELF_TEST_TOLERANCE_DEG: f64 = 1e-6;

/// Latitude/longitude rectangle a region accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalEnvelope {
    /// Southern boundary.
    pub min_lat: f64,
    /// Northern boundary.
    pub max_lat: f64,
    /// Western boundary.
    pub min_lon: f64,
    /// Eastern boundary.
    pub max_lon: f64,
}

impl GlobalEnvelope {
    /// Check if a point lies within the envelope (inclusive).
    pub fn contains(&self, point: GlobalPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }
}

/// Country-specific behaviour for projection, cataloguing and validation.
pub trait RegionStrategy: Send + Sync + fmt::Debug {
    /// Human-readable region name.
    fn name(&self) -> &'static str;

    /// The region's planar projection.
    fn projection(&self) -> &TransverseMercator;

    /// Supported latitude/longitude envelope.
    fn envelope(&self) -> GlobalEnvelope;

    /// Canonical coordinate-system tag of rasters in this region.
    fn catalog_tag(&self) -> &'static str;

    /// Whether a raster's coordinate-system tag belongs to this region.
    fn accepts_crs(&self, crs: &str) -> bool;

    /// Lowest and highest plausible elevation in metres.
    fn plausible_elevation_bounds(&self) -> (f32, f32);

    /// Vertical accuracy of the region's elevation sources, in metres.
    fn vertical_accuracy(&self) -> f32;

    /// Where raster row 0 lies for this region's rasters.
    fn row_origin(&self) -> RowOrigin {
        RowOrigin::Top
    }

    /// Project a global point, rejecting points outside the envelope.
    fn project(&self, point: GlobalPoint) -> Result<PlanarPoint> {
        if !self.envelope().contains(point) {
            return Err(DemError::UnsupportedLocation {
                lat: point.lat,
                lon: point.lon,
                region: self.name(),
            });
        }
        Ok(self.projection().to_planar(point))
    }

    /// Inverse-project a planar point, rejecting results outside the envelope.
    fn unproject(&self, point: PlanarPoint) -> Result<GlobalPoint> {
        let global = self.projection().to_global(point);
        if !self.envelope().contains(global) {
            return Err(DemError::UnsupportedLocation {
                lat: global.lat,
                lon: global.lon,
                region: self.name(),
            });
        }
        Ok(global)
    }
}

/// Run the forward/inverse round trip on reference points.
///
/// # Errors
///
/// Returns [`DemError::ProjectionSelfTest`] for the first point whose round
/// trip misses by more than [`SELF_TEST_TOLERANCE_DEG`].
pub fn self_test(projection: &TransverseMercator, references: &[GlobalPoint]) -> Result<()> {
    for &point in references {
        let round = projection.round_trip(point);
        if (round.lat - point.lat).abs() > SELF_TEST_TOLERANCE_DEG
            || (round.lon - point.lon).abs() > SELF_TEST_TOLERANCE_DEG
            || !round.lat.is_finite()
            || !round.lon.is_finite()
        {
            return Err(DemError::ProjectionSelfTest {
                lat: point.lat,
                lon: point.lon,
                round_lat: round.lat,
                round_lon: round.lon,
            });
        }
    }
    Ok(())
}

/// New Zealand: NZTM2000 over GRS80.
#[derive(Debug, Clone)]
pub struct NewZealand {
    projection: TransverseMercator,
}

impl NewZealand {
    /// NZTM2000 projection parameters.
    pub const NZTM2000: TransverseMercatorParams = TransverseMercatorParams {
        ellipsoid: Ellipsoid::GRS80,
        central_meridian: 173.0,
        origin_latitude: 0.0,
        scale_factor: 0.9996,
        false_easting: 1_600_000.0,
        false_northing: 10_000_000.0,
    };

    /// Supported envelope, covering the main islands and Stewart Island.
    pub const ENVELOPE: GlobalEnvelope = GlobalEnvelope {
        min_lat: -48.0,
        max_lat: -34.0,
        min_lon: 166.0,
        max_lon: 179.0,
    };

    /// Aoraki/Mount Cook is 3724 m.
    pub const MAX_ELEVATION: f32 = 3800.0;

    /// Create the strategy and verify the projection constants.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::ProjectionSelfTest`] if the round trip between
    /// the opposite corners of the envelope fails.
    pub fn new() -> Result<Self> {
        Self::with_params(Self::NZTM2000)
    }

    /// Create the strategy with custom projection parameters.
    pub fn with_params(params: TransverseMercatorParams) -> Result<Self> {
        let projection = TransverseMercator::new(params);
        let envelope = Self::ENVELOPE;
        self_test(
            &projection,
            &[
                GlobalPoint::new(envelope.max_lat, envelope.min_lon),
                GlobalPoint::new(envelope.min_lat, envelope.max_lon),
            ],
        )?;
        Ok(Self { projection })
    }
}

impl RegionStrategy for NewZealand {
    fn name(&self) -> &'static str {
        "New Zealand"
    }

    fn projection(&self) -> &TransverseMercator {
        &self.projection
    }

    fn envelope(&self) -> GlobalEnvelope {
        Self::ENVELOPE
    }

    fn catalog_tag(&self) -> &'static str {
        "NZGD2000 / New Zealand Transverse Mercator 2000"
    }

    fn accepts_crs(&self, crs: &str) -> bool {
        let crs = crs.to_ascii_lowercase();
        crs.contains("new zealand transverse mercator")
            || crs.contains("nztm")
            || crs.trim() == "epsg:2193"
    }

    fn plausible_elevation_bounds(&self) -> (f32, f32) {
        (-100.0, Self::MAX_ELEVATION)
    }

    fn vertical_accuracy(&self) -> f32 {
        0.2
    }
}

/// Runtime tag naming a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionTag {
    /// New Zealand (NZTM2000).
    NewZealand,
    /// Australia (not yet supported).
    Australia,
    /// United Kingdom (not yet supported).
    UnitedKingdom,
}

impl RegionTag {
    /// Build the strategy for this region.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::UnsupportedRegion`] for regions without a
    /// projection, or [`DemError::ProjectionSelfTest`] if the constants are bad.
    pub fn strategy(self) -> Result<Arc<dyn RegionStrategy>> {
        match self {
            RegionTag::NewZealand => Ok(Arc::new(NewZealand::new()?)),
            other => Err(DemError::UnsupportedRegion(other.to_string())),
        }
    }
}

impl fmt::Display for RegionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegionTag::NewZealand => "nz",
            RegionTag::Australia => "au",
            RegionTag::UnitedKingdom => "uk",
        };
        f.write_str(s)
    }
}

impl FromStr for RegionTag {
    type Err = DemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nz" | "nzl" | "new-zealand" | "newzealand" => Ok(RegionTag::NewZealand),
            "au" | "aus" | "australia" => Ok(RegionTag::Australia),
            "uk" | "gb" | "united-kingdom" => Ok(RegionTag::UnitedKingdom),
            other => Err(DemError::UnsupportedRegion(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_zealand_self_test_passes() {
        assert!(NewZealand::new().is_ok());
    }

    #[test]
    fn test_bad_constants_fail_self_test() {
        let mut params = NewZealand::NZTM2000;
        params.scale_factor = f64::NAN;
        let err = NewZealand::with_params(params).unwrap_err();
        assert!(matches!(err, DemError::ProjectionSelfTest { .. }));
    }

    #[test]
    fn test_project_rejects_outside_envelope() {
        let nz = NewZealand::new().unwrap();

        // Wellington is inside
        assert!(nz.project(GlobalPoint::new(-41.2865, 174.7762)).is_ok());

        // London is not
        let err = nz.project(GlobalPoint::new(51.5, -0.12)).unwrap_err();
        assert!(matches!(err, DemError::UnsupportedLocation { .. }));

        // Sydney is not
        assert!(nz.project(GlobalPoint::new(-33.87, 151.21)).is_err());
    }

    #[test]
    fn test_unproject_round_trip() {
        let nz = NewZealand::new().unwrap();
        let p = GlobalPoint::new(-43.5321, 172.6362);
        let planar = nz.project(p).unwrap();
        let back = nz.unproject(planar).unwrap();
        assert!((back.lat - p.lat).abs() < 1e-6);
        assert!((back.lon - p.lon).abs() < 1e-6);
    }

    #[test]
    fn test_accepts_crs() {
        let nz = NewZealand::new().unwrap();
        assert!(nz.accepts_crs("NZGD2000 / New Zealand Transverse Mercator 2000|"));
        assert!(nz.accepts_crs("EPSG:2193"));
        assert!(!nz.accepts_crs("WGS 84 / UTM zone 60S"));
    }

    #[test]
    fn test_region_tags() {
        assert_eq!("nz".parse::<RegionTag>().unwrap(), RegionTag::NewZealand);
        assert_eq!("NZ".parse::<RegionTag>().unwrap(), RegionTag::NewZealand);
        assert_eq!("au".parse::<RegionTag>().unwrap(), RegionTag::Australia);
        assert!("mars".parse::<RegionTag>().is_err());

        assert!(RegionTag::NewZealand.strategy().is_ok());
        assert!(matches!(
            RegionTag::Australia.strategy().unwrap_err(),
            DemError::UnsupportedRegion(_)
        ));
    }
}
