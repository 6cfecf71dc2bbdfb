//! Transverse Mercator projection between geographic and planar coordinates.
//!
//! This module implements Redfearn's series for the Transverse Mercator
//! projection. Forward conversion computes the meridian arc length and applies
//! a power series in the longitude difference; inverse conversion recovers the
//! foot-point latitude from the meridian arc and applies the complementary
//! series. Both series carry terms up to eighth order, which keeps round-trip
//! error well below a millimetre within a few hundred kilometres of the
//! central meridian.
//!
//! The functions here are pure and perform no region checks; see
//! [`crate::region`] for envelope validation.

use std::f64::consts::PI;

/// A point in global coordinates (decimal degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalPoint {
    /// Latitude in decimal degrees (negative = south).
    pub lat: f64,
    /// Longitude in decimal degrees (negative = west).
    pub lon: f64,
}

impl GlobalPoint {
    /// Create a new global point.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A point in the local projected system (metres).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarPoint {
    /// Northing in metres.
    pub northing: f64,
    /// Easting in metres.
    pub easting: f64,
}

impl PlanarPoint {
    /// Create a new planar point.
    pub fn new(northing: f64, easting: f64) -> Self {
        Self { northing, easting }
    }
}

/// Reference ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis in metres.
    pub semi_major_axis: f64,
    /// Inverse flattening.
    pub inverse_flattening: f64,
}

impl Ellipsoid {
    /// GRS80 ellipsoid.
    pub const GRS80: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_378_137.0,
        inverse_flattening: 298.257_222_101,
    };

    /// Flattening `f = 1 / rf`.
    pub fn flattening(&self) -> f64 {
        if self.inverse_flattening == 0.0 {
            0.0
        } else {
            1.0 / self.inverse_flattening
        }
    }

    /// First eccentricity squared.
    pub fn eccentricity_squared(&self) -> f64 {
        let f = self.flattening();
        2.0 * f - f * f
    }
}

/// Parameters of a Transverse Mercator projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercatorParams {
    /// Reference ellipsoid.
    pub ellipsoid: Ellipsoid,
    /// Central meridian in decimal degrees.
    pub central_meridian: f64,
    /// Latitude of origin in decimal degrees.
    pub origin_latitude: f64,
    /// Scale factor on the central meridian.
    pub scale_factor: f64,
    /// False easting in metres.
    pub false_easting: f64,
    /// False northing in metres.
    pub false_northing: f64,
}

/// A Transverse Mercator projection with precomputed constants.
#[derive(Debug, Clone, Copy)]
pub struct TransverseMercator {
    params: TransverseMercatorParams,
    a: f64,
    f: f64,
    e2: f64,
    meridian: f64,
    /// Meridian arc length at the latitude of origin.
    origin_arc: f64,
}

impl TransverseMercator {
    /// Create a projection from its defining parameters.
    pub fn new(params: TransverseMercatorParams) -> Self {
        let a = params.ellipsoid.semi_major_axis;
        let f = params.ellipsoid.flattening();
        let e2 = params.ellipsoid.eccentricity_squared();
        let mut tm = Self {
            params,
            a,
            f,
            e2,
            meridian: params.central_meridian.to_radians(),
            origin_arc: 0.0,
        };
        tm.origin_arc = tm.meridian_arc(params.origin_latitude.to_radians());
        tm
    }

    /// Defining parameters.
    pub fn params(&self) -> &TransverseMercatorParams {
        &self.params
    }

    /// Meridian arc length from the equator to latitude `lat` (radians).
    fn meridian_arc(&self, lat: f64) -> f64 {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        let a0 = 1.0 - (e2 / 4.0) - (3.0 * e4 / 64.0) - (5.0 * e6 / 256.0);
        let a2 = (3.0 / 8.0) * (e2 + e4 / 4.0 + 15.0 * e6 / 128.0);
        let a4 = (15.0 / 256.0) * (e4 + 3.0 * e6 / 4.0);
        let a6 = 35.0 * e6 / 3072.0;

        self.a
            * (a0 * lat - a2 * (2.0 * lat).sin() + a4 * (4.0 * lat).sin()
                - a6 * (6.0 * lat).sin())
    }

    /// Latitude (radians) whose meridian arc equals `arc`.
    fn foot_point_latitude(&self, arc: f64) -> f64 {
        let n = self.f / (2.0 - self.f);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n2 * n2;

        let g = self.a * (1.0 - n) * (1.0 - n2) * (1.0 + 9.0 * n2 / 4.0 + 225.0 * n4 / 64.0);
        let sigma = arc / g;

        sigma
            + (3.0 * n / 2.0 - 27.0 * n3 / 32.0) * (2.0 * sigma).sin()
            + (21.0 * n2 / 16.0 - 55.0 * n4 / 32.0) * (4.0 * sigma).sin()
            + (151.0 * n3 / 96.0) * (6.0 * sigma).sin()
            + (1097.0 * n4 / 512.0) * (8.0 * sigma).sin()
    }

    /// Convert a global point to planar coordinates.
    pub fn to_planar(&self, point: GlobalPoint) -> PlanarPoint {
        let lat = point.lat.to_radians();
        let mut dlon = point.lon.to_radians() - self.meridian;
        while dlon > PI {
            dlon -= 2.0 * PI;
        }
        while dlon < -PI {
            dlon += 2.0 * PI;
        }

        let sf = self.params.scale_factor;
        let e2 = self.e2;

        let arc = self.meridian_arc(lat);
        let slt = lat.sin();
        let clt = lat.cos();
        let eslt = 1.0 - e2 * slt * slt;
        let eta = self.a / eslt.sqrt();
        let rho = eta * (1.0 - e2) / eslt;
        let psi = eta / rho;

        let wc = clt * dlon;
        let wc2 = wc * wc;

        let t = slt / clt;
        let t2 = t * t;
        let t4 = t2 * t2;
        let t6 = t2 * t4;

        let trm1 = (psi - t2) / 6.0;
        let trm2 = (((4.0 * (1.0 - 6.0 * t2) * psi + (1.0 + 8.0 * t2)) * psi - 2.0 * t2) * psi
            + t4)
            / 120.0;
        let trm3 = (61.0 - 479.0 * t2 + 179.0 * t4 - t6) / 5040.0;

        let easting = (sf * eta * dlon * clt) * (((trm3 * wc2 + trm2) * wc2 + trm1) * wc2 + 1.0);

        let trm1 = 1.0 / 2.0;
        let trm2 = ((4.0 * psi + 1.0) * psi - t2) / 24.0;
        let trm3 = ((((8.0 * (11.0 - 24.0 * t2) * psi - 28.0 * (1.0 - 6.0 * t2)) * psi
            + (1.0 - 32.0 * t2))
            * psi
            - 2.0 * t2)
            * psi
            + t4)
            / 720.0;
        let trm4 = (1385.0 - 3111.0 * t2 + 543.0 * t4 - t6) / 40320.0;

        let northing = (eta * t) * ((((trm4 * wc2 + trm3) * wc2 + trm2) * wc2 + trm1) * wc2);

        PlanarPoint {
            northing: (northing + arc - self.origin_arc) * sf + self.params.false_northing,
            easting: easting + self.params.false_easting,
        }
    }

    /// Convert a planar point to global coordinates.
    pub fn to_global(&self, point: PlanarPoint) -> GlobalPoint {
        let sf = self.params.scale_factor;
        let e2 = self.e2;

        let arc = (point.northing - self.params.false_northing) / sf + self.origin_arc;
        let fphi = self.foot_point_latitude(arc);

        let slt = fphi.sin();
        let clt = fphi.cos();
        let eslt = 1.0 - e2 * slt * slt;
        let eta = self.a / eslt.sqrt();
        let rho = eta * (1.0 - e2) / eslt;
        let psi = eta / rho;

        let e = point.easting - self.params.false_easting;
        let x = e / (eta * sf);
        let x2 = x * x;

        let t = slt / clt;
        let t2 = t * t;
        let t4 = t2 * t2;

        let trm1 = 1.0 / 2.0;
        let trm2 = ((-4.0 * psi + 9.0 * (1.0 - t2)) * psi + 12.0 * t2) / 24.0;
        let trm3 = ((((8.0 * (11.0 - 24.0 * t2) * psi - 12.0 * (21.0 - 71.0 * t2)) * psi
            + 15.0 * ((15.0 * t2 - 98.0) * t2 + 15.0))
            * psi
            + 180.0 * ((-3.0 * t2 + 5.0) * t2))
            * psi
            + 360.0 * t4)
            / 720.0;
        let trm4 = (((1575.0 * t2 + 4095.0) * t2 + 3633.0) * t2 + 1385.0) / 40320.0;

        let lat = fphi + (t * x * e / (sf * rho)) * (((trm4 * x2 - trm3) * x2 + trm2) * x2 - trm1);

        let trm1 = 1.0;
        let trm2 = (psi + 2.0 * t2) / 6.0;
        let trm3 = (((-4.0 * (1.0 - 6.0 * t2) * psi + (9.0 - 68.0 * t2)) * psi + 72.0 * t2) * psi
            + 24.0 * t4)
            / 120.0;
        let trm4 = (((720.0 * t2 + 1320.0) * t2 + 662.0) * t2 + 61.0) / 5040.0;

        let lon = self.meridian - (x / clt) * (((trm4 * x2 - trm3) * x2 + trm2) * x2 - trm1);

        GlobalPoint {
            lat: lat.to_degrees(),
            lon: lon.to_degrees(),
        }
    }

    /// Round-trip a global point through forward and inverse projection.
    pub fn round_trip(&self, point: GlobalPoint) -> GlobalPoint {
        self.to_global(self.to_planar(point))
    }
}
