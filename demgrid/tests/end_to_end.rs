//! Whole-pipeline tests: GeoTIFF tiles on disk through catalog, decoding,
//! grid merging and table persistence.

use std::fs::File;
use std::path::Path;

use demgrid::catalog::CACHE_FILE_NAME;
use demgrid::raster::GEOKEY_PROJECTED_CS_TYPE;
use demgrid::{
    AreaElevation, BoundingBox, ElevationService, GlobalPoint, Layer, NewZealand, PlanarPoint,
    RasterHeader, RegionStrategy,
};
use tempfile::TempDir;
use tiff::encoder::{colortype::Gray32Float, TiffEncoder};
use tiff::tags::Tag;

/// Cathedral Square, Christchurch.
const CENTRE: GlobalPoint = GlobalPoint {
    lat: -43.5310,
    lon: 172.6366,
};

enum Crs<'a> {
    Name(&'a str),
    Epsg(u16),
}

/// Write a 1 m resolution GeoTIFF whose north-west corner is `(north, west)`.
fn write_tile(
    path: &Path,
    width: u32,
    height: u32,
    west: f64,
    north: f64,
    crs: Crs,
    value: impl Fn(u32, u32) -> f32,
) {
    let mut data = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        for col in 0..width {
            data.push(value(row, col));
        }
    }

    let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
    let mut image = encoder.new_image::<Gray32Float>(width, height).unwrap();
    let dir = image.encoder();
    dir.write_tag(Tag::ModelPixelScaleTag, &[1.0f64, 1.0, 0.0][..]).unwrap();
    dir.write_tag(Tag::ModelTiepointTag, &[0.0f64, 0.0, 0.0, west, north, 0.0][..])
        .unwrap();
    match crs {
        Crs::Name(name) => {
            let ascii = format!("{name}|");
            dir.write_tag(Tag::GeoAsciiParamsTag, ascii.as_str()).unwrap();
        }
        Crs::Epsg(code) => {
            let keys: [u16; 8] = [1, 1, 0, 1, GEOKEY_PROJECTED_CS_TYPE, 0, 1, code];
            dir.write_tag(Tag::GeoKeyDirectoryTag, &keys[..]).unwrap();
        }
    }
    dir.write_tag(Tag::GdalNodata, "-9999").unwrap();
    image.write_data(&data).unwrap();
}

struct Site {
    region: NewZealand,
    west: f64,
    north: f64,
    centre_e: f64,
}

impl Site {
    fn new() -> Self {
        let region = NewZealand::new().unwrap();
        let centre = region.project(CENTRE).unwrap();
        Self {
            region,
            west: centre.easting.floor() - 150.0,
            north: centre.northing.floor() + 150.0,
            centre_e: centre.easting.floor(),
        }
    }

    fn global(&self, northing_offset: f64, easting_offset: f64) -> GlobalPoint {
        let centre = self.region.project(CENTRE).unwrap();
        self.region
            .unproject(PlanarPoint::new(
                centre.northing + northing_offset,
                centre.easting + easting_offset,
            ))
            .unwrap()
    }

    /// Ground tiles split at the centre meridian line, a surface tile over
    /// both, plus one foreign and one broken file.
    fn populate(&self, dir: &Path) {
        write_tile(
            &dir.join("DEM_west.tif"),
            150,
            300,
            self.west,
            self.north,
            Crs::Name("NZGD2000 / New Zealand Transverse Mercator 2000"),
            |_, _| 30.0,
        );
        write_tile(
            &dir.join("DEM_east.tif"),
            150,
            300,
            self.centre_e,
            self.north,
            Crs::Name("NZGD2000 / New Zealand Transverse Mercator 2000"),
            |row, _| if row % 2 == 0 { 40.0 } else { -9999.0 },
        );
        write_tile(
            &dir.join("DSM_all.tif"),
            300,
            300,
            self.west,
            self.north,
            Crs::Epsg(2193),
            |_, _| 45.5,
        );
        write_tile(
            &dir.join("DEM_utm.tif"),
            300,
            300,
            self.west,
            self.north,
            Crs::Name("WGS 84 / UTM zone 59S"),
            |_, _| 999.0,
        );
        std::fs::write(dir.join("DEM_broken.tif"), b"not a tiff").unwrap();
    }
}

fn area_box() -> BoundingBox {
    BoundingBox::new(
        CENTRE.lat - 0.0003,
        CENTRE.lon - 0.0003,
        CENTRE.lat + 0.0003,
        CENTRE.lon + 0.0003,
    )
}

#[test]
fn test_header_from_epsg_tile() {
    let temp = TempDir::new().unwrap();
    let site = Site::new();
    site.populate(temp.path());

    let header = RasterHeader::read(temp.path().join("DSM_all.tif")).unwrap();
    assert_eq!(header.width, 300);
    assert_eq!(header.height, 300);
    assert_eq!(header.crs, "EPSG:2193");
    assert_eq!(header.origin_x, site.west);
    assert_eq!(header.origin_y, site.north);
    assert_eq!(header.no_data, Some(-9999.0));
}

#[test]
fn test_catalog_filters_and_caches() {
    let temp = TempDir::new().unwrap();
    Site::new().populate(temp.path());

    let service = ElevationService::new(temp.path(), 4).unwrap();
    let catalog = service.catalog().unwrap();
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.ground_count(), 2);
    assert_eq!(catalog.surface_count(), 1);
    assert!(catalog
        .iter()
        .all(|d| d.crs == service.region().catalog_tag()));
    assert!(temp.path().join(CACHE_FILE_NAME).exists());

    // A fresh service reads the side-cache instead of rescanning
    let again = ElevationService::new(temp.path(), 4).unwrap();
    assert_eq!(*again.catalog().unwrap(), *catalog);
}

#[test]
fn test_area_pipeline() {
    let temp = TempDir::new().unwrap();
    let site = Site::new();
    site.populate(temp.path());

    let service = ElevationService::new(temp.path(), 4).unwrap();
    let area = service.load_area(&area_box(), false).unwrap();

    let west_point = site.global(0.0, -20.0);
    let east_point = site.global(10.0, 20.0);

    assert_eq!(area.elevation_at(west_point, Layer::Ground).unwrap(), 30.0);
    assert_eq!(area.elevation_at(west_point, Layer::Surface).unwrap(), 45.5);
    assert_eq!(area.elevation_at(east_point, Layer::Surface).unwrap(), 45.5);

    // Every other row of the east tile is no-data
    let ground = area.ground().unwrap();
    assert!(ground.has_gaps());
    assert_eq!(ground.min_elevation(), Some(30.0));
    assert_eq!(ground.max_elevation(), Some(40.0));

    let mut filled = service.load_area(&area_box(), true).unwrap();
    assert!(!filled.ground().unwrap().has_gaps());
    for step in 0..4 {
        let p = site.global(step as f64, 20.0);
        let v = filled.elevation_at(p, Layer::Ground).unwrap();
        assert!(v == 40.0 || v == 30.0, "unexpected {v}");
    }

    // Record a swathe and persist everything
    let footprint = [
        site.global(-10.0, -10.0),
        site.global(-10.0, 10.0),
        site.global(10.0, 10.0),
        site.global(10.0, -10.0),
    ];
    let seen = filled.mark_seen(footprint).unwrap();
    assert!((380..=420).contains(&seen), "seen {seen}");

    let out = temp.path().join("export");
    assert_eq!(filled.save(&out).unwrap().len(), 3);

    let restored = AreaElevation::load(&out, service.region()).unwrap();
    for layer in [Layer::Ground, Layer::Surface, Layer::Swathe] {
        assert!(restored.has_layer(layer));
        for p in [west_point, east_point, site.global(0.0, 0.0)] {
            let before = filled.elevation_at(p, layer).unwrap();
            let after = restored.elevation_at(p, layer).unwrap();
            assert!((before - after).abs() <= 0.125, "{layer}: {before} vs {after}");
        }
    }
    assert_eq!(restored.swathe().unwrap().seen_count(), seen);
}

#[test]
fn test_negative_elevations_clamp_on_save() {
    let temp = TempDir::new().unwrap();
    let site = Site::new();
    write_tile(
        &temp.path().join("DEM_coast.tif"),
        300,
        300,
        site.west,
        site.north,
        Crs::Epsg(2193),
        |_, col| if col < 150 { -2.5 } else { 3.0 },
    );

    let service = ElevationService::new(temp.path(), 4).unwrap();
    let area = service.load_area(&area_box(), false).unwrap();
    let below = site.global(0.0, -20.0);
    let above = site.global(0.0, 20.0);
    assert_eq!(area.elevation_at(below, Layer::Ground).unwrap(), -2.5);

    let out = temp.path().join("export");
    area.save(&out).unwrap();
    let restored = AreaElevation::load(&out, service.region()).unwrap();
    assert_eq!(restored.elevation_at(below, Layer::Ground).unwrap(), 0.0);
    assert_eq!(restored.elevation_at(above, Layer::Ground).unwrap(), 3.0);
    assert!(!restored.has_layer(Layer::Surface));
}

#[test]
fn test_recursive_catalog() {
    let temp = TempDir::new().unwrap();
    let site = Site::new();
    let nested = temp.path().join("2013").join("block_a");
    std::fs::create_dir_all(&nested).unwrap();
    write_tile(
        &nested.join("DEM_nested.tif"),
        300,
        300,
        site.west,
        site.north,
        Crs::Epsg(2193),
        |_, _| 12.0,
    );

    let flat = ElevationService::new(temp.path(), 4).unwrap();
    assert!(flat.catalog().unwrap().is_empty());
    let area = flat.load_area(&area_box(), true).unwrap();
    assert!(!area.has_layer(Layer::Ground));

    let deep = ElevationService::builder(temp.path())
        .recursive(true)
        .build()
        .unwrap();
    assert_eq!(deep.catalog().unwrap().len(), 1);
    assert!(nested.join(CACHE_FILE_NAME).exists());

    let area = deep.load_area(&area_box(), false).unwrap();
    assert_eq!(area.elevation_at(CENTRE, Layer::Ground).unwrap(), 12.0);
}
