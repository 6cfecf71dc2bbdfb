//! Tile catalog: which raster files cover which planar area.
//!
//! Scanning a directory means opening every raster's header, which is slow
//! for large tile libraries. The catalog therefore persists the resulting
//! [`TileDescriptor`] list to a side-cache file (`.demgrid-catalog.csv`) in
//! the scanned directory and reuses it on later runs, as long as the number
//! of raster files on disk still matches the count recorded in the cache.
//!
//! # Cache File Format
//!
//! ```text
//! # files=3
//! folder,file_name,is_ground_layer,crs,columns,rows,origin_x,origin_y,cell_size,no_data
//! /data/lidar,DEM_BQ31_2013_1000_0101.tif,true,NZGD2000 / ...,480,720,1576000.0,5256000.0,1.0,-9999.0
//! ```
//!
//! Rebuilding is single-writer: concurrent rebuilds of the same directory
//! must be serialized by the caller.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DemError, Result};
use crate::projection::PlanarPoint;
use crate::raster::RasterHeader;
use crate::region::RegionStrategy;

/// Name of the side-cache file written into each scanned directory.
pub const CACHE_FILE_NAME: &str = ".demgrid-catalog.csv";

/// Prefix of the cache's first line, which records the raster file count.
const FILE_COUNT_PREFIX: &str = "# files=";

/// Where raster row 0 lies relative to the tie point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrigin {
    /// Row 0 is the northernmost row; northing decreases with row index.
    #[default]
    Top,
    /// Row 0 is the southernmost row; northing increases with row index.
    Bottom,
}

/// An axis-aligned rectangle in planar coordinates (inclusive bounds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarRect {
    /// Southern boundary.
    pub min_northing: f64,
    /// Northern boundary.
    pub max_northing: f64,
    /// Western boundary.
    pub min_easting: f64,
    /// Eastern boundary.
    pub max_easting: f64,
}

impl PlanarRect {
    /// Create a rectangle from its bounds.
    pub fn new(min_northing: f64, max_northing: f64, min_easting: f64, max_easting: f64) -> Self {
        Self {
            min_northing,
            max_northing,
            min_easting,
            max_easting,
        }
    }

    /// Smallest rectangle containing all `points`.
    pub fn enclosing(points: &[PlanarPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut rect = Self::new(first.northing, first.northing, first.easting, first.easting);
        for p in &points[1..] {
            rect.min_northing = rect.min_northing.min(p.northing);
            rect.max_northing = rect.max_northing.max(p.northing);
            rect.min_easting = rect.min_easting.min(p.easting);
            rect.max_easting = rect.max_easting.max(p.easting);
        }
        Some(rect)
    }

    /// Grow the rectangle by `margin` metres on every side.
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.min_northing - margin,
            self.max_northing + margin,
            self.min_easting - margin,
            self.max_easting + margin,
        )
    }

    /// Check if a point lies inside (inclusive).
    pub fn contains(&self, point: PlanarPoint) -> bool {
        (self.min_northing..=self.max_northing).contains(&point.northing)
            && (self.min_easting..=self.max_easting).contains(&point.easting)
    }

    /// Check if two rectangles overlap with positive width and height.
    pub fn intersects(&self, other: &PlanarRect) -> bool {
        let width = self.max_easting.min(other.max_easting) - self.min_easting.max(other.min_easting);
        let height =
            self.max_northing.min(other.max_northing) - self.min_northing.max(other.min_northing);
        width > 0.0 && height > 0.0
    }
}

/// Metadata identifying one raster file's footprint and format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    /// Directory containing the file.
    pub folder: PathBuf,
    /// File name within `folder`.
    pub file_name: String,
    /// Ground (DEM) layer if true, surface (DSM) layer otherwise.
    pub is_ground_layer: bool,
    /// Coordinate-system tag.
    pub crs: String,
    /// Pixel column count.
    pub columns: u32,
    /// Pixel row count.
    pub rows: u32,
    /// Planar x of the western edge.
    pub origin_x: f64,
    /// Planar y of the tie-point edge (north edge for [`RowOrigin::Top`]).
    pub origin_y: f64,
    /// Cell size in metres.
    pub cell_size: f64,
    /// No-data sentinel.
    pub no_data: Option<f32>,
}

impl TileDescriptor {
    /// Build a descriptor from a parsed raster header.
    pub fn from_header(folder: &Path, file_name: &str, header: &RasterHeader) -> Self {
        Self {
            folder: folder.to_path_buf(),
            file_name: file_name.to_string(),
            is_ground_layer: is_ground_layer_name(file_name),
            crs: header.crs.clone(),
            columns: header.width,
            rows: header.height,
            origin_x: header.origin_x,
            origin_y: header.origin_y,
            cell_size: header.cell_size,
            no_data: header.no_data,
        }
    }

    /// Full path of the raster file.
    pub fn path(&self) -> PathBuf {
        self.folder.join(&self.file_name)
    }

    /// Check the structural invariants (positive size and cell size).
    pub fn is_valid(&self) -> bool {
        self.columns > 0 && self.rows > 0 && self.cell_size > 0.0 && self.cell_size.is_finite()
    }

    /// Planar footprint of the raster.
    pub fn bounds(&self, row_origin: RowOrigin) -> PlanarRect {
        let width = self.columns as f64 * self.cell_size;
        let height = self.rows as f64 * self.cell_size;
        let (min_northing, max_northing) = match row_origin {
            RowOrigin::Top => (self.origin_y - height, self.origin_y),
            RowOrigin::Bottom => (self.origin_y, self.origin_y + height),
        };
        PlanarRect::new(
            min_northing,
            max_northing,
            self.origin_x,
            self.origin_x + width,
        )
    }
}

/// Classify a raster by file name: surface models carry `DSM` in their name.
pub fn is_ground_layer_name(file_name: &str) -> bool {
    !file_name.to_ascii_uppercase().contains("DSM")
}

/// Check if a path looks like a raster tile (`.tif` / `.tiff`).
pub fn is_raster_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// Descriptors for one or more scanned directories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileCatalogIndex {
    /// Descriptors, sorted by folder then file name.
    pub descriptors: Vec<TileDescriptor>,
}

impl TileCatalogIndex {
    /// Number of catalogued tiles.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Iterate over the descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &TileDescriptor> {
        self.descriptors.iter()
    }

    /// Number of ground-layer tiles.
    pub fn ground_count(&self) -> usize {
        self.descriptors.iter().filter(|d| d.is_ground_layer).count()
    }

    /// Number of surface-layer tiles.
    pub fn surface_count(&self) -> usize {
        self.len() - self.ground_count()
    }
}

/// Options controlling how directories are scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogOptions {
    /// Also scan subdirectories, each with its own cache file.
    pub recursive: bool,
}

/// Build the catalog for `directory`, or load it from its side-cache.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or the cache cannot be
/// written. Unreadable rasters and unreadable caches are not errors: the
/// former are skipped, the latter trigger a rebuild.
pub fn build_or_load(
    directory: &Path,
    region: &dyn RegionStrategy,
    options: CatalogOptions,
) -> Result<TileCatalogIndex> {
    let mut descriptors = Vec::new();
    for dir in directories(directory, options)? {
        descriptors.extend(build_or_load_dir(&dir, region)?);
    }
    Ok(TileCatalogIndex { descriptors })
}

/// Force a full rescan of `directory`, replacing any cache files.
pub fn rebuild(
    directory: &Path,
    region: &dyn RegionStrategy,
    options: CatalogOptions,
) -> Result<TileCatalogIndex> {
    let mut descriptors = Vec::new();
    for dir in directories(directory, options)? {
        descriptors.extend(scan_dir(&dir, region)?);
    }
    Ok(TileCatalogIndex { descriptors })
}

/// Descriptors whose footprint intersects `target` with positive area.
pub fn overlapping<'a>(
    index: &'a TileCatalogIndex,
    target: &PlanarRect,
    crs: &str,
    row_origin: RowOrigin,
) -> Vec<&'a TileDescriptor> {
    index
        .descriptors
        .iter()
        .filter(|d| d.crs == crs)
        .filter(|d| d.bounds(row_origin).intersects(target))
        .collect()
}

/// The directory itself, plus every subdirectory when scanning recursively.
fn directories(root: &Path, options: CatalogOptions) -> Result<Vec<PathBuf>> {
    let mut dirs = vec![root.to_path_buf()];
    if options.recursive {
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut children: Vec<PathBuf> = fs::read_dir(&dir)?
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            children.sort();
            dirs.extend(children.iter().cloned());
            pending.extend(children);
        }
        dirs[1..].sort();
    }
    Ok(dirs)
}

/// Sorted raster file names directly inside `dir`.
fn raster_files(dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_raster_file(p))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    Ok(names)
}

fn build_or_load_dir(dir: &Path, region: &dyn RegionStrategy) -> Result<Vec<TileDescriptor>> {
    let cache_path = dir.join(CACHE_FILE_NAME);
    if cache_path.exists() {
        let on_disk = raster_files(dir)?.len();
        match load_cache(&cache_path, dir, on_disk) {
            Ok(descriptors) => {
                debug!(dir = %dir.display(), tiles = descriptors.len(), "catalog cache hit");
                return Ok(descriptors);
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "discarding catalog cache"),
        }
    }
    scan_dir(dir, region)
}

/// Full scan of one directory (slow path), rewriting its cache.
fn scan_dir(dir: &Path, region: &dyn RegionStrategy) -> Result<Vec<TileDescriptor>> {
    let files = raster_files(dir)?;
    let cache_path = dir.join(CACHE_FILE_NAME);

    let descriptors: Vec<TileDescriptor> = files
        .iter()
        .filter_map(|name| match describe(dir, name) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(file = %dir.join(name).display(), error = %e, "skipping unreadable raster");
                None
            }
        })
        .filter_map(|mut d| {
            if !region.accepts_crs(&d.crs) {
                debug!(file = %d.file_name, crs = %d.crs, "skipping raster in foreign CRS");
                return None;
            }
            // Equivalent spellings (names, EPSG codes) collapse to one tag.
            d.crs = region.catalog_tag().to_string();
            Some(d)
        })
        .collect();

    info!(
        dir = %dir.display(),
        files = files.len(),
        tiles = descriptors.len(),
        "catalog rebuilt"
    );

    if descriptors.is_empty() {
        match fs::remove_file(&cache_path) {
            Ok(()) => debug!(cache = %cache_path.display(), "removed stale catalog cache"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    } else {
        write_cache(&cache_path, files.len(), &descriptors)?;
    }

    Ok(descriptors)
}

/// Parse a single raster's header into a descriptor.
fn describe(dir: &Path, name: &str) -> Result<TileDescriptor> {
    let header = RasterHeader::read(dir.join(name))?;
    let descriptor = TileDescriptor::from_header(dir, name, &header);
    if !descriptor.is_valid() {
        return Err(DemError::corrupt(dir.join(name), "invalid dimensions"));
    }
    Ok(descriptor)
}

fn write_cache(path: &Path, file_count: usize, descriptors: &[TileDescriptor]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{FILE_COUNT_PREFIX}{file_count}")?;

    let mut writer = csv::Writer::from_writer(out);
    for d in descriptors {
        writer.serialize(d)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a cache file, rejecting it when stale.
fn load_cache(path: &Path, dir: &Path, on_disk: usize) -> Result<Vec<TileDescriptor>> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut first = String::new();
    reader.read_line(&mut first)?;
    let cached = first
        .trim()
        .strip_prefix(FILE_COUNT_PREFIX)
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| DemError::Encoding(format!("bad cache header {:?}", first.trim())))?;

    if cached != on_disk {
        return Err(DemError::StaleIndex {
            directory: dir.to_path_buf(),
            cached,
            on_disk,
        });
    }

    let mut csv_reader = csv::Reader::from_reader(reader);
    let descriptors = csv_reader
        .deserialize()
        .collect::<std::result::Result<Vec<TileDescriptor>, _>>()?;

    // A moved directory invalidates the recorded folders.
    if descriptors.iter().any(|d| d.folder != dir) {
        return Err(DemError::StaleIndex {
            directory: dir.to_path_buf(),
            cached,
            on_disk,
        });
    }

    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::fixtures::{write_geotiff, NZTM};
    use crate::region::NewZealand;
    use tempfile::TempDir;

    fn create_tile(dir: &Path, name: &str, origin_x: f64, origin_y: f64, crs: &str) {
        let data = vec![10.0f32; 16];
        write_geotiff(
            &dir.join(name),
            4,
            4,
            origin_x,
            origin_y,
            1.0,
            crs,
            Some(-9999.0),
            &data,
        );
    }

    fn descriptor(name: &str, origin_x: f64, origin_y: f64, size: u32) -> TileDescriptor {
        TileDescriptor {
            folder: PathBuf::from("/data"),
            file_name: name.to_string(),
            is_ground_layer: true,
            crs: NZTM.to_string(),
            columns: size,
            rows: size,
            origin_x,
            origin_y,
            cell_size: 1.0,
            no_data: None,
        }
    }

    #[test]
    fn test_overlap_exactness() {
        // Footprints [0,100], [200,300], [400,500] (easting) x [0,100] (northing)
        let index = TileCatalogIndex {
            descriptors: vec![
                descriptor("a.tif", 0.0, 100.0, 100),
                descriptor("b.tif", 200.0, 100.0, 100),
                descriptor("c.tif", 400.0, 100.0, 100),
            ],
        };
        let query = PlanarRect::new(0.0, 100.0, 150.0, 250.0);

        let hits = overlapping(&index, &query, NZTM, RowOrigin::Top);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_name, "b.tif");
    }

    #[test]
    fn test_overlap_bottom_origin() {
        let index = TileCatalogIndex {
            descriptors: vec![
                descriptor("a.tif", 0.0, 0.0, 100),
                descriptor("b.tif", 200.0, 0.0, 100),
                descriptor("c.tif", 400.0, 0.0, 100),
            ],
        };
        let query = PlanarRect::new(0.0, 100.0, 150.0, 250.0);

        let hits = overlapping(&index, &query, NZTM, RowOrigin::Bottom);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_name, "b.tif");

        // With the wrong orientation the footprints sit below the query
        assert!(overlapping(&index, &query, NZTM, RowOrigin::Top).is_empty());
    }

    #[test]
    fn test_overlap_requires_positive_area() {
        let index = TileCatalogIndex {
            descriptors: vec![descriptor("a.tif", 0.0, 100.0, 100)],
        };
        // Touching edge only
        let query = PlanarRect::new(0.0, 100.0, 100.0, 200.0);
        assert!(overlapping(&index, &query, NZTM, RowOrigin::Top).is_empty());
    }

    #[test]
    fn test_overlap_filters_crs() {
        let index = TileCatalogIndex {
            descriptors: vec![descriptor("a.tif", 0.0, 100.0, 100)],
        };
        let query = PlanarRect::new(0.0, 100.0, 0.0, 100.0);
        assert!(overlapping(&index, &query, "EPSG:32760", RowOrigin::Top).is_empty());
    }

    #[test]
    fn test_layer_classification() {
        assert!(is_ground_layer_name("DEM_BQ31_2013_1000_0101.tif"));
        assert!(!is_ground_layer_name("DSM_BQ31_2013_1000_0101.tif"));
        assert!(!is_ground_layer_name("wellington_dsm_1m.tif"));
        assert!(is_ground_layer_name("unlabelled.tif"));
    }

    #[test]
    fn test_is_raster_file() {
        assert!(is_raster_file(Path::new("a.tif")));
        assert!(is_raster_file(Path::new("a.TIFF")));
        assert!(!is_raster_file(Path::new("a.asc")));
        assert!(!is_raster_file(Path::new(CACHE_FILE_NAME)));
    }

    #[test]
    fn test_build_writes_cache_and_skips_bad_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let nz = NewZealand::new().unwrap();

        create_tile(dir, "DEM_a.tif", 1000.0, 5004.0, NZTM);
        create_tile(dir, "DSM_a.tif", 1000.0, 5004.0, NZTM);
        create_tile(dir, "DEM_utm.tif", 1000.0, 5004.0, "WGS 84 / UTM zone 60S");
        fs::write(dir.join("DEM_broken.tif"), b"not a tiff").unwrap();
        fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let index = build_or_load(dir, &nz, CatalogOptions::default()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.ground_count(), 1);
        assert_eq!(index.surface_count(), 1);
        assert_eq!(index.descriptors[0].file_name, "DEM_a.tif");
        assert_eq!(index.descriptors[0].columns, 4);
        assert_eq!(index.descriptors[0].no_data, Some(-9999.0));

        let cache = fs::read_to_string(dir.join(CACHE_FILE_NAME)).unwrap();
        assert!(cache.starts_with("# files=4"));
    }

    #[test]
    fn test_load_uses_cache() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let nz = NewZealand::new().unwrap();
        create_tile(dir, "DEM_a.tif", 1000.0, 5004.0, NZTM);

        let first = build_or_load(dir, &nz, CatalogOptions::default()).unwrap();

        // Tamper with the cache: a reload must read it rather than rescan.
        let cache_path = dir.join(CACHE_FILE_NAME);
        let cache = fs::read_to_string(&cache_path).unwrap();
        fs::write(&cache_path, cache.replace(",4,4,", ",8,4,")).unwrap();

        let second = build_or_load(dir, &nz, CatalogOptions::default()).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.descriptors[0].columns, 8);
    }

    #[test]
    fn test_file_count_change_triggers_rebuild() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let nz = NewZealand::new().unwrap();
        create_tile(dir, "DEM_a.tif", 1000.0, 5004.0, NZTM);

        let first = build_or_load(dir, &nz, CatalogOptions::default()).unwrap();
        assert_eq!(first.len(), 1);

        create_tile(dir, "DEM_b.tif", 1004.0, 5004.0, NZTM);
        let second = build_or_load(dir, &nz, CatalogOptions::default()).unwrap();
        assert_eq!(second.len(), 2);

        let cache = fs::read_to_string(dir.join(CACHE_FILE_NAME)).unwrap();
        assert!(cache.starts_with("# files=2"));
    }

    #[test]
    fn test_corrupt_cache_triggers_rebuild() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let nz = NewZealand::new().unwrap();
        create_tile(dir, "DEM_a.tif", 1000.0, 5004.0, NZTM);
        fs::write(dir.join(CACHE_FILE_NAME), "garbage").unwrap();

        let index = build_or_load(dir, &nz, CatalogOptions::default()).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_empty_directory_removes_stale_cache() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let nz = NewZealand::new().unwrap();
        create_tile(dir, "DEM_a.tif", 1000.0, 5004.0, NZTM);
        build_or_load(dir, &nz, CatalogOptions::default()).unwrap();
        assert!(dir.join(CACHE_FILE_NAME).exists());

        fs::remove_file(dir.join("DEM_a.tif")).unwrap();
        let index = build_or_load(dir, &nz, CatalogOptions::default()).unwrap();
        assert!(index.is_empty());
        assert!(!dir.join(CACHE_FILE_NAME).exists());
    }

    #[test]
    fn test_recursive_scan() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let nz = NewZealand::new().unwrap();
        fs::create_dir_all(dir.join("2013/north")).unwrap();
        create_tile(dir, "DEM_root.tif", 1000.0, 5004.0, NZTM);
        create_tile(&dir.join("2013"), "DEM_mid.tif", 1004.0, 5004.0, NZTM);
        create_tile(&dir.join("2013/north"), "DSM_deep.tif", 1008.0, 5004.0, NZTM);

        let flat = build_or_load(dir, &nz, CatalogOptions::default()).unwrap();
        assert_eq!(flat.len(), 1);

        let deep = build_or_load(dir, &nz, CatalogOptions { recursive: true }).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(dir.join("2013/north").join(CACHE_FILE_NAME).exists());
    }

    #[test]
    fn test_descriptor_bounds() {
        let d = descriptor("a.tif", 1000.0, 5000.0, 10);
        let top = d.bounds(RowOrigin::Top);
        assert_eq!(top, PlanarRect::new(4990.0, 5000.0, 1000.0, 1010.0));
        let bottom = d.bounds(RowOrigin::Bottom);
        assert_eq!(bottom, PlanarRect::new(5000.0, 5010.0, 1000.0, 1010.0));
    }
}
