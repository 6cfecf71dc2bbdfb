//! Elevation service: cached catalogs and area loading.
//!
//! [`ElevationService`] ties the pieces together. It keeps the tile catalog
//! of each data directory in an in-memory cache, and turns a geographic
//! bounding box into an [`AreaElevation`]: ground and surface grids
//! populated from every overlapping raster, plus an optional swathe layer.
//!
//! ```ignore
//! use demgrid::{BoundingBox, ElevationServiceBuilder, GlobalPoint, Layer};
//!
//! let service = ElevationServiceBuilder::new("/data/lidar")
//!     .cache_size(8)
//!     .build()?;
//!
//! let area = service.load_area(&BoundingBox::new(-41.29, 174.77, -41.28, 174.78), true)?;
//! let ground = area.elevation_at(GlobalPoint::new(-41.285, 174.775), Layer::Ground)?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use moka::sync::Cache;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::catalog::{self, CatalogOptions, PlanarRect, TileCatalogIndex, TileDescriptor};
use crate::encoding::{self, EncodedGrid};
use crate::error::{DemError, Result};
use crate::grid::{ElevationGrid, GridExtent, DEFAULT_BUFFER_MARGIN};
use crate::projection::{GlobalPoint, PlanarPoint};
use crate::raster::RasterTile;
use crate::region::{RegionStrategy, RegionTag};
use crate::swathe::SwatheGrid;

/// Statistics about catalog cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of catalogs currently in the cache.
    pub entry_count: u64,
    /// Number of cache hits (catalogs served from memory).
    pub hit_count: u64,
    /// Number of cache misses (catalogs built or loaded from disk).
    pub miss_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// A geographic bounding box.
///
/// Coordinates are in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum latitude (southern boundary).
    pub min_lat: f64,
    /// Minimum longitude (western boundary).
    pub min_lon: f64,
    /// Maximum latitude (northern boundary).
    pub max_lat: f64,
    /// Maximum longitude (eastern boundary).
    pub max_lon: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    ///
    /// # Arguments
    ///
    /// * `min_lat` - Southern boundary latitude
    /// * `min_lon` - Western boundary longitude
    /// * `max_lat` - Northern boundary latitude
    /// * `max_lon` - Eastern boundary longitude
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// The four corners, counter-clockwise from the south-west.
    pub fn corners(&self) -> [GlobalPoint; 4] {
        [
            GlobalPoint::new(self.min_lat, self.min_lon),
            GlobalPoint::new(self.min_lat, self.max_lon),
            GlobalPoint::new(self.max_lat, self.max_lon),
            GlobalPoint::new(self.max_lat, self.min_lon),
        ]
    }

    fn validate(&self) -> Result<()> {
        let finite = [self.min_lat, self.min_lon, self.max_lat, self.max_lon]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.min_lat >= self.max_lat || self.min_lon >= self.max_lon {
            return Err(DemError::InvalidBounds(format!(
                "bounding box ({}, {}) .. ({}, {}) is not ordered",
                self.min_lat, self.min_lon, self.max_lat, self.max_lon
            )));
        }
        Ok(())
    }
}

/// The layers an area can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Bare-ground elevation (DEM).
    Ground,
    /// Surface elevation including vegetation and structures (DSM).
    Surface,
    /// Cells observed by a sensor.
    Swathe,
}

impl Layer {
    /// All layers, in persistence order.
    pub const ALL: [Layer; 3] = [Layer::Ground, Layer::Surface, Layer::Swathe];

    /// File name of the layer's persisted table.
    pub fn file_name(self) -> &'static str {
        match self {
            Layer::Ground => "ground.csv",
            Layer::Surface => "surface.csv",
            Layer::Swathe => "swathe.csv",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Layer::Ground => "ground",
            Layer::Surface => "surface",
            Layer::Swathe => "swathe",
        };
        f.write_str(s)
    }
}

impl FromStr for Layer {
    type Err = DemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ground" | "dem" => Ok(Layer::Ground),
            "surface" | "dsm" => Ok(Layer::Surface),
            "swathe" | "swath" => Ok(Layer::Swathe),
            other => Err(DemError::UnknownLayer(other.to_string())),
        }
    }
}

/// Elevation layers loaded for one area.
///
/// A layer is absent when no raster in the catalog covered the area (or,
/// for the swathe, when nothing was ever marked).
#[derive(Debug, Clone)]
pub struct AreaElevation {
    region: Arc<dyn RegionStrategy>,
    ground: Option<ElevationGrid>,
    surface: Option<ElevationGrid>,
    swathe: Option<SwatheGrid>,
}

impl AreaElevation {
    /// Assemble an area from already-built layers.
    pub fn new(
        region: Arc<dyn RegionStrategy>,
        ground: Option<ElevationGrid>,
        surface: Option<ElevationGrid>,
    ) -> Self {
        Self {
            region,
            ground,
            surface,
            swathe: None,
        }
    }

    /// The region the area's planar coordinates belong to.
    pub fn region(&self) -> &dyn RegionStrategy {
        self.region.as_ref()
    }

    /// Whether the area holds `layer`.
    pub fn has_layer(&self, layer: Layer) -> bool {
        match layer {
            Layer::Ground => self.ground.is_some(),
            Layer::Surface => self.surface.is_some(),
            Layer::Swathe => self.swathe.is_some(),
        }
    }

    /// The ground grid, if present.
    pub fn ground(&self) -> Option<&ElevationGrid> {
        self.ground.as_ref()
    }

    /// The surface grid, if present.
    pub fn surface(&self) -> Option<&ElevationGrid> {
        self.surface.as_ref()
    }

    /// The swathe grid, if present.
    pub fn swathe(&self) -> Option<&SwatheGrid> {
        self.swathe.as_ref()
    }

    /// Value of `layer` at a global point.
    ///
    /// Elevation layers return metres; the swathe layer returns 1.0 for
    /// seen cells and 0.0 otherwise. Missing layers, cells outside the
    /// grid and unknown cells are NaN.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::UnsupportedLocation`] if the point lies outside
    /// the region's envelope.
    pub fn elevation_at(&self, point: GlobalPoint, layer: Layer) -> Result<f32> {
        let planar = self.region.project(point)?;
        let value = match layer {
            Layer::Ground => self.ground.as_ref().and_then(|g| g.query_by_planar(planar)),
            Layer::Surface => self
                .surface
                .as_ref()
                .and_then(|g| g.query_by_planar(planar)),
            Layer::Swathe => self.swathe.as_ref().and_then(|s| {
                s.extent()
                    .locate(planar)
                    .map(|_| if s.is_seen_at(planar) { 1.0 } else { 0.0 })
            }),
        };
        Ok(value.unwrap_or(f32::NAN))
    }

    /// Mark a sensor footprint, given by its four global corners, as seen.
    ///
    /// The swathe layer is created on first use, covering the same extent as
    /// the ground (or surface) grid. Returns the number of newly seen cells.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::UnsupportedLocation`] if a corner lies outside the
    /// region, or [`DemError::InvalidBounds`] if the area has no elevation
    /// layer to take the extent from.
    pub fn mark_seen(&mut self, footprint: [GlobalPoint; 4]) -> Result<usize> {
        let mut corners = [PlanarPoint::new(0.0, 0.0); 4];
        for (planar, global) in corners.iter_mut().zip(footprint) {
            *planar = self.region.project(global)?;
        }

        if self.swathe.is_none() {
            let extent = self.base_extent().ok_or_else(|| {
                DemError::InvalidBounds("area has no elevation layer for a swathe".to_string())
            })?;
            self.swathe = Some(SwatheGrid::from_extent(extent));
        }
        match self.swathe.as_mut() {
            Some(swathe) => swathe.mark_seen(corners),
            None => Ok(0),
        }
    }

    fn base_extent(&self) -> Option<GridExtent> {
        self.ground
            .as_ref()
            .or(self.surface.as_ref())
            .map(|g| *g.extent())
    }

    /// Fill gaps in both elevation layers, returning the cells filled.
    pub fn fill_gaps(&mut self) -> usize {
        self.ground.as_mut().map_or(0, ElevationGrid::fill_gaps)
            + self.surface.as_mut().map_or(0, ElevationGrid::fill_gaps)
    }

    /// Write one table per present layer into `dir`.
    ///
    /// Returns the paths written. Tables of absent layers are removed so a
    /// later [`AreaElevation::load`] sees the same set of layers.
    pub fn save(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for layer in Layer::ALL {
            let path = dir.join(layer.file_name());
            let encoded = match layer {
                Layer::Ground => self.ground.as_ref().map(encoding::encode),
                Layer::Surface => self.surface.as_ref().map(encoding::encode),
                Layer::Swathe => self.swathe.as_ref().map(encoding::encode_swathe),
            };
            match encoded {
                Some(encoded) => {
                    encoded.save(&path)?;
                    written.push(path);
                }
                None => match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }
        info!(dir = %dir.display(), layers = written.len(), "saved area");
        Ok(written)
    }

    /// Restore an area written by [`AreaElevation::save`].
    ///
    /// Missing tables yield absent layers.
    pub fn load(dir: &Path, region: Arc<dyn RegionStrategy>) -> Result<Self> {
        let read = |layer: Layer| -> Result<Option<EncodedGrid>> {
            let path = dir.join(layer.file_name());
            if path.is_file() {
                EncodedGrid::load(&path).map(Some)
            } else {
                Ok(None)
            }
        };

        let ground = read(Layer::Ground)?
            .map(|e| encoding::decode(&e))
            .transpose()?;
        let surface = read(Layer::Surface)?
            .map(|e| encoding::decode(&e))
            .transpose()?;
        let swathe = read(Layer::Swathe)?
            .map(|e| encoding::decode_swathe(&e))
            .transpose()?;

        Ok(Self {
            region,
            ground,
            surface,
            swathe,
        })
    }
}

/// High-level elevation service with catalog caching.
///
/// `ElevationService` owns the region strategy and an in-memory cache of
/// tile catalogs keyed by directory, so repeated area loads never rescan
/// the tile library.
pub struct ElevationService {
    /// Root directory of raster tiles.
    data_dir: PathBuf,
    /// Projection, catalog tag and elevation limits.
    region: Arc<dyn RegionStrategy>,
    /// Catalog scanning options.
    options: CatalogOptions,
    /// Margin added around requested areas, in metres.
    buffer_margin: f64,
    /// Decode rasters on the rayon pool.
    parallel: bool,
    /// Cache of loaded catalogs, keyed by directory.
    catalog_cache: Cache<PathBuf, Arc<TileCatalogIndex>>,
    /// Number of cache hits.
    hit_count: AtomicU64,
    /// Number of cache misses.
    miss_count: AtomicU64,
}

impl fmt::Debug for ElevationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevationService")
            .field("data_dir", &self.data_dir)
            .field("region", &self.region.name())
            .field("options", &self.options)
            .field("buffer_margin", &self.buffer_margin)
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl ElevationService {
    /// Create a New Zealand service with default settings.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory containing raster tiles
    /// * `cache_size` - Maximum number of catalogs to keep in memory
    pub fn new<P: AsRef<Path>>(data_dir: P, cache_size: u64) -> Result<Self> {
        ElevationServiceBuilder::new(data_dir)
            .cache_size(cache_size)
            .build()
    }

    /// Create a builder for more configuration options.
    pub fn builder<P: AsRef<Path>>(data_dir: P) -> ElevationServiceBuilder {
        ElevationServiceBuilder::new(data_dir)
    }

    /// The configured region.
    pub fn region(&self) -> Arc<dyn RegionStrategy> {
        Arc::clone(&self.region)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the buffer margin in metres.
    pub fn buffer_margin(&self) -> f64 {
        self.buffer_margin
    }

    /// Catalog of the data directory.
    pub fn catalog(&self) -> Result<Arc<TileCatalogIndex>> {
        self.catalog_for(&self.data_dir)
    }

    /// Catalog of an arbitrary directory, from cache or disk.
    ///
    /// Concurrent callers asking for the same uncached directory share a
    /// single build.
    pub fn catalog_for(&self, directory: &Path) -> Result<Arc<TileCatalogIndex>> {
        let key = directory.to_path_buf();
        if let Some(index) = self.catalog_cache.get(&key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(index);
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        self.catalog_cache
            .try_get_with(key, || {
                catalog::build_or_load(directory, self.region.as_ref(), self.options).map(Arc::new)
            })
            .map_err(|e| Arc::try_unwrap(e).unwrap_or_else(DemError::CatalogLoad))
    }

    /// Rescan `directory`, replacing its cache file and memory entry.
    ///
    /// When scanning recursively, cached indexes of enclosing directories
    /// include this one and are dropped too.
    pub fn rebuild_index(&self, directory: &Path) -> Result<Arc<TileCatalogIndex>> {
        let key = directory.to_path_buf();
        self.catalog_cache.invalidate(&key);
        if self.options.recursive {
            for ancestor in directory.ancestors().skip(1) {
                self.catalog_cache.invalidate(ancestor);
            }
        }
        let index = Arc::new(catalog::rebuild(
            directory,
            self.region.as_ref(),
            self.options,
        )?);
        self.catalog_cache.insert(key, Arc::clone(&index));
        Ok(index)
    }

    /// Load ground and surface elevations for a bounding box.
    ///
    /// Rasters overlapping the (buffered) area are decoded, in parallel when
    /// enabled, and merged in catalog order so the first tile to cover a
    /// cell wins. Unreadable rasters are logged and skipped. With
    /// `fill_gaps`, cells no raster covered take the layer's minimum.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::InvalidBounds`] for an unordered box,
    /// [`DemError::UnsupportedLocation`] if a corner lies outside the region,
    /// or [`DemError::IndexOverflow`] if the area is too large to grid.
    pub fn load_area(&self, bbox: &BoundingBox, fill_gaps: bool) -> Result<AreaElevation> {
        let start = Instant::now();
        bbox.validate()?;

        let mut corners = Vec::with_capacity(4);
        for corner in bbox.corners() {
            corners.push(self.region.project(corner)?);
        }
        let Some(rect) = PlanarRect::enclosing(&corners) else {
            return Err(DemError::InvalidBounds("empty bounding box".to_string()));
        };
        let extent = GridExtent::new(
            PlanarPoint::new(rect.min_northing, rect.min_easting),
            PlanarPoint::new(rect.max_northing, rect.max_easting),
            self.buffer_margin,
        )?;

        let catalog = self.catalog()?;
        let candidates = catalog::overlapping(
            &catalog,
            &extent.rect(),
            self.region.catalog_tag(),
            self.region.row_origin(),
        );

        let mut area = AreaElevation::new(
            Arc::clone(&self.region),
            self.load_layer(Layer::Ground, &candidates, extent)?,
            self.load_layer(Layer::Surface, &candidates, extent)?,
        );
        if fill_gaps {
            area.fill_gaps();
        }

        info!(
            rows = extent.rows(),
            cols = extent.cols(),
            ground = area.ground().map(ElevationGrid::count),
            surface = area.surface().map(ElevationGrid::count),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "area loaded"
        );
        Ok(area)
    }

    fn load_layer(
        &self,
        layer: Layer,
        candidates: &[&TileDescriptor],
        extent: GridExtent,
    ) -> Result<Option<ElevationGrid>> {
        let want_ground = layer == Layer::Ground;
        let files: Vec<&TileDescriptor> = candidates
            .iter()
            .copied()
            .filter(|d| d.is_ground_layer == want_ground)
            .collect();
        if files.is_empty() {
            debug!(%layer, "no rasters cover the area");
            return Ok(None);
        }

        let (_, max_elevation) = self.region.plausible_elevation_bounds();
        let mut grid = ElevationGrid::from_extent(extent)
            .with_plausible_max(max_elevation)
            .with_source(format!("{} {}", self.region.name(), layer))
            .with_vertical_accuracy(self.region.vertical_accuracy());

        let window = extent.rect();
        let row_origin = self.region.row_origin();
        let decoded: Vec<Option<Vec<(PlanarPoint, f32)>>> = if self.parallel {
            files
                .par_iter()
                .map(|d| decode_samples(d, &window, row_origin))
                .collect()
        } else {
            files
                .iter()
                .map(|d| decode_samples(d, &window, row_origin))
                .collect()
        };

        // Catalog order decides which tile wins a contested cell.
        for samples in decoded.into_iter().flatten() {
            grid.absorb(samples)?;
        }
        debug!(%layer, files = files.len(), cells = grid.count(), "layer merged");
        Ok(Some(grid))
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.catalog_cache.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }

    /// Get the maximum cache size.
    pub fn cache_capacity(&self) -> u64 {
        self.catalog_cache.policy().max_capacity().unwrap_or(0)
    }

    /// Clear all catalogs from the cache.
    pub fn clear_cache(&self) {
        self.catalog_cache.invalidate_all();
    }
}

/// Decode one raster's samples inside `window`; failures are logged.
fn decode_samples(
    descriptor: &TileDescriptor,
    window: &PlanarRect,
    row_origin: catalog::RowOrigin,
) -> Option<Vec<(PlanarPoint, f32)>> {
    let decode = || -> Result<Vec<(PlanarPoint, f32)>> {
        let tile = RasterTile::open(descriptor, row_origin)?;
        let samples: Vec<_> = tile.extract(window)?.collect();
        Ok(samples)
    };
    match decode() {
        Ok(samples) => {
            debug!(file = %descriptor.file_name, samples = samples.len(), "raster decoded");
            Some(samples)
        }
        Err(e) => {
            warn!(file = %descriptor.path().display(), error = %e, "skipping raster");
            None
        }
    }
}

/// Builder for creating [`ElevationService`] with custom configuration.
///
/// # Example
///
/// ```ignore
/// use demgrid::ElevationServiceBuilder;
///
/// let service = ElevationServiceBuilder::new("/data/lidar")
///     .cache_size(8)
///     .recursive(true)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct ElevationServiceBuilder {
    data_dir: PathBuf,
    cache_size: u64,
    region: RegionTag,
    recursive: bool,
    buffer_margin: f64,
    parallel: bool,
}

impl ElevationServiceBuilder {
    /// Default number of catalogs kept in memory.
    pub const DEFAULT_CACHE_SIZE: u64 = 16;

    /// Create a new builder with the specified data directory.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            cache_size: Self::DEFAULT_CACHE_SIZE,
            region: RegionTag::NewZealand,
            recursive: false,
            buffer_margin: DEFAULT_BUFFER_MARGIN,
            parallel: true,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `DEMGRID_DATA_DIR` | Directory containing raster tiles | Required |
    /// | `DEMGRID_CACHE_SIZE` | Maximum catalogs in cache | 16 |
    /// | `DEMGRID_REGION` | Region tag | `nz` |
    /// | `DEMGRID_RECURSIVE` | Scan subdirectories (`true`/`1`) | false |
    /// | `DEMGRID_BUFFER_MARGIN` | Grid buffer margin in metres | 50 |
    ///
    /// # Errors
    ///
    /// Returns an error if `DEMGRID_DATA_DIR` is not set or
    /// `DEMGRID_REGION` is not a known region.
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("DEMGRID_DATA_DIR").map_err(|_| {
            DemError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "DEMGRID_DATA_DIR environment variable not set",
            ))
        })?;

        let mut builder = Self::new(data_dir);
        if let Some(size) = env_parse::<u64>("DEMGRID_CACHE_SIZE") {
            builder.cache_size = size;
        }
        if let Ok(region) = std::env::var("DEMGRID_REGION") {
            builder.region = region.parse()?;
        }
        if let Ok(recursive) = std::env::var("DEMGRID_RECURSIVE") {
            builder.recursive = recursive.eq_ignore_ascii_case("true") || recursive == "1";
        }
        if let Some(margin) = env_parse::<f64>("DEMGRID_BUFFER_MARGIN") {
            builder.buffer_margin = margin;
        }
        Ok(builder)
    }

    /// Set the data directory.
    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set the maximum number of catalogs to keep in cache.
    pub fn cache_size(mut self, size: u64) -> Self {
        self.cache_size = size;
        self
    }

    /// Set the region.
    pub fn region(mut self, region: RegionTag) -> Self {
        self.region = region;
        self
    }

    /// Scan subdirectories too.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set the margin added around requested areas, in metres.
    pub fn buffer_margin(mut self, margin: f64) -> Self {
        self.buffer_margin = margin;
        self
    }

    /// Decode rasters in parallel (default) or on the calling thread.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Build the [`ElevationService`].
    ///
    /// # Errors
    ///
    /// Returns [`DemError::UnsupportedRegion`] for regions without a
    /// projection, [`DemError::ProjectionSelfTest`] if the region's
    /// constants fail their check, or [`DemError::InvalidBounds`] for a
    /// negative buffer margin.
    pub fn build(self) -> Result<ElevationService> {
        if !(self.buffer_margin >= 0.0 && self.buffer_margin.is_finite()) {
            return Err(DemError::InvalidBounds(format!(
                "bad buffer margin {}",
                self.buffer_margin
            )));
        }
        let region = self.region.strategy()?;
        info!(
            data_dir = %self.data_dir.display(),
            region = region.name(),
            cache_size = self.cache_size,
            recursive = self.recursive,
            "elevation service ready"
        );
        Ok(ElevationService {
            data_dir: self.data_dir,
            region,
            options: CatalogOptions {
                recursive: self.recursive,
            },
            buffer_margin: self.buffer_margin,
            parallel: self.parallel,
            catalog_cache: Cache::builder().max_capacity(self.cache_size).build(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
