//! GeoTIFF raster tile header parsing and windowed sample extraction.
//!
//! Elevation rasters in this domain are small (around 1 MB), so a tile is
//! memory-mapped and the blocks covering a requested window are decoded in
//! full. Pixel samples are then produced lazily, one per pixel whose centre
//! falls inside the window.
//!
//! ## Geo-referencing
//!
//! The affine mapping from pixel `(row, col)` to planar coordinates comes
//! from the `ModelTiepoint` and `ModelPixelScale` tags. With the standard
//! [`RowOrigin::Top`] convention row 0 is the northernmost row and northing
//! decreases as the row index increases.

use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

use crate::catalog::{PlanarRect, RowOrigin, TileDescriptor};
use crate::error::{DemError, Result};
use crate::projection::PlanarPoint;

/// GeoKey holding the EPSG code of a projected coordinate system.
pub const GEOKEY_PROJECTED_CS_TYPE: u16 = 3072;

/// Internal block layout of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Block width in pixels.
    pub block_width: u32,
    /// Block height in pixels.
    pub block_height: u32,
    /// Number of blocks across the image.
    pub blocks_across: u32,
    /// Number of blocks down the image.
    pub blocks_down: u32,
    /// Whether the blocks are TIFF tiles (`false` means strips).
    pub tiled: bool,
}

impl BlockLayout {
    fn new(width: u32, height: u32, block_width: u32, block_height: u32, tiled: bool) -> Self {
        Self {
            block_width,
            block_height,
            blocks_across: width.div_ceil(block_width),
            blocks_down: height.div_ceil(block_height),
            tiled,
        }
    }

    /// Total number of blocks.
    pub fn block_count(&self) -> u32 {
        self.blocks_across * self.blocks_down
    }

    /// Index of the block holding pixel `(row, col)`.
    pub fn block_index(&self, row: u32, col: u32) -> u32 {
        (row / self.block_height) * self.blocks_across + col / self.block_width
    }
}

/// Geo-referencing and layout metadata read from a raster's tags.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterHeader {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Planar x (easting) of the western edge of column 0.
    pub origin_x: f64,
    /// Planar y (northing) of the edge of row 0.
    pub origin_y: f64,
    /// Cell size in metres.
    pub cell_size: f64,
    /// Coordinate-system tag.
    pub crs: String,
    /// No-data sentinel, if declared.
    pub no_data: Option<f32>,
    /// Internal block layout.
    pub layout: BlockLayout,
}

impl RasterHeader {
    /// Read the header of a raster file without decoding pixel data.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::CorruptTile`] if any required tag is missing or
    /// malformed, or if the file cannot be opened.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // SAFETY: the mapping is read-only and dropped before this returns.
        let mmap = unsafe { Mmap::map(&file)? };
        let mut decoder = Decoder::new(Cursor::new(&mmap[..]))
            .map_err(|e| DemError::corrupt(path, e.to_string()))?;
        Self::from_decoder(&mut decoder, path)
    }

    fn from_decoder<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
        path: &Path,
    ) -> Result<Self> {
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| DemError::corrupt(path, format!("no image dimensions: {e}")))?;
        if width == 0 || height == 0 {
            return Err(DemError::corrupt(path, "zero image dimensions"));
        }

        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .map_err(|_| DemError::corrupt(path, "missing ModelTiepoint tag"))?;
        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .map_err(|_| DemError::corrupt(path, "missing ModelPixelScale tag"))?;
        if tiepoint.len() < 6 || scale.len() < 2 {
            return Err(DemError::corrupt(path, "short tie point or pixel scale"));
        }

        let (scale_x, scale_y) = (scale[0], scale[1]);
        if !(scale_x > 0.0 && scale_y > 0.0) {
            return Err(DemError::corrupt(path, "non-positive pixel scale"));
        }
        if (scale_x - scale_y).abs() > 1e-9 * scale_x {
            return Err(DemError::corrupt(
                path,
                format!("non-square pixels {scale_x} x {scale_y}"),
            ));
        }

        // Tie point: [i, j, k, x, y, z], raster (i, j) sits at model (x, y)
        let origin_x = tiepoint[3] - tiepoint[0] * scale_x;
        let origin_y = tiepoint[4] + tiepoint[1] * scale_y;

        let crs = Self::read_crs(decoder)
            .ok_or_else(|| DemError::corrupt(path, "missing coordinate-system tag"))?;

        let no_data = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f32>().ok());

        let layout = Self::read_layout(decoder, width, height, path)?;

        Ok(Self {
            width,
            height,
            origin_x,
            origin_y,
            cell_size: scale_x,
            crs,
            no_data,
            layout,
        })
    }

    /// Coordinate-system name from `GeoAsciiParams`, falling back to the
    /// EPSG code in the GeoKey directory.
    fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<String> {
        if let Ok(ascii) = decoder.get_tag_ascii_string(Tag::GeoAsciiParamsTag) {
            let name = ascii
                .split('|')
                .map(|s| s.trim_matches(char::from(0)).trim())
                .find(|s| !s.is_empty());
            if let Some(name) = name {
                return Some(name.to_string());
            }
        }

        // GeoKeyDirectory: header of 4 shorts, then (key, location, count, value)
        let keys = decoder
            .get_tag_u32_vec(Tag::GeoKeyDirectoryTag)
            .ok()?;
        keys.get(4..)?
            .chunks_exact(4)
            .find(|entry| entry[0] == GEOKEY_PROJECTED_CS_TYPE as u32 && entry[1] == 0)
            .map(|entry| format!("EPSG:{}", entry[3]))
    }

    fn read_layout<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
        width: u32,
        height: u32,
        path: &Path,
    ) -> Result<BlockLayout> {
        let tile_width = decoder.get_tag_u32(Tag::TileWidth).ok();
        let tile_length = decoder.get_tag_u32(Tag::TileLength).ok();

        let (layout, offsets, byte_counts) = match (tile_width, tile_length) {
            (Some(tw), Some(th)) if tw > 0 && th > 0 => (
                BlockLayout::new(width, height, tw, th, true),
                decoder.get_tag_u64_vec(Tag::TileOffsets),
                decoder.get_tag_u64_vec(Tag::TileByteCounts),
            ),
            _ => {
                let rows_per_strip = decoder
                    .get_tag_u32(Tag::RowsPerStrip)
                    .unwrap_or(height)
                    .clamp(1, height);
                (
                    BlockLayout::new(width, height, width, rows_per_strip, false),
                    decoder.get_tag_u64_vec(Tag::StripOffsets),
                    decoder.get_tag_u64_vec(Tag::StripByteCounts),
                )
            }
        };

        let offsets = offsets.map_err(|_| DemError::corrupt(path, "missing block offsets"))?;
        let byte_counts =
            byte_counts.map_err(|_| DemError::corrupt(path, "missing block byte counts"))?;

        let expected = layout.block_count() as usize;
        if offsets.len() < expected || byte_counts.len() < expected {
            return Err(DemError::corrupt(
                path,
                format!(
                    "expected {expected} blocks, found {} offsets and {} byte counts",
                    offsets.len(),
                    byte_counts.len()
                ),
            ));
        }

        Ok(layout)
    }

    /// Planar position of the centre of pixel `(row, col)`.
    pub fn pixel_center(&self, row: u32, col: u32, row_origin: RowOrigin) -> PlanarPoint {
        let easting = self.origin_x + (col as f64 + 0.5) * self.cell_size;
        let offset = (row as f64 + 0.5) * self.cell_size;
        let northing = match row_origin {
            RowOrigin::Top => self.origin_y - offset,
            RowOrigin::Bottom => self.origin_y + offset,
        };
        PlanarPoint { northing, easting }
    }

    /// Inclusive range of rows whose centres may fall within `[min_n, max_n]`.
    fn row_range(&self, min_n: f64, max_n: f64, row_origin: RowOrigin) -> Option<(u32, u32)> {
        let (lo, hi) = match row_origin {
            RowOrigin::Top => (
                (self.origin_y - max_n) / self.cell_size - 0.5,
                (self.origin_y - min_n) / self.cell_size - 0.5,
            ),
            RowOrigin::Bottom => (
                (min_n - self.origin_y) / self.cell_size - 0.5,
                (max_n - self.origin_y) / self.cell_size - 0.5,
            ),
        };
        clamp_range(lo, hi, self.height)
    }

    /// Inclusive range of columns whose centres may fall within `[min_e, max_e]`.
    fn col_range(&self, min_e: f64, max_e: f64) -> Option<(u32, u32)> {
        let lo = (min_e - self.origin_x) / self.cell_size - 0.5;
        let hi = (max_e - self.origin_x) / self.cell_size - 0.5;
        clamp_range(lo, hi, self.width)
    }
}

fn clamp_range(lo: f64, hi: f64, len: u32) -> Option<(u32, u32)> {
    if !lo.is_finite() || !hi.is_finite() {
        return None;
    }
    let lo = lo.ceil().max(0.0);
    let hi = hi.floor().min(len as f64 - 1.0);
    if lo > hi {
        None
    } else {
        Some((lo as u32, hi as u32))
    }
}

/// Decoded blocks covering part of a raster.
#[derive(Debug)]
struct DecodedBlocks {
    layout: BlockLayout,
    width: u32,
    blocks: Vec<Option<Vec<f32>>>,
}

impl DecodedBlocks {
    /// Sample at pixel `(row, col)`; the block must have been decoded.
    fn sample(&self, row: u32, col: u32) -> Option<f32> {
        let layout = &self.layout;
        let index = layout.block_index(row, col) as usize;
        let block = self.blocks.get(index)?.as_ref()?;

        // Edge tiles may be delivered cropped or padded to full size.
        let full = (layout.block_width * layout.block_height) as usize;
        let bx = col / layout.block_width;
        let stride = if block.len() == full {
            layout.block_width
        } else {
            layout
                .block_width
                .min(self.width - bx * layout.block_width)
        };

        let offset = (row % layout.block_height) as usize * stride as usize
            + (col % layout.block_width) as usize;
        block.get(offset).copied()
    }
}

/// An open raster tile ready for windowed extraction.
pub struct RasterTile {
    path: PathBuf,
    data: Mmap,
    header: RasterHeader,
    row_origin: RowOrigin,
}

impl std::fmt::Debug for RasterTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterTile")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("row_origin", &self.row_origin)
            .finish()
    }
}

impl RasterTile {
    /// Open the raster described by a catalog entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file disappeared since it was catalogued or
    /// its tags are malformed.
    pub fn open(descriptor: &TileDescriptor, row_origin: RowOrigin) -> Result<Self> {
        Self::open_path(descriptor.path(), row_origin)
    }

    /// Open a raster file directly.
    pub fn open_path<P: AsRef<Path>>(path: P, row_origin: RowOrigin) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. We open the file read-only and don't expose the mapping.
        let data = unsafe { Mmap::map(&file)? };

        let mut decoder = Decoder::new(Cursor::new(&data[..]))
            .map_err(|e| DemError::corrupt(path, e.to_string()))?;
        let header = RasterHeader::from_decoder(&mut decoder, path)?;

        Ok(Self {
            path: path.to_path_buf(),
            data,
            header,
            row_origin,
        })
    }

    /// The raster's header.
    pub fn header(&self) -> &RasterHeader {
        &self.header
    }

    /// Extract every sample whose pixel centre lies inside `bounds`.
    ///
    /// Blocks intersecting the window are decoded up front; the returned
    /// iterator then yields `(location, elevation)` pairs lazily, skipping
    /// no-data and NaN samples.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::CorruptTile`] if a block cannot be decoded.
    pub fn extract<'a>(
        &'a self,
        bounds: &PlanarRect,
    ) -> Result<impl Iterator<Item = (PlanarPoint, f32)> + 'a> {
        let header = &self.header;
        let rows = header.row_range(bounds.min_northing, bounds.max_northing, self.row_origin);
        let cols = header.col_range(bounds.min_easting, bounds.max_easting);

        let window = rows.zip(cols);
        let blocks = match window {
            Some((rows, cols)) => self.decode_blocks(rows, cols)?,
            None => DecodedBlocks {
                layout: header.layout,
                width: header.width,
                blocks: Vec::new(),
            },
        };

        debug!(
            path = %self.path.display(),
            rows = ?window.map(|(r, _)| r),
            cols = ?window.map(|(_, c)| c),
            "extracting raster window"
        );

        let bounds = *bounds;
        let row_origin = self.row_origin;
        let no_data = header.no_data;

        let pixels = window.into_iter().flat_map(|((r0, r1), (c0, c1))| {
            (r0..=r1).flat_map(move |row| (c0..=c1).map(move |col| (row, col)))
        });

        Ok(pixels.filter_map(move |(row, col)| {
            let location = header.pixel_center(row, col, row_origin);
            if !bounds.contains(location) {
                return None;
            }
            let value = blocks.sample(row, col)?;
            if value.is_nan() || no_data.is_some_and(|nd| value == nd) {
                return None;
            }
            Some((location, value))
        }))
    }

    /// Decode every block intersecting the given row and column ranges.
    fn decode_blocks(&self, rows: (u32, u32), cols: (u32, u32)) -> Result<DecodedBlocks> {
        let layout = self.header.layout;
        let mut decoder = Decoder::new(Cursor::new(&self.data[..]))
            .map_err(|e| DemError::corrupt(&self.path, e.to_string()))?;

        let mut blocks: Vec<Option<Vec<f32>>> = vec![None; layout.block_count() as usize];

        for by in (rows.0 / layout.block_height)..=(rows.1 / layout.block_height) {
            for bx in (cols.0 / layout.block_width)..=(cols.1 / layout.block_width) {
                let index = by * layout.blocks_across + bx;
                let chunk = decoder.read_chunk(index).map_err(|e| {
                    DemError::corrupt(&self.path, format!("block {index}: {e}"))
                })?;
                blocks[index as usize] = Some(Self::to_f32(chunk));
            }
        }

        Ok(DecodedBlocks {
            layout,
            width: self.header.width,
            blocks,
        })
    }

    fn to_f32(result: DecodingResult) -> Vec<f32> {
        match result {
            DecodingResult::F32(data) => data,
            DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
        }
    }
}
