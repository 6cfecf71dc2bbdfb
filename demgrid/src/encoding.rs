//! Compact hex encoding of grids for tabular storage.
//!
//! Every cell becomes four uppercase hex digits holding the quantized value
//! (0.25 m units, so `0000`-`FFFF` spans 0 to 16383.75 m). A grid row's
//! digits are concatenated and cut into chunks of [`VALUES_PER_CHUNK`]
//! values so no stored cell exceeds [`CHUNK_CHARS`] characters.
//!
//! Two conversions are lossy and not reversed on decode:
//!
//! - negative elevations are clamped to `0000` (sea level);
//! - unknown cells are written as `0000` and read back as 0.0 m.
//!
//! A table is a CSV file with a metadata block followed by one record per
//! grid row, southernmost row first:
//!
//! ```text
//! source,NZ LiDAR DEM
//! bounds,5785950,5786150,1953950,1954150
//! vertical_accuracy,0.2
//! range,40,493
//! count,12
//! dimensions,201,201
//! row,0000000000A4...,...
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use csv::StringRecord;

use crate::error::{DemError, Result};
use crate::grid::{ElevationGrid, GridExtent, QUANTUM};
use crate::swathe::SwatheGrid;

/// Values per stored chunk.
pub const VALUES_PER_CHUNK: usize = 75;

/// Characters per full chunk.
pub const CHUNK_CHARS: usize = VALUES_PER_CHUNK * 4;

/// Source label written for swathe tables.
pub const SWATHE_SOURCE: &str = "swathe";

/// Encode one elevation in metres as four hex digits.
///
/// Negative values and NaN clamp to `0000`; values above 16383.75 m clamp
/// to `FFFF`.
pub fn encode_value(elevation_m: f32) -> String {
    let units = (elevation_m.max(0.0) / QUANTUM)
        .round()
        .min(u16::MAX as f32);
    format!("{:04X}", units as u16)
}

/// Decode four hex digits into an elevation in metres.
pub fn decode_value(hex: &str) -> Result<f32> {
    Ok(parse_hex(hex)? as f32 * QUANTUM)
}

fn parse_hex(hex: &str) -> Result<u16> {
    if hex.len() != 4 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DemError::Encoding(format!(
            "expected 4 hex digits, got {hex:?}"
        )));
    }
    u16::from_str_radix(hex, 16)
        .map_err(|_| DemError::Encoding(format!("invalid hex value {hex:?}")))
}

/// Encode one row of quantized values into chunks.
pub fn encode_row(units: impl IntoIterator<Item = i16>) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::with_capacity(CHUNK_CHARS);
    for value in units {
        if current.len() == CHUNK_CHARS {
            chunks.push(std::mem::replace(
                &mut current,
                String::with_capacity(CHUNK_CHARS),
            ));
        }
        current.push_str(&format!("{:04X}", value.max(0) as u16));
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Decode a chunked row back into `cols` raw values.
pub fn decode_row<S: AsRef<str>>(chunks: &[S], cols: usize) -> Result<Vec<u16>> {
    let mut values = Vec::with_capacity(cols);
    for chunk in chunks {
        let chunk = chunk.as_ref();
        if chunk.len() > CHUNK_CHARS || chunk.len() % 4 != 0 || !chunk.is_ascii() {
            return Err(DemError::Encoding(format!(
                "bad chunk of length {}",
                chunk.len()
            )));
        }
        for start in (0..chunk.len()).step_by(4) {
            values.push(parse_hex(&chunk[start..start + 4])?);
        }
    }
    if values.len() != cols {
        return Err(DemError::Encoding(format!(
            "row holds {} values, expected {cols}",
            values.len()
        )));
    }
    Ok(values)
}

/// Summary written ahead of the encoded rows.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMetadata {
    /// Data source label.
    pub source: String,
    /// Southern bound.
    pub min_northing: f64,
    /// Northern bound.
    pub max_northing: f64,
    /// Western bound.
    pub min_easting: f64,
    /// Eastern bound.
    pub max_easting: f64,
    /// Vertical accuracy estimate in metres.
    pub vertical_accuracy: f32,
    /// Lowest and highest quantized value, if any cell was known.
    pub range: Option<(i16, i16)>,
    /// Number of non-empty cells.
    pub count: usize,
}

impl GridMetadata {
    fn for_extent(extent: &GridExtent) -> Self {
        Self {
            source: String::new(),
            min_northing: extent.min_northing(),
            max_northing: extent.max_northing(),
            min_easting: extent.min_easting(),
            max_easting: extent.max_easting(),
            vertical_accuracy: 0.0,
            range: None,
            count: 0,
        }
    }

    /// Rebuild the grid extent the metadata describes.
    pub fn extent(&self) -> Result<GridExtent> {
        GridExtent::from_bounds(
            self.min_northing,
            self.max_northing,
            self.min_easting,
            self.max_easting,
        )
    }
}

/// A grid in its persisted form: metadata plus chunked rows.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedGrid {
    /// Metadata block.
    pub metadata: GridMetadata,
    /// Encoded rows, southernmost first.
    pub rows: Vec<Vec<String>>,
}

/// Encode an elevation grid.
pub fn encode(grid: &ElevationGrid) -> EncodedGrid {
    let extent = grid.extent();
    let mut metadata = GridMetadata::for_extent(extent);
    metadata.source = grid.source().to_string();
    metadata.vertical_accuracy = grid.vertical_accuracy();
    metadata.range = grid.quantized_range();
    metadata.count = grid.count();

    let rows = grid
        .values()
        .chunks(extent.cols())
        .map(|row| encode_row(row.iter().copied()))
        .collect();
    EncodedGrid { metadata, rows }
}

/// Decode an elevation grid.
///
/// Every decoded cell is known: `0000` reads back as 0.0 m. The count and
/// range come from the metadata.
///
/// # Errors
///
/// Returns [`DemError::Encoding`] if the rows disagree with the metadata
/// dimensions or hold values beyond the grid's 16-bit range.
pub fn decode(encoded: &EncodedGrid) -> Result<ElevationGrid> {
    let metadata = &encoded.metadata;
    let extent = checked_extent(encoded)?;

    let mut values = Vec::with_capacity(extent.len());
    for row in &encoded.rows {
        for raw in decode_row(row, extent.cols())? {
            let units = i16::try_from(raw).map_err(|_| {
                DemError::Encoding(format!("value {raw:04X} exceeds grid range"))
            })?;
            values.push(units);
        }
    }

    Ok(
        ElevationGrid::from_parts(extent, values, metadata.count, metadata.range)
            .with_source(metadata.source.clone())
            .with_vertical_accuracy(metadata.vertical_accuracy),
    )
}

/// Encode a swathe grid; seen cells are `0001`, unseen `0000`.
pub fn encode_swathe(grid: &SwatheGrid) -> EncodedGrid {
    let extent = *grid.extent();
    let mut metadata = GridMetadata::for_extent(&extent);
    metadata.source = SWATHE_SOURCE.to_string();
    metadata.count = grid.seen_count();
    if grid.seen_count() > 0 {
        metadata.range = Some((1, 1));
    }

    let rows = (0..extent.rows())
        .map(|row| encode_row((0..extent.cols()).map(|col| grid.is_seen(row, col) as i16)))
        .collect();
    EncodedGrid { metadata, rows }
}

/// Decode a swathe grid; any non-zero cell counts as seen.
pub fn decode_swathe(encoded: &EncodedGrid) -> Result<SwatheGrid> {
    let extent = checked_extent(encoded)?;
    let mut grid = SwatheGrid::from_extent(extent);
    for (row, chunks) in encoded.rows.iter().enumerate() {
        for (col, raw) in decode_row(chunks, extent.cols())?.into_iter().enumerate() {
            if raw != 0 {
                grid.set_seen(extent.cell_index(row, col)?);
            }
        }
    }
    Ok(grid)
}

fn checked_extent(encoded: &EncodedGrid) -> Result<GridExtent> {
    let metadata = &encoded.metadata;
    let extent = metadata.extent()?;
    if encoded.rows.len() != extent.rows() {
        return Err(DemError::Encoding(format!(
            "table holds {} rows, bounds imply {}",
            encoded.rows.len(),
            extent.rows()
        )));
    }
    if metadata.count > extent.len() {
        return Err(DemError::Encoding(format!(
            "count {} exceeds {} cells",
            metadata.count,
            extent.len()
        )));
    }
    if let Some((lo, hi)) = metadata.range {
        if lo > hi {
            return Err(DemError::Encoding(format!("range {lo}..{hi} is inverted")));
        }
    }
    Ok(extent)
}

impl EncodedGrid {
    /// Write the table as CSV.
    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_writer(out);

        let m = &self.metadata;
        writer.write_record(["source", m.source.as_str()])?;
        writer.write_record([
            "bounds".to_string(),
            m.min_northing.to_string(),
            m.max_northing.to_string(),
            m.min_easting.to_string(),
            m.max_easting.to_string(),
        ])?;
        writer.write_record(["vertical_accuracy".to_string(), m.vertical_accuracy.to_string()])?;
        match m.range {
            Some((lo, hi)) => {
                writer.write_record(["range".to_string(), lo.to_string(), hi.to_string()])?
            }
            None => writer.write_record(["range"])?,
        }
        writer.write_record(["count".to_string(), m.count.to_string()])?;
        let cols = self.rows.first().map_or(0, |r| r.iter().map(|c| c.len() / 4).sum::<usize>());
        writer.write_record([
            "dimensions".to_string(),
            self.rows.len().to_string(),
            cols.to_string(),
        ])?;

        for row in &self.rows {
            writer.write_record(std::iter::once("row").chain(row.iter().map(String::as_str)))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a table written by [`EncodedGrid::write_to`].
    pub fn read_from<R: Read>(input: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_reader(input);

        let mut source = None;
        let mut bounds = None;
        let mut vertical_accuracy = None;
        let mut range = None;
        let mut count = None;
        let mut dimensions = None;
        let mut rows = Vec::new();

        for record in reader.records() {
            let record = record?;
            match record.get(0) {
                Some("source") => source = Some(record.get(1).unwrap_or_default().to_string()),
                Some("bounds") => {
                    bounds = Some((
                        field::<f64>(&record, 1, "bounds")?,
                        field::<f64>(&record, 2, "bounds")?,
                        field::<f64>(&record, 3, "bounds")?,
                        field::<f64>(&record, 4, "bounds")?,
                    ))
                }
                Some("vertical_accuracy") => {
                    vertical_accuracy = Some(field::<f32>(&record, 1, "vertical_accuracy")?)
                }
                Some("range") => {
                    range = Some(if record.len() < 3 {
                        None
                    } else {
                        Some((
                            field::<i16>(&record, 1, "range")?,
                            field::<i16>(&record, 2, "range")?,
                        ))
                    })
                }
                Some("count") => count = Some(field::<usize>(&record, 1, "count")?),
                Some("dimensions") => {
                    dimensions = Some((
                        field::<usize>(&record, 1, "dimensions")?,
                        field::<usize>(&record, 2, "dimensions")?,
                    ))
                }
                Some("row") => rows.push(record.iter().skip(1).map(str::to_string).collect()),
                Some(other) => {
                    return Err(DemError::Encoding(format!("unknown record {other:?}")))
                }
                None => {}
            }
        }

        let missing = |what: &str| DemError::Encoding(format!("missing {what} record"));
        let (min_northing, max_northing, min_easting, max_easting) =
            bounds.ok_or_else(|| missing("bounds"))?;
        let encoded = Self {
            metadata: GridMetadata {
                source: source.ok_or_else(|| missing("source"))?,
                min_northing,
                max_northing,
                min_easting,
                max_easting,
                vertical_accuracy: vertical_accuracy.ok_or_else(|| missing("vertical_accuracy"))?,
                range: range.ok_or_else(|| missing("range"))?,
                count: count.ok_or_else(|| missing("count"))?,
            },
            rows,
        };

        if let Some((rows, cols)) = dimensions {
            let extent = encoded.metadata.extent()?;
            if rows != extent.rows() || cols != extent.cols() {
                return Err(DemError::Encoding(format!(
                    "dimensions {rows}x{cols} disagree with bounds ({}x{})",
                    extent.rows(),
                    extent.cols()
                )));
            }
        }
        Ok(encoded)
    }

    /// Write the table to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_to(&mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Read a table from a file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }
}

fn field<T: FromStr>(record: &StringRecord, index: usize, what: &str) -> Result<T> {
    record
        .get(index)
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| DemError::Encoding(format!("bad {what} record")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::PlanarPoint;
    use tempfile::TempDir;

    fn sample_grid() -> ElevationGrid {
        let mut grid = ElevationGrid::new(
            PlanarPoint::new(5_786_000.0, 1_954_000.0),
            PlanarPoint::new(5_786_100.0, 1_954_100.0),
            50.0,
        )
        .unwrap()
        .with_source("NZ LiDAR DEM")
        .with_vertical_accuracy(0.2);
        grid.insert(PlanarPoint::new(5_786_010.0, 1_954_020.0), 123.37)
            .unwrap();
        grid.insert(PlanarPoint::new(5_786_011.0, 1_954_020.0), 10.0)
            .unwrap();
        grid.insert(PlanarPoint::new(5_786_012.0, 1_954_020.0), -3.0)
            .unwrap();
        grid
    }

    #[test]
    fn test_value_exact_on_quarter_metres() {
        for units in (0..=u16::MAX).step_by(7) {
            let e = units as f32 * QUANTUM;
            assert_eq!(decode_value(&encode_value(e)).unwrap(), e);
        }
        assert_eq!(encode_value(16383.75), "FFFF");
        assert_eq!(decode_value("FFFF").unwrap(), 16383.75);
    }

    #[test]
    fn test_value_within_half_step() {
        let mut e = 0.0f32;
        while e <= 16383.75 {
            let back = decode_value(&encode_value(e)).unwrap();
            assert!((back - e).abs() <= 0.125, "{e} -> {back}");
            e += 0.37;
        }
    }

    #[test]
    fn test_value_format() {
        assert_eq!(encode_value(0.0), "0000");
        assert_eq!(encode_value(123.25), "01ED");
        assert_eq!(encode_value(-5.0), "0000");
        assert_eq!(encode_value(f32::NAN), "0000");
        assert!(decode_value("01ed").is_ok());
        assert!(decode_value("XYZW").is_err());
        assert!(decode_value("123").is_err());
        assert!(decode_value("+123").is_err());
    }

    #[test]
    fn test_row_chunking() {
        let chunks = encode_row((0..160).map(|v| v as i16));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), CHUNK_CHARS);
        assert_eq!(chunks[1].len(), CHUNK_CHARS);
        assert_eq!(chunks[2].len(), 10 * 4);
        assert!(chunks[0].starts_with("000000010002"));

        let back = decode_row(&chunks, 160).unwrap();
        assert_eq!(back, (0..160).collect::<Vec<u16>>());
        assert!(decode_row(&chunks, 161).is_err());
    }

    #[test]
    fn test_grid_round_trip() {
        let grid = sample_grid();
        let decoded = decode(&encode(&grid)).unwrap();

        assert_eq!(decoded.extent(), grid.extent());
        assert_eq!(decoded.source(), "NZ LiDAR DEM");
        assert_eq!(decoded.vertical_accuracy(), 0.2);
        assert_eq!(decoded.count(), 3);
        assert_eq!(decoded.quantized_range(), grid.quantized_range());

        let p = PlanarPoint::new(5_786_010.0, 1_954_020.0);
        assert_eq!(decoded.query_by_planar(p), Some(123.25));
        assert_eq!(
            decoded.query_by_planar(PlanarPoint::new(5_786_011.0, 1_954_020.0)),
            Some(10.0)
        );
        // Negative elevations clamp to sea level
        assert_eq!(
            decoded.query_by_planar(PlanarPoint::new(5_786_012.0, 1_954_020.0)),
            Some(0.0)
        );
        // Unknown cells come back as sea level
        assert_eq!(
            decoded.query_by_planar(PlanarPoint::new(5_786_050.0, 1_954_050.0)),
            Some(0.0)
        );
    }

    #[test]
    fn test_grid_index_round_trip() {
        let mut grid = sample_grid();
        grid.fill_gaps();
        let decoded = decode(&encode(&grid)).unwrap();
        let extent = grid.extent();
        for row in (0..extent.rows()).step_by(13) {
            for col in (0..extent.cols()).step_by(11) {
                let original = grid.query_by_grid_index(row, col).max(0.0);
                assert_eq!(decoded.query_by_grid_index(row, col), original);
            }
        }
    }

    #[test]
    fn test_table_file_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ground.csv");
        let encoded = encode(&sample_grid());
        encoded.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("source,NZ LiDAR DEM\n"));
        assert!(text.contains("dimensions,201,201\n"));

        let loaded = EncodedGrid::load(&path).unwrap();
        assert_eq!(loaded, encoded);
    }

    #[test]
    fn test_empty_range_round_trip() {
        let grid = ElevationGrid::new(
            PlanarPoint::new(0.0, 0.0),
            PlanarPoint::new(10.0, 10.0),
            0.0,
        )
        .unwrap();
        let encoded = encode(&grid);
        let mut buf = Vec::new();
        encoded.write_to(&mut buf).unwrap();
        let loaded = EncodedGrid::read_from(&buf[..]).unwrap();
        assert_eq!(loaded.metadata.range, None);
        assert_eq!(loaded.metadata.count, 0);
    }

    #[test]
    fn test_swathe_round_trip() {
        let mut swathe =
            SwatheGrid::new(PlanarPoint::new(0.0, 0.0), PlanarPoint::new(100.0, 100.0), 0.0)
                .unwrap();
        swathe
            .mark_seen([
                PlanarPoint::new(10.0, 10.0),
                PlanarPoint::new(10.0, 90.0),
                PlanarPoint::new(20.0, 90.0),
                PlanarPoint::new(20.0, 10.0),
            ])
            .unwrap();

        let encoded = encode_swathe(&swathe);
        assert_eq!(encoded.metadata.source, SWATHE_SOURCE);
        assert_eq!(encoded.metadata.count, 800);
        assert!(encoded.rows[15][0].contains("0001"));

        let decoded = decode_swathe(&encoded).unwrap();
        assert_eq!(decoded.seen_count(), 800);
        assert!(decoded.is_seen(15, 50));
        assert!(!decoded.is_seen(25, 50));
    }

    #[test]
    fn test_mismatched_table_rejected() {
        let mut encoded = encode(&sample_grid());
        encoded.rows.pop();
        assert!(matches!(decode(&encoded), Err(DemError::Encoding(_))));

        let mut encoded = encode(&sample_grid());
        encoded.rows[0][0].push_str("00");
        assert!(matches!(decode(&encoded), Err(DemError::Encoding(_))));

        let mut encoded = encode(&sample_grid());
        encoded.rows[3][0].replace_range(0..4, "FFFF");
        assert!(matches!(decode(&encoded), Err(DemError::Encoding(_))));
    }

    #[test]
    fn test_bad_table_text() {
        let text = "source,x\nrange\ncount,0\n";
        assert!(matches!(
            EncodedGrid::read_from(text.as_bytes()),
            Err(DemError::Encoding(_))
        ));

        let text = "source,x\nbounds,0,1,0,1\nvertical_accuracy,0\nrange\ncount,0\ndimensions,5,5\n";
        assert!(matches!(
            EncodedGrid::read_from(text.as_bytes()),
            Err(DemError::Encoding(_))
        ));
    }
}
