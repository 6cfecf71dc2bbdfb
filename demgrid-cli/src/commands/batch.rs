use anyhow::{Context, Result};
use demgrid::{AreaElevation, BoundingBox, ElevationService, GlobalPoint, Layer, RegionStrategy};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use super::{format_elevation, ServiceArgs, POINT_PAD_DEG};

/// Points are grouped into cells of this many degrees, one area load each.
const GROUP_DEG: f64 = 0.01;

pub fn run(
    args: &ServiceArgs,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: String,
    lon_col: String,
) -> Result<()> {
    let service = args.build()?;

    let file = File::open(&input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;
    let mut points = Vec::with_capacity(records.len());
    for (line, record) in records.iter().enumerate() {
        let lat: f64 = record
            .get(lat_idx)
            .context("Missing latitude")?
            .trim()
            .parse()
            .with_context(|| format!("Invalid latitude on row {}", line + 1))?;
        let lon: f64 = record
            .get(lon_idx)
            .context("Missing longitude")?
            .trim()
            .parse()
            .with_context(|| format!("Invalid longitude on row {}", line + 1))?;
        points.push(GlobalPoint::new(lat, lon));
    }

    let elevations = lookup(&service, &points)?;

    // Prepare output
    let output_path = output.unwrap_or_else(|| default_output(&input));
    let output_file = File::create(&output_path).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("ground");
    new_headers.push("surface");
    writer.write_record(&new_headers)?;

    for (record, (ground, surface)) in records.iter().zip(&elevations) {
        let ground = format_elevation(*ground);
        let surface = format_elevation(*surface);
        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(&ground);
        new_record.push(&surface);
        writer.write_record(&new_record)?;
    }
    writer.flush()?;

    println!("Output written to: {}", output_path.display());
    Ok(())
}

/// Ground and surface elevation for every point, NaN where unavailable.
///
/// Nearby points share one area load; points outside the region get NaN.
fn lookup(service: &ElevationService, points: &[GlobalPoint]) -> Result<Vec<(f32, f32)>> {
    let mut results = vec![(f32::NAN, f32::NAN); points.len()];

    let mut groups: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, p) in points.iter().enumerate() {
        if !service.region().envelope().contains(*p) {
            continue;
        }
        let key = (
            (p.lat / GROUP_DEG).floor() as i64,
            (p.lon / GROUP_DEG).floor() as i64,
        );
        groups.entry(key).or_default().push(i);
    }

    let pb = ProgressBar::new(points.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    pb.inc((points.len() - groups.values().map(Vec::len).sum::<usize>()) as u64);

    for indices in groups.values() {
        let area = load_group(service, points, indices)?;
        for &i in indices {
            results[i] = (
                area.elevation_at(points[i], Layer::Ground)?,
                area.elevation_at(points[i], Layer::Surface)?,
            );
            pb.inc(1);
        }
    }

    pb.finish_with_message("done");
    Ok(results)
}

fn load_group(
    service: &ElevationService,
    points: &[GlobalPoint],
    indices: &[usize],
) -> Result<AreaElevation> {
    let mut bbox = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for &i in indices {
        let p = points[i];
        bbox.min_lat = bbox.min_lat.min(p.lat - POINT_PAD_DEG);
        bbox.min_lon = bbox.min_lon.min(p.lon - POINT_PAD_DEG);
        bbox.max_lat = bbox.max_lat.max(p.lat + POINT_PAD_DEG);
        bbox.max_lon = bbox.max_lon.max(p.lon + POINT_PAD_DEG);
    }
    service
        .load_area(&bbox, false)
        .context("Failed to load elevation data")
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "points".to_string());
    input.with_file_name(format!("{}_elevation.csv", stem))
}
