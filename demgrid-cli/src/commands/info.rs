use anyhow::{bail, Context, Result};
use demgrid::catalog::is_ground_layer_name;
use demgrid::{RasterHeader, RowOrigin};
use std::path::PathBuf;

use super::format_size;

pub fn run(file: PathBuf) -> Result<()> {
    if !file.exists() {
        bail!("Raster not found: {}", file.display());
    }

    let header = RasterHeader::read(&file).context("Failed to read raster header")?;
    let file_size = std::fs::metadata(&file)?.len();

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let layer = if is_ground_layer_name(&name) {
        "ground (DEM)"
    } else {
        "surface (DSM)"
    };

    let width_m = header.width as f64 * header.cell_size;
    let height_m = header.height as f64 * header.cell_size;
    let layout = &header.layout;

    // Display information
    println!("Tile: {}", name);
    println!("Path: {}", file.display());
    println!("Layer: {}", layer);
    println!();
    println!(
        "Size: {}x{} pixels at {}m ({:.0}m x {:.0}m)",
        header.width, header.height, header.cell_size, width_m, height_m
    );
    println!("CRS: {}", header.crs);
    println!(
        "Extent: N {:.1} to {:.1}, E {:.1} to {:.1}",
        header.origin_y - height_m,
        header.origin_y,
        header.origin_x,
        header.origin_x + width_m
    );
    match header.no_data {
        Some(nd) => println!("No-data value: {}", nd),
        None => println!("No-data value: none"),
    }
    println!(
        "Layout: {} {}x{} ({} blocks)",
        if layout.tiled { "tiles" } else { "strips" },
        layout.block_width,
        layout.block_height,
        layout.block_count()
    );
    println!("File size: {}", format_size(file_size));

    let centre = header.pixel_center(header.height / 2, header.width / 2, RowOrigin::Top);
    println!(
        "Centre pixel: N {:.1}, E {:.1}",
        centre.northing, centre.easting
    );

    Ok(())
}
