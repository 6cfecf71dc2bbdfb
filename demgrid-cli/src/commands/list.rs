use anyhow::{Context, Result};
use demgrid::RegionStrategy;
use std::fs;

use super::{format_size, ServiceArgs};

pub fn run(args: &ServiceArgs) -> Result<()> {
    let service = args.build()?;
    let catalog = service.catalog().context("Failed to load tile catalog")?;

    if catalog.is_empty() {
        println!(
            "No {} raster tiles found in: {}",
            service.region().name(),
            service.data_dir().display()
        );
        return Ok(());
    }

    let row_origin = service.region().row_origin();
    let mut total_size: u64 = 0;

    println!(
        "{:<36} {:>8} {:>11} {:>25}",
        "TILE", "LAYER", "SIZE", "EXTENT (N, E)"
    );
    println!("{}", "-".repeat(83));

    for descriptor in catalog.iter() {
        total_size += fs::metadata(descriptor.path())
            .map(|m| m.len())
            .unwrap_or(0);

        let layer = if descriptor.is_ground_layer {
            "DEM"
        } else {
            "DSM"
        };
        let bounds = descriptor.bounds(row_origin);
        println!(
            "{:<36} {:>8} {:>11} {:>25}",
            descriptor.file_name,
            layer,
            format!("{}x{}", descriptor.columns, descriptor.rows),
            format!("{:.0}, {:.0}", bounds.min_northing, bounds.min_easting)
        );
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total tiles: {}", catalog.len());
    println!("  Ground (DEM): {}", catalog.ground_count());
    println!("  Surface (DSM): {}", catalog.surface_count());
    println!("  Total size: {}", format_size(total_size));
    println!("  Data directory: {}", service.data_dir().display());

    Ok(())
}
