use anyhow::{Context, Result};
use demgrid::{BoundingBox, ElevationGrid};
use std::path::PathBuf;
use std::time::Instant;

use super::ServiceArgs;

pub fn run(args: &ServiceArgs, bbox: BoundingBox, output: PathBuf, fill_gaps: bool) -> Result<()> {
    let service = args.build()?;

    let start = Instant::now();
    let area = service
        .load_area(&bbox, fill_gaps)
        .context("Failed to load area")?;

    describe("Ground", area.ground());
    describe("Surface", area.surface());

    let written = area
        .save(&output)
        .with_context(|| format!("Failed to write tables to {}", output.display()))?;

    println!();
    for path in &written {
        println!("Written: {}", path.display());
    }
    println!("Elapsed: {}ms", start.elapsed().as_millis());

    Ok(())
}

fn describe(name: &str, grid: Option<&ElevationGrid>) {
    let Some(grid) = grid else {
        println!("{}: no tiles cover the area", name);
        return;
    };
    let extent = grid.extent();
    print!(
        "{}: {}x{} cells, {} with data",
        name,
        extent.rows(),
        extent.cols(),
        grid.count()
    );
    match (grid.min_elevation(), grid.max_elevation()) {
        (Some(lo), Some(hi)) => println!(", {:.2}m to {:.2}m", lo, hi),
        _ => println!(),
    }
}
