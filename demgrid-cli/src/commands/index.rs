use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Instant;

use super::ServiceArgs;

pub fn run(args: &ServiceArgs, directory: Option<PathBuf>) -> Result<()> {
    let service = args.build()?;
    let directory = directory.unwrap_or_else(|| service.data_dir().to_path_buf());

    let start = Instant::now();
    let index = service
        .rebuild_index(&directory)
        .with_context(|| format!("Failed to index {}", directory.display()))?;

    println!("Indexed: {}", directory.display());
    println!("  Tiles: {}", index.len());
    println!("  Ground (DEM): {}", index.ground_count());
    println!("  Surface (DSM): {}", index.surface_count());
    println!("  Elapsed: {}ms", start.elapsed().as_millis());

    Ok(())
}
