//! Basic example demonstrating demgrid library usage.
//!
//! Run with: cargo run --example basic -- /path/to/lidar/tiles

use demgrid::{BoundingBox, DemError, ElevationService, GlobalPoint, Layer};
use std::env;

fn main() -> Result<(), DemError> {
    // Get data directory from command line
    let data_dir = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/lidar/tiles");
        std::process::exit(1);
    });

    // Keep up to 4 directory catalogs in memory
    let service = ElevationService::new(&data_dir, 4)?;

    let catalog = service.catalog()?;
    println!(
        "Catalog: {} tiles ({} ground, {} surface)",
        catalog.len(),
        catalog.ground_count(),
        catalog.surface_count()
    );

    // About 900 m x 750 m of Wellington's waterfront
    let bbox = BoundingBox::new(-41.2920, 174.7750, -41.2840, 174.7840);
    let area = service.load_area(&bbox, true)?;

    let locations = [
        ("Te Papa", -41.2905, 174.7820),
        ("Civic Square", -41.2890, 174.7770),
        ("Queens Wharf", -41.2855, 174.7785),
    ];

    println!("\nElevation queries:");
    println!("{:-<50}", "");

    for (name, lat, lon) in &locations {
        let point = GlobalPoint::new(*lat, *lon);
        let ground = area.elevation_at(point, Layer::Ground)?;
        let surface = area.elevation_at(point, Layer::Surface)?;
        if ground.is_nan() {
            println!("{}: no data", name);
        } else {
            println!("{}: ground {:.2}m, surface {:.2}m", name, ground, surface);
        }
    }

    // Show cache statistics
    let stats = service.cache_stats();
    println!("\nCache statistics:");
    println!("  Cached catalogs: {}", stats.entry_count);
    println!("  Hits: {}", stats.hit_count);
    println!("  Misses: {}", stats.miss_count);
    println!("  Hit rate: {:.1}%", stats.hit_rate() * 100.0);

    Ok(())
}
