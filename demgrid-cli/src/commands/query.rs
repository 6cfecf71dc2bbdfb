use anyhow::{bail, Context, Result};
use demgrid::{GlobalPoint, Layer};
use serde::Serialize;

use super::{format_elevation, point_box, ServiceArgs};

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ground: Option<Option<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface: Option<Option<f32>>,
}

pub fn run(
    args: &ServiceArgs,
    lat: f64,
    lon: f64,
    layer: Option<Layer>,
    json: bool,
) -> Result<()> {
    let layers = match layer {
        None => vec![Layer::Ground, Layer::Surface],
        Some(Layer::Swathe) => bail!("The swathe layer is not stored in raster tiles"),
        Some(layer) => vec![layer],
    };

    let service = args.build()?;
    let area = service
        .load_area(&point_box(lat, lon), false)
        .context("Failed to load elevation data")?;

    let point = GlobalPoint::new(lat, lon);
    let mut response = ElevationResponse {
        lat,
        lon,
        ground: None,
        surface: None,
    };
    for layer in &layers {
        let value = area
            .elevation_at(point, *layer)
            .context("Failed to get elevation")?;
        let value = (!value.is_nan()).then_some(value);
        match layer {
            Layer::Ground => response.ground = Some(value),
            _ => response.surface = Some(value),
        }
    }

    // Output result
    if json {
        println!("{}", serde_json::to_string(&response)?);
    } else {
        for (name, value) in [("ground", response.ground), ("surface", response.surface)] {
            if let Some(value) = value {
                let shown = format_elevation(value.unwrap_or(f32::NAN));
                if layers.len() == 1 {
                    println!("{}", shown);
                } else {
                    println!("{}: {}", name, shown);
                }
            }
        }
    }

    Ok(())
}
