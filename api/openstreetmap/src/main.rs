extern crate pretty_env_logger;
#[macro_use] extern crate log;

use openstreetmap::OpenStreetMapAPI;
use std::env;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 7 {
        eprintln!("Usage: {} <min_lat> <min_lon> <max_lat> <max_lon> <zoom> <output.png> [--uncropped]", args[0]);
        eprintln!("Example: {} 42.0 -71.0 42.5 -70.5 10 boston.png", args[0]);
        std::process::exit(1);
    }

    let bbox = (
        args[1].parse::<f64>()?,
        args[2].parse::<f64>()?,
        args[3].parse::<f64>()?,
        args[4].parse::<f64>()?,
    );
    let zoom: u32 = args[5].parse()?;
    let output = &args[6];

    info!("Bounding box: {:?}, zoom {}", bbox, zoom);

    let api = OpenStreetMapAPI::new();
    if args.get(7).map(String::as_str) == Some("--uncropped") {
        let image = api.download_map(bbox, zoom).await?;
        image.save(output)?;
        info!("Saved {}x{} uncropped map to {}", image.width(), image.height(), output);
        return Ok(());
    }

    match api.download_cropped_map(bbox, zoom).await {
        Ok(map) => {
            map.image.save(output)?;
            info!("Saved {}x{} map to {}", map.image.width(), map.image.height(), output);
        }
        Err(e) => {
            error!("Error downloading map: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
