mod app;

extern crate pretty_env_logger;
#[macro_use] extern crate log;

use app::config::{config_path, load_config, Config};
use app::forecast_screen::{ForecastScreen, ForecastState};
use app::headless::HeadlessMap;
use app::map_screen::{MapScreen, MapView};
use app::viewport::BoundingBox;
use openstreetmap::OpenStreetMapAPI;
use stations::StationStore;
use std::env;
use std::path::Path;
use std::time::Duration;

fn parse_bbox(args: &[String]) -> Result<BoundingBox, anyhow::Error> {
    let min_lat: f64 = args[0].parse()?;
    let min_lon: f64 = args[1].parse()?;
    let max_lat: f64 = args[2].parse()?;
    let max_lon: f64 = args[3].parse()?;
    Ok(BoundingBox::new(min_lat, min_lon, max_lat, max_lon))
}

/// Headless map screen over the configured station database, after one initial pass
fn entered_screen(config: &Config, bbox: BoundingBox, zoom: f64) -> Result<MapScreen<HeadlessMap, StationStore>, anyhow::Error> {
    let store = StationStore::open(&config.database);
    let mut screen = MapScreen::new(HeadlessMap::new(bbox, zoom), store, config);
    std::thread::sleep(screen.initial_delay());
    let report = screen.on_enter()?;
    info!("{} markers in view ({:?} sync)", report.visible(), screen.synchronizer().mode());
    Ok(screen)
}

fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <command> [args...]", args[0]);
        eprintln!("Commands:");
        eprintln!("  map <min_lat> <min_lon> <max_lat> <max_lon> <zoom>                  - Markers for one viewport");
        eprintln!("  replay <session.json>                                               - Replay map events");
        eprintln!("  select <lat> <lon>                                                  - Station at a coordinate");
        eprintln!("  forecast [site] [variable] [start] [end]                            - Fetch and plot a series");
        eprintln!("  snapshot <min_lat> <min_lon> <max_lat> <max_lon> <zoom> <out.png>   - Markers over OSM tiles");
        eprintln!("");
        eprintln!("Examples:");
        eprintln!("  {} map 42.0 -71.0 42.5 -70.5 10", args[0]);
        eprintln!("  {} forecast MWRA:36 MWRA:Temp 2005-12-04 2006-07-06", args[0]);
        std::process::exit(1);
    }

    let mut config = load_config(&config_path())?;

    match args[1].as_str() {
        "map" => {
            if args.len() < 7 {
                eprintln!("Not enough arguments for map command");
                std::process::exit(1);
            }
            let bbox = parse_bbox(&args[2..6])?;
            let zoom: f64 = args[6].parse()?;
            let screen = entered_screen(&config, bbox, zoom)?;
            for marker in screen.view().layer().markers() {
                println!("{}\t{}\t{}\t{}", marker.station_id, marker.lat, marker.lon, marker.size);
            }
        }
        "replay" => {
            let path = args.get(2).ok_or_else(|| anyhow::anyhow!("replay needs a session file"))?;
            let session = app::replay::load_session(Path::new(path))?;
            let store = StationStore::open(&config.database);
            let mut screen = app::replay::headless_screen(&session, store, &config);
            std::thread::sleep(screen.initial_delay());
            for step in app::replay::replay(&mut screen, &session.events) {
                println!("{}", serde_json::to_string(&step)?);
            }
        }
        "select" => {
            if args.len() < 4 {
                eprintln!("Not enough arguments for select command");
                std::process::exit(1);
            }
            let lat: f64 = args[2].parse()?;
            let lon: f64 = args[3].parse()?;
            let store = StationStore::open(&config.database);
            match store.station_id_at(lat, lon)? {
                Some(id) => println!("{}", id),
                None => {
                    warn!("No station ID found for the marker at ({}, {}).", lat, lon);
                    println!("{}", app::map_screen::NO_STATION_LABEL);
                }
            }
        }
        "forecast" => {
            let overrides = [
                &mut config.site_code,
                &mut config.variable_code,
                &mut config.start_date,
                &mut config.end_date,
            ];
            for (field, value) in overrides.into_iter().zip(args.iter().skip(2)) {
                *field = value.clone();
            }

            let rt = tokio::runtime::Runtime::new()?;
            let mut screen = ForecastScreen::from_config(&config, rt.handle().clone())?;
            screen.on_pre_enter();
            let state = screen.wait(config.fetch_timeout() + Duration::from_secs(5)).clone();
            match state {
                ForecastState::Ready => {
                    if let Some(series) = screen.series() {
                        println!("{} values for {} saved to {:?}", series.points.len(), series.site_code, config.plot_path);
                    }
                }
                ForecastState::Error(reason) => {
                    eprintln!("Forecast failed: {}", reason);
                    std::process::exit(2);
                }
                other => {
                    eprintln!("Forecast did not finish: {:?}", other);
                    std::process::exit(2);
                }
            }
        }
        "snapshot" => {
            if args.len() < 8 {
                eprintln!("Not enough arguments for snapshot command");
                std::process::exit(1);
            }
            let bbox = parse_bbox(&args[2..6])?;
            let zoom: f64 = args[6].parse()?;
            let output = Path::new(&args[7]);
            let screen = entered_screen(&config, bbox, zoom)?;

            let rt = tokio::runtime::Runtime::new()?;
            let api = OpenStreetMapAPI::new();
            rt.block_on(app::snapshot::save_snapshot(&api, screen.view(), output))?;
            println!("Snapshot saved to {:?}", output);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            std::process::exit(1);
        }
    }

    Ok(())
}
