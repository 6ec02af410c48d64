extern crate pretty_env_logger;
#[macro_use] extern crate log;

use stations::{Station, StationStore};
use std::env;

fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <database> <command> [args...]", args[0]);
        eprintln!("Commands:");
        eprintln!("  init                                  - Create the StreamMidpoints table");
        eprintln!("  import <stations.json>                - Insert stations from a JSON array");
        eprintln!("  list                                  - List every station");
        eprintln!("  show <station_id>                     - Show one station");
        eprintln!("  within <min_lat> <min_lon> <max_lat> <max_lon> - List stations inside a box");
        eprintln!("  lookup <lat> <lon>                    - Exact-match station lookup");
        eprintln!("");
        eprintln!("Examples:");
        eprintln!("  {} datasample.db lookup 42.35 -71.05", args[0]);
        eprintln!("  {} datasample.db within 42.0 -71.0 42.5 -70.5", args[0]);
        std::process::exit(1);
    }

    let store = StationStore::open(&args[1]);

    match args[2].as_str() {
        "init" => {
            store.create_schema()?;
            println!("Initialized {:?}", store.path());
        }
        "import" => {
            let path = args.get(3).ok_or_else(|| anyhow::anyhow!("import needs a JSON file"))?;
            let content = std::fs::read_to_string(path)?;
            let stations: Vec<Station> = serde_json::from_str(&content)?;
            store.create_schema()?;
            let n = store.insert_all(&stations)?;
            println!("Imported {} stations", n);
        }
        "list" => {
            info!("{} stations in {:?}", store.count()?, store.path());
            for station in store.all_stations()? {
                println!("{}\t{}\t{}", station.station_id, station.lat, station.lon);
            }
        }
        "show" => {
            let id = args.get(3).ok_or_else(|| anyhow::anyhow!("show needs a station id"))?;
            match store.station(id)? {
                Some(station) => println!("{}", serde_json::to_string_pretty(&station)?),
                None => println!("No station with ID {}.", id),
            }
        }
        "within" => {
            if args.len() < 7 {
                eprintln!("Not enough arguments for within command");
                std::process::exit(1);
            }
            let min_lat: f64 = args[3].parse()?;
            let min_lon: f64 = args[4].parse()?;
            let max_lat: f64 = args[5].parse()?;
            let max_lon: f64 = args[6].parse()?;
            let found = store.stations_within(min_lat, min_lon, max_lat, max_lon)?;
            info!("{} stations inside the box", found.len());
            for station in found {
                println!("{}\t{}\t{}", station.station_id, station.lat, station.lon);
            }
        }
        "lookup" => {
            if args.len() < 5 {
                eprintln!("Not enough arguments for lookup command");
                std::process::exit(1);
            }
            let lat: f64 = args[3].parse()?;
            let lon: f64 = args[4].parse()?;
            match store.station_id_at(lat, lon)? {
                Some(id) => println!("Station ID for ({}, {}): {}", lat, lon, id),
                None => println!("No station ID found at ({}, {}).", lat, lon),
            }
        }
        other => {
            eprintln!("Unknown command: {}", other);
            std::process::exit(1);
        }
    }

    Ok(())
}
