extern crate pretty_env_logger;
#[macro_use] extern crate log;

use hydroserver::{HydroServerAPI, ValuesQuery, MWRA_ENDPOINT};
use std::env;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <command> [args...]", args[0]);
        eprintln!("Commands:");
        eprintln!("  sites [endpoint]                                  - List sites");
        eprintln!("  values <site> <variable> <start> <end> [endpoint] - Fetch a time series");
        eprintln!("");
        eprintln!("Examples:");
        eprintln!("  {} sites", args[0]);
        eprintln!("  {} values MWRA:36 MWRA:Temp 2005-12-04 2006-07-06", args[0]);
        std::process::exit(1);
    }

    match args[1].as_str() {
        "sites" => {
            let endpoint = args.get(2).map(String::as_str).unwrap_or(MWRA_ENDPOINT);
            let api = HydroServerAPI::new(endpoint)?;
            let sites = api.get_sites().await?;
            info!("Found {} sites", sites.len());
            for site in &sites {
                println!("{}\t{}\t{}\t{}", site.site_code, site.lat, site.lon, site.name);
            }
        }
        "values" => {
            if args.len() < 6 {
                eprintln!("Not enough arguments for values command");
                std::process::exit(1);
            }
            let query = ValuesQuery::from_strings(&args[2], &args[3], &args[4], &args[5])?;
            let endpoint = args.get(6).map(String::as_str).unwrap_or(MWRA_ENDPOINT);
            let api = HydroServerAPI::new(endpoint)?;

            match api.get_values(&query).await {
                Ok(series) => {
                    println!("{}", serde_json::to_string_pretty(&series)?);
                }
                Err(e) => {
                    error!("Failed to fetch values: {}", e);
                    std::process::exit(1);
                }
            }
        }
        other => {
            eprintln!("Unknown command: {}", other);
            std::process::exit(1);
        }
    }

    Ok(())
}
