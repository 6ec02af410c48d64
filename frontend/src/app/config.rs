use crate::app::map_screen::SelectionLookup;
use crate::app::markers::SyncMode;
use crate::app::viewport::{DEFAULT_MARGIN, DEFAULT_MARKER_SCALE};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "streamwatch.json";
pub const CONFIG_ENV_VAR: &str = "STREAMWATCH_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: PathBuf,
    pub margin: f64,
    pub marker_scale: f64,
    pub sync_mode: SyncMode,
    pub selection_lookup: SelectionLookup,
    pub initial_delay_ms: u64,
    pub hydroserver_url: String,
    pub site_code: String,
    pub variable_code: String,
    pub start_date: String,
    pub end_date: String,
    pub fetch_timeout_secs: u64,
    pub plot_path: PathBuf,
    pub plot_title: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("datasample.db"),
            margin: DEFAULT_MARGIN,
            marker_scale: DEFAULT_MARKER_SCALE,
            sync_mode: SyncMode::Incremental,
            selection_lookup: SelectionLookup::Carried,
            initial_delay_ms: 100,
            hydroserver_url: hydroserver::MWRA_ENDPOINT.to_string(),
            site_code: "MWRA:36".to_string(),
            variable_code: "MWRA:Temp".to_string(),
            start_date: "2005-12-04".to_string(),
            end_date: "2006-07-06".to_string(),
            fetch_timeout_secs: 30,
            plot_path: PathBuf::from("forecast.png"),
            plot_title: "Carson Beach Air Temp".to_string(),
        }
    }
}

impl Config {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if !(self.margin >= 0.0 && self.margin.is_finite()) {
            return Err(anyhow!("margin must be a non-negative number of degrees, got {}", self.margin));
        }
        if !(self.marker_scale > 0.0 && self.marker_scale.is_finite()) {
            return Err(anyhow!("marker_scale must be positive, got {}", self.marker_scale));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(anyhow!("fetch_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

/// Config file location: `$STREAMWATCH_CONFIG`, else `streamwatch.json`
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load the config at `path`; a missing file means defaults
pub fn load_config(path: &Path) -> Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let config = parse_config(&content).with_context(|| format!("invalid config file {:?}", path))?;
            info!("Loaded config from {:?}", path);
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{:?} not found, using default settings", path);
            Ok(Config::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = parse_config(r#"{ "marker_scale": 700, "sync_mode": "rebuild" }"#).unwrap();
        assert_eq!(config.marker_scale, 700.0);
        assert_eq!(config.sync_mode, SyncMode::Rebuild);
        assert_eq!(config.margin, 0.5);
        assert_eq!(config.selection_lookup, SelectionLookup::Carried);
        assert_eq!(config.initial_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_selection_lookup_names() {
        let config = parse_config(r#"{ "selection_lookup": "coordinate" }"#).unwrap();
        assert_eq!(config.selection_lookup, SelectionLookup::Coordinate);
        assert!(parse_config(r#"{ "selection_lookup": "nearest" }"#).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse_config(r#"{ "margin": -1 }"#).is_err());
        assert!(parse_config(r#"{ "marker_scale": 0 }"#).is_err());
        assert!(parse_config(r#"{ "fetch_timeout_secs": 0 }"#).is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streamwatch.json");
        std::fs::write(&path, r#"{ "database": "other.db", "site_code": "MWRA:40" }"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.database, PathBuf::from("other.db"));
        assert_eq!(config.site_code, "MWRA:40");
    }
}
