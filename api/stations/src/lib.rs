#[macro_use] extern crate log;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A water-monitoring station at the midpoint of a stream segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub station_id: String,
    pub lat: f64,
    pub lon: f64,
}

impl Station {
    pub fn new(station_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            station_id: station_id.into(),
            lat,
            lon,
        }
    }

    /// Map a `station_id, lat, lon` row, starting at column `s`
    fn from_row(row: &Row, s: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            station_id: row.get(s)?,
            lat: row.get(s + 1)?,
            lon: row.get(s + 2)?,
        })
    }
}

/// File-backed station store.
///
/// Every query opens its own connection and drops it before returning, so the
/// store itself is just a path and is cheap to clone.
#[derive(Debug, Clone)]
pub struct StationStore {
    path: PathBuf,
}

impl StationStore {
    /// Create a store for the SQLite file at `path`
    ///
    /// The file is not touched until the first query.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open station database {:?}", self.path))
    }

    /// Create the table and its coordinate index if they don't exist yet
    pub fn create_schema(&self) -> Result<()> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("failed to create station database {:?}", self.path))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS StreamMidpoints (
                station_id TEXT UNIQUE NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS StreamMidpoints_lat_lon ON StreamMidpoints (lat, lon);",
        )?;
        debug!("schema ready in {:?}", self.path);
        Ok(())
    }

    pub fn insert(&self, station: &Station) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO StreamMidpoints (station_id, lat, lon) VALUES (?1, ?2, ?3)",
            params![station.station_id, station.lat, station.lon],
        )
        .with_context(|| format!("failed to insert station {}", station.station_id))?;
        Ok(())
    }

    /// Insert many stations inside a single transaction
    pub fn insert_all(&self, stations: &[Station]) -> Result<usize> {
        let mut conn = self.connect()?;
        let trans = conn.transaction()?;
        {
            let mut stmt = trans.prepare(
                "INSERT INTO StreamMidpoints (station_id, lat, lon) VALUES (?1, ?2, ?3)",
            )?;
            for station in stations {
                stmt.execute(params![station.station_id, station.lat, station.lon])?;
            }
        }
        trans.commit()?;
        info!("inserted {} stations into {:?}", stations.len(), self.path);
        Ok(stations.len())
    }

    /// Full scan of the candidate list, in table order
    pub fn all_stations(&self) -> Result<Vec<Station>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT station_id, lat, lon FROM StreamMidpoints")?;
        let rows = stmt.query_map([], |row| Station::from_row(row, 0))?;
        let mut ret = vec![];
        for row in rows {
            ret.push(row?);
        }
        debug!("loaded {} stations from {:?}", ret.len(), self.path);
        Ok(ret)
    }

    /// Stations whose coordinates fall inside the given inclusive ranges
    pub fn stations_within(
        &self,
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    ) -> Result<Vec<Station>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT station_id, lat, lon FROM StreamMidpoints
             WHERE lat BETWEEN ?1 AND ?3 AND lon BETWEEN ?2 AND ?4",
        )?;
        let rows = stmt.query_map(params![min_lat, min_lon, max_lat, max_lon], |row| {
            Station::from_row(row, 0)
        })?;
        let mut ret = vec![];
        for row in rows {
            ret.push(row?);
        }
        Ok(ret)
    }

    /// Exact-match lookup of the station sitting at `(lat, lon)`.
    ///
    /// Coordinates are compared bit-for-bit by SQLite, so a value that went
    /// through a lossy string conversion will not match.
    pub fn station_id_at(&self, lat: f64, lon: f64) -> Result<Option<String>> {
        let conn = self.connect()?;
        let id = conn
            .query_row(
                "SELECT station_id FROM StreamMidpoints WHERE lat = ?1 AND lon = ?2",
                params![lat, lon],
                |row| row.get(0),
            )
            .optional()?;
        if id.is_none() {
            debug!("no station at ({}, {})", lat, lon);
        }
        Ok(id)
    }

    pub fn station(&self, station_id: &str) -> Result<Option<Station>> {
        let conn = self.connect()?;
        let station = conn
            .query_row(
                "SELECT station_id, lat, lon FROM StreamMidpoints WHERE station_id = ?1",
                params![station_id],
                |row| Station::from_row(row, 0),
            )
            .optional()?;
        Ok(station)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM StreamMidpoints", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded_store() -> (TempDir, StationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StationStore::open(dir.path().join("stations.db"));
        store.create_schema().unwrap();
        store
            .insert_all(&[
                Station::new("MWRA:36", 42.35, -71.05),
                Station::new("MWRA:37", 42.6, -70.4),
                Station::new("MWRA:38", 43.1, -70.4),
            ])
            .unwrap();
        (dir, store)
    }

    #[test]
    fn test_all_stations_in_table_order() {
        let (_dir, store) = seeded_store();
        let stations = store.all_stations().unwrap();
        assert_eq!(stations.len(), 3);
        assert_eq!(stations[0], Station::new("MWRA:36", 42.35, -71.05));
        assert_eq!(stations[2].station_id, "MWRA:38");
    }

    #[test]
    fn test_exact_match_lookup() {
        let (_dir, store) = seeded_store();
        assert_eq!(store.station_id_at(42.35, -71.05).unwrap(), Some("MWRA:36".to_string()));
        assert_eq!(store.station_id_at(42.3501, -71.05).unwrap(), None);
    }

    #[test]
    fn test_station_by_id() {
        let (_dir, store) = seeded_store();
        let station = store.station("MWRA:37").unwrap().unwrap();
        assert_eq!(station.lat, 42.6);
        assert!(store.station("nope").unwrap().is_none());
    }

    #[test]
    fn test_stations_within_is_inclusive() {
        let (_dir, store) = seeded_store();
        let found = store.stations_within(42.35, -71.05, 42.6, -70.4).unwrap();
        let ids: Vec<_> = found.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(ids, vec!["MWRA:36", "MWRA:37"]);
    }

    #[test]
    fn test_duplicate_station_id_rejected() {
        let (_dir, store) = seeded_store();
        assert!(store.insert(&Station::new("MWRA:36", 1.0, 1.0)).is_err());
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_missing_database_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StationStore::open(dir.path().join("absent.db"));
        assert!(store.all_stations().is_err());
        assert!(!store.path().exists());
    }
}
