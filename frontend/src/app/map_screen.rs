use crate::app::config::Config;
use crate::app::markers::{CoordKey, MarkerLayer, MarkerSynchronizer, SyncReport};
use crate::app::viewport::BoundingBox;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use stations::{Station, StationStore};
use std::time::Duration;

/// Label shown when a pressed marker resolves to no station
pub const NO_STATION_LABEL: &str = "No station";

/// Map widget contract: where the map is looking and where its markers live
pub trait MapView {
    fn bbox(&self) -> BoundingBox;
    fn zoom(&self) -> f64;
    fn layer(&self) -> &dyn MarkerLayer;
    fn layer_mut(&mut self) -> &mut dyn MarkerLayer;
}

/// Where candidate stations come from
pub trait StationSource {
    fn all_stations(&self) -> Result<Vec<Station>>;
    fn station_id_at(&self, lat: f64, lon: f64) -> Result<Option<String>>;
}

impl StationSource for StationStore {
    fn all_stations(&self) -> Result<Vec<Station>> {
        StationStore::all_stations(self)
    }

    fn station_id_at(&self, lat: f64, lon: f64) -> Result<Option<String>> {
        StationStore::station_id_at(self, lat, lon)
    }
}

/// How a marker press is turned back into a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionLookup {
    /// Use the station id the marker was created with
    #[default]
    Carried,
    /// Look the marker's coordinate up in the store, exact match only
    Coordinate,
}

/// Station map: owns the map handle, the store and the marker bookkeeping
pub struct MapScreen<V: MapView, S: StationSource> {
    view: V,
    stations: S,
    sync: MarkerSynchronizer,
    lookup: SelectionLookup,
    initial_delay: Duration,
    station_label: String,
    passes: usize,
}

impl<V: MapView, S: StationSource> MapScreen<V, S> {
    pub fn new(view: V, stations: S, config: &Config) -> Self {
        Self {
            view,
            stations,
            sync: MarkerSynchronizer::new(config.margin, config.marker_scale, config.sync_mode),
            lookup: config.selection_lookup,
            initial_delay: config.initial_delay(),
            station_label: String::new(),
            passes: 0,
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn synchronizer(&self) -> &MarkerSynchronizer {
        &self.sync
    }

    /// How long the first pass should wait for the map to lay itself out
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn station_label(&self) -> &str {
        &self.station_label
    }

    /// Number of synchronization passes run so far
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Reload candidates and run one synchronization pass.
    ///
    /// A store failure leaves the markers from the previous pass in place.
    pub fn refresh(&mut self) -> Result<SyncReport> {
        let candidates = self.stations.all_stations()?;
        let bbox = self.view.bbox();
        let zoom = self.view.zoom();
        let report = self.sync.sync(self.view.layer_mut(), &bbox, zoom, &candidates);
        self.passes += 1;
        Ok(report)
    }

    pub fn on_enter(&mut self) -> Result<SyncReport> {
        debug!("map screen entered");
        self.refresh()
    }

    pub fn on_bbox_change(&mut self) -> Result<SyncReport> {
        debug!("bbox changed to {:?}", self.view.bbox().as_tuple());
        self.refresh()
    }

    pub fn on_zoom(&mut self) -> Result<SyncReport> {
        debug!("zoom changed to {}", self.view.zoom());
        self.refresh()
    }

    /// Resolve a pressed marker to its station id and show it in the label.
    ///
    /// Misses are logged and shown as a placeholder, never raised.
    pub fn on_marker_press(&mut self, key: &CoordKey) -> Option<String> {
        let (lat, lon, carried) = match self.view.layer().marker(key) {
            Some(marker) => (marker.lat, marker.lon, marker.station_id.clone()),
            None => {
                warn!("press on unknown marker at ({}, {})", key.lat(), key.lon());
                self.station_label = NO_STATION_LABEL.to_string();
                return None;
            }
        };

        let station_id = match self.lookup {
            SelectionLookup::Carried => Some(carried),
            SelectionLookup::Coordinate => match self.stations.station_id_at(lat, lon) {
                Ok(id) => id,
                Err(e) => {
                    error!("station lookup at ({}, {}) failed: {}", lat, lon, e);
                    None
                }
            },
        };

        match &station_id {
            Some(id) => {
                info!("Station ID for marker at ({}, {}): {}", lat, lon, id);
                self.station_label = id.clone();
            }
            None => {
                warn!("No station ID found for the marker at ({}, {}).", lat, lon);
                self.station_label = NO_STATION_LABEL.to_string();
            }
        }
        station_id
    }
}
