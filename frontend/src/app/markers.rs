//! Keeps the markers shown on the map consistent with the viewport.
//!
//! After every pass the set of materialized coordinates equals exactly the
//! candidates inside the viewport padded by the margin. Coordinates are keyed
//! by their bit patterns, so two stations at bit-identical positions share one
//! marker.

use crate::app::viewport::{in_view, marker_size, BoundingBox};
use serde::{Deserialize, Serialize};
use stations::Station;
use std::collections::HashSet;

/// Hashable identity of a coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordKey {
    lat_bits: u64,
    lon_bits: u64,
}

impl CoordKey {
    pub fn new(lat: f64, lon: f64) -> Self {
        // fold -0.0 into 0.0 so both spellings of the equator share a key
        let norm = |v: f64| if v == 0.0 { 0.0f64 } else { v };
        Self {
            lat_bits: norm(lat).to_bits(),
            lon_bits: norm(lon).to_bits(),
        }
    }

    pub fn lat(&self) -> f64 {
        f64::from_bits(self.lat_bits)
    }

    pub fn lon(&self) -> f64 {
        f64::from_bits(self.lon_bits)
    }
}

/// A station as drawn on the map
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub key: CoordKey,
    pub lat: f64,
    pub lon: f64,
    pub station_id: String,
    /// Edge length; markers are square
    pub size: f64,
}

impl Marker {
    fn for_station(key: CoordKey, station: &Station, size: f64) -> Self {
        Self {
            key,
            lat: station.lat,
            lon: station.lon,
            station_id: station.station_id.clone(),
            size,
        }
    }
}

/// Display-side marker container.
///
/// Press events are reported by the display back to the map screen with the
/// marker's key; the layer only needs to be able to hand the marker back.
pub trait MarkerLayer {
    fn add_marker(&mut self, marker: Marker);
    fn remove_marker(&mut self, key: &CoordKey) -> Option<Marker>;
    fn clear(&mut self);
    fn marker(&self, key: &CoordKey) -> Option<&Marker>;
    fn markers(&self) -> Vec<&Marker>;

    fn len(&self) -> usize {
        self.markers().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a pass reconciles the layer with the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Add entering markers, remove leaving ones, keep the rest
    #[default]
    Incremental,
    /// Clear the layer and recreate every visible marker
    Rebuild,
}

/// What one pass did to the layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    pub retained: usize,
}

impl SyncReport {
    /// True when the pass neither created nor destroyed a marker
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }

    pub fn visible(&self) -> usize {
        self.added + self.retained
    }
}

pub struct MarkerSynchronizer {
    margin: f64,
    marker_scale: f64,
    mode: SyncMode,
    materialized: HashSet<CoordKey>,
}

impl MarkerSynchronizer {
    pub fn new(margin: f64, marker_scale: f64, mode: SyncMode) -> Self {
        Self {
            margin,
            marker_scale,
            mode,
            materialized: HashSet::new(),
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn materialized(&self) -> &HashSet<CoordKey> {
        &self.materialized
    }

    /// Candidates inside the padded viewport, first occurrence of each coordinate only
    pub fn visible_candidates<'a>(
        &self,
        bbox: &BoundingBox,
        candidates: &'a [Station],
    ) -> Vec<(CoordKey, &'a Station)> {
        let mut seen = HashSet::new();
        candidates
            .iter()
            .filter(|s| in_view(bbox, self.margin, s.lat, s.lon))
            .map(|s| (CoordKey::new(s.lat, s.lon), s))
            .filter(|(key, _)| seen.insert(*key))
            .collect()
    }

    /// Reconcile `layer` with the stations visible in `bbox` at `zoom`
    pub fn sync<L: MarkerLayer + ?Sized>(
        &mut self,
        layer: &mut L,
        bbox: &BoundingBox,
        zoom: f64,
        candidates: &[Station],
    ) -> SyncReport {
        let visible = self.visible_candidates(bbox, candidates);
        let size = marker_size(self.marker_scale, zoom);

        let report = match self.mode {
            SyncMode::Incremental => self.sync_incremental(layer, &visible, size),
            SyncMode::Rebuild => self.rebuild(layer, &visible, size),
        };

        info!(
            "Synced markers for {:?} at zoom {}: +{} -{} ={} (size {:.1})",
            bbox.as_tuple(),
            zoom,
            report.added,
            report.removed,
            report.retained,
            size
        );
        report
    }

    fn sync_incremental<L: MarkerLayer + ?Sized>(
        &mut self,
        layer: &mut L,
        visible: &[(CoordKey, &Station)],
        size: f64,
    ) -> SyncReport {
        let visible_keys: HashSet<CoordKey> = visible.iter().map(|(key, _)| *key).collect();

        let mut stale: Vec<CoordKey> = self
            .materialized
            .iter()
            .filter(|key| !visible_keys.contains(*key))
            .copied()
            .collect();
        stale.sort();
        for key in &stale {
            if layer.remove_marker(key).is_none() {
                warn!("marker at ({}, {}) was already gone from the layer", key.lat(), key.lon());
            }
            self.materialized.remove(key);
            debug!("removed marker at ({}, {})", key.lat(), key.lon());
        }

        let mut added = 0;
        for (key, station) in visible {
            if self.materialized.insert(*key) {
                layer.add_marker(Marker::for_station(*key, station, size));
                added += 1;
                debug!("added marker for {} at ({}, {})", station.station_id, station.lat, station.lon);
            }
        }

        SyncReport {
            added,
            removed: stale.len(),
            retained: visible.len() - added,
        }
    }

    fn rebuild<L: MarkerLayer + ?Sized>(
        &mut self,
        layer: &mut L,
        visible: &[(CoordKey, &Station)],
        size: f64,
    ) -> SyncReport {
        let removed = self.materialized.len();
        layer.clear();
        self.materialized.clear();

        for (key, station) in visible {
            self.materialized.insert(*key);
            layer.add_marker(Marker::for_station(*key, station, size));
        }

        SyncReport {
            added: visible.len(),
            removed,
            retained: 0,
        }
    }

    /// Remove every marker this synchronizer created
    pub fn reset<L: MarkerLayer + ?Sized>(&mut self, layer: &mut L) {
        for key in self.materialized.drain() {
            layer.remove_marker(&key);
        }
    }
}
