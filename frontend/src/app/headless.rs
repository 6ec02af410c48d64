use crate::app::map_screen::MapView;
use crate::app::markers::{CoordKey, Marker, MarkerLayer};
use crate::app::viewport::BoundingBox;

/// In-memory marker layer that counts every operation applied to it.
///
/// Like a real widget layer it happily holds two markers at the same spot;
/// keeping that from happening is the synchronizer's job.
#[derive(Debug, Default)]
pub struct RecordingLayer {
    markers: Vec<Marker>,
    pub adds: usize,
    pub removes: usize,
    pub clears: usize,
}

impl RecordingLayer {
    /// Number of markers sharing a coordinate with an earlier marker
    pub fn duplicate_count(&self) -> usize {
        let mut keys: Vec<CoordKey> = self.markers.iter().map(|m| m.key).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        total - keys.len()
    }
}

impl MarkerLayer for RecordingLayer {
    fn add_marker(&mut self, marker: Marker) {
        self.adds += 1;
        self.markers.push(marker);
    }

    fn remove_marker(&mut self, key: &CoordKey) -> Option<Marker> {
        let idx = self.markers.iter().position(|m| m.key == *key)?;
        self.removes += 1;
        Some(self.markers.remove(idx))
    }

    fn clear(&mut self) {
        self.clears += 1;
        self.markers.clear();
    }

    fn marker(&self, key: &CoordKey) -> Option<&Marker> {
        self.markers.iter().find(|m| m.key == *key)
    }

    fn markers(&self) -> Vec<&Marker> {
        self.markers.iter().collect()
    }
}

/// A map with no window: the viewport and zoom are set directly
#[derive(Debug)]
pub struct HeadlessMap {
    bbox: BoundingBox,
    zoom: f64,
    layer: RecordingLayer,
}

impl HeadlessMap {
    pub fn new(bbox: BoundingBox, zoom: f64) -> Self {
        Self {
            bbox,
            zoom,
            layer: RecordingLayer::default(),
        }
    }

    pub fn set_bbox(&mut self, bbox: BoundingBox) {
        self.bbox = bbox;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    pub fn recording(&self) -> &RecordingLayer {
        &self.layer
    }
}

impl MapView for HeadlessMap {
    fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn layer(&self) -> &dyn MarkerLayer {
        &self.layer
    }

    fn layer_mut(&mut self) -> &mut dyn MarkerLayer {
        &mut self.layer
    }
}
