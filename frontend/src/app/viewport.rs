use serde::{Deserialize, Serialize};

/// Padding in degrees added around the visible map so nearby markers are ready before a pan reveals them
pub const DEFAULT_MARGIN: f64 = 0.5;

/// Numerator of the marker size formula `scale / zoom`
pub const DEFAULT_MARKER_SCALE: f64 = 500.0;

/// Visible geographic area of the map, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Build a box from two corners given in any order
    pub fn new(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Self {
        Self {
            min_lat: lat1.min(lat2),
            min_lon: lon1.min(lon2),
            max_lat: lat1.max(lat2),
            max_lon: lon1.max(lon2),
        }
    }

    /// This box grown by `margin` degrees on every side
    pub fn padded(&self, margin: f64) -> Self {
        Self {
            min_lat: self.min_lat - margin,
            min_lon: self.min_lon - margin,
            max_lat: self.max_lat + margin,
            max_lon: self.max_lon + margin,
        }
    }

    /// Inclusive on every edge
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.min_lat <= lat && lat <= self.max_lat && self.min_lon <= lon && lon <= self.max_lon
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_lat + self.max_lat) / 2.0, (self.min_lon + self.max_lon) / 2.0)
    }

    /// Same box moved by the given offsets
    pub fn shifted(&self, d_lat: f64, d_lon: f64) -> Self {
        Self {
            min_lat: self.min_lat + d_lat,
            min_lon: self.min_lon + d_lon,
            max_lat: self.max_lat + d_lat,
            max_lon: self.max_lon + d_lon,
        }
    }

    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.min_lat, self.min_lon, self.max_lat, self.max_lon)
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        BoundingBox::new(v[0], v[1], v[2], v[3])
    }
}

/// Whether `(lat, lon)` is inside `bbox` once padded by `margin`
pub fn in_view(bbox: &BoundingBox, margin: f64, lat: f64, lon: f64) -> bool {
    bbox.padded(margin).contains(lat, lon)
}

/// Edge length of a marker at the given zoom; zoom levels below 1 count as 1
pub fn marker_size(scale: f64, zoom: f64) -> f64 {
    scale / zoom.max(1.0)
}
