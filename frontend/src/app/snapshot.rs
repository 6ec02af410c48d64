use crate::app::map_screen::MapView;
use crate::app::markers::Marker;
use anyhow::Result;
use image::{Rgba, RgbaImage};
use openstreetmap::{MapImage, OpenStreetMapAPI};
use std::path::Path;

pub const MARKER_COLOR: Rgba<u8> = Rgba([214, 39, 40, 255]);
const MAX_TILE_ZOOM: u32 = 18;

/// Tile zoom level closest to a widget zoom factor
pub fn tile_zoom(zoom: f64) -> u32 {
    if !zoom.is_finite() {
        return 1;
    }
    (zoom.round().max(1.0) as u32).min(MAX_TILE_ZOOM)
}

/// Fill a `size`-pixel square centred on `(cx, cy)`, clipped to the image.
///
/// Returns the number of pixels painted.
pub fn draw_marker(img: &mut RgbaImage, cx: f64, cy: f64, size: f64, color: Rgba<u8>) -> usize {
    let half = size.max(1.0) / 2.0;
    let x0 = (cx - half).round().max(0.0);
    let y0 = (cy - half).round().max(0.0);
    let x1 = (cx + half).round().min(img.width() as f64);
    let y1 = (cy + half).round().min(img.height() as f64);
    if x0 >= x1 || y0 >= y1 {
        return 0;
    }

    let mut painted = 0;
    for y in y0 as u32..y1 as u32 {
        for x in x0 as u32..x1 as u32 {
            img.put_pixel(x, y, color);
            painted += 1;
        }
    }
    painted
}

/// Copy of the map image with every marker drawn on top
pub fn render_markers(map: &MapImage, markers: &[&Marker]) -> RgbaImage {
    let mut img = map.image.to_rgba8();
    for marker in markers {
        let (x, y) = map.project(marker.lat, marker.lon);
        if draw_marker(&mut img, x, y, marker.size, MARKER_COLOR) == 0 {
            debug!("marker {} falls outside the snapshot", marker.station_id);
        }
    }
    img
}

/// Save what the map currently shows: tiles for its bbox plus its markers
pub async fn save_snapshot<V: MapView>(api: &OpenStreetMapAPI, view: &V, path: &Path) -> Result<()> {
    let zoom = tile_zoom(view.zoom());
    let map = api.download_cropped_map(view.bbox().as_tuple(), zoom).await?;
    let markers = view.layer().markers();
    let img = render_markers(&map, &markers);
    img.save(path)?;
    info!("Snapshot with {} markers saved to {:?}", markers.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::markers::CoordKey;
    use image::DynamicImage;

    #[test]
    fn test_tile_zoom_is_clamped() {
        assert_eq!(tile_zoom(0.2), 1);
        assert_eq!(tile_zoom(10.4), 10);
        assert_eq!(tile_zoom(25.0), MAX_TILE_ZOOM);
        assert_eq!(tile_zoom(f64::NAN), 1);
    }

    #[test]
    fn test_marker_inside_image() {
        let mut img = RgbaImage::new(100, 100);
        assert_eq!(draw_marker(&mut img, 50.0, 50.0, 10.0, MARKER_COLOR), 100);
        assert_eq!(*img.get_pixel(50, 50), MARKER_COLOR);
        assert_eq!(*img.get_pixel(30, 30), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_marker_clipped_at_edge() {
        let mut img = RgbaImage::new(100, 100);
        assert_eq!(draw_marker(&mut img, 0.0, 0.0, 10.0, MARKER_COLOR), 25);
        assert_eq!(draw_marker(&mut img, -50.0, 20.0, 10.0, MARKER_COLOR), 0);
    }

    #[test]
    fn test_render_projects_markers() {
        let origin = OpenStreetMapAPI::lat_lon_to_pixel(42.5, -71.0, 10);
        let map = MapImage {
            image: DynamicImage::new_rgb8(200, 200),
            origin,
            zoom: 10,
        };
        let marker = Marker {
            key: CoordKey::new(42.45, -70.95),
            lat: 42.45,
            lon: -70.95,
            station_id: "MWRA:36".to_string(),
            size: 4.0,
        };
        let img = render_markers(&map, &[&marker]);
        let (x, y) = map.project(42.45, -70.95);
        assert_eq!(*img.get_pixel(x as u32, y as u32), MARKER_COLOR);
    }
}
