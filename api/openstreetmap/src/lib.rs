#[macro_use] extern crate log;

use anyhow::{anyhow, Result};
use futures::future::try_join_all;
use image::{DynamicImage, GenericImage};
use reqwest::Client;

/// Edge length of one OSM tile in pixels
pub const TILE_SIZE: u32 = 256;

const DEFAULT_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Normalise a `(lat1, lon1, lat2, lon2)` box into `(min_lat, min_lon, max_lat, max_lon)`
pub fn normalize_bbox(bbox: (f64, f64, f64, f64)) -> (f64, f64, f64, f64) {
    let (lat1, lon1, lat2, lon2) = bbox;
    (lat1.min(lat2), lon1.min(lon2), lat1.max(lat2), lon1.max(lon2))
}

/// A map image cropped to a bounding box, with the world-pixel position of its top-left corner
pub struct MapImage {
    pub image: DynamicImage,
    pub origin: (f64, f64),
    pub zoom: u32,
}

impl MapImage {
    /// Position of `(lat, lon)` inside this image, in pixels
    pub fn project(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (x, y) = OpenStreetMapAPI::lat_lon_to_pixel(lat, lon, self.zoom);
        (x - self.origin.0, y - self.origin.1)
    }
}

/// OpenStreetMap tile API client
pub struct OpenStreetMapAPI {
    client: Client,
    tile_url: String,
}

impl OpenStreetMapAPI {
    /// Create a client for the public OSM tile server
    pub fn new() -> Self {
        Self::with_tile_url(DEFAULT_TILE_URL)
    }

    /// Create a client for a tile server using `{z}/{x}/{y}` placeholders
    pub fn with_tile_url(tile_url: &str) -> Self {
        let client = Client::builder()
            .user_agent(concat!("streamwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            tile_url: tile_url.to_string(),
        }
    }

    /// Convert lat/lon to OSM tile number at zoom z
    pub fn lat_lon_to_tile(lat_deg: f64, lon_deg: f64, zoom: u32) -> (u32, u32) {
        let (x, y) = Self::lat_lon_to_pixel(lat_deg, lon_deg, zoom);
        let max = 2u32.pow(zoom) - 1;
        let tx = (x / TILE_SIZE as f64).floor().max(0.0) as u32;
        let ty = (y / TILE_SIZE as f64).floor().max(0.0) as u32;
        (tx.min(max), ty.min(max))
    }

    /// Convert lat/lon to world pixel coordinates at zoom z
    pub fn lat_lon_to_pixel(lat_deg: f64, lon_deg: f64, zoom: u32) -> (f64, f64) {
        let lat_rad = lat_deg.to_radians();
        let n = TILE_SIZE as f64 * 2u32.pow(zoom) as f64;
        let x = ((lon_deg + 180.0) / 360.0) * n;
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0) * n;
        (x, y)
    }

    fn tile_url(&self, z: u32, x: u32, y: u32) -> String {
        self.tile_url
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }

    /// Download a single tile as an image
    pub async fn download_tile(&self, z: u32, x: u32, y: u32) -> Result<DynamicImage> {
        let url = self.tile_url(z, x, y);
        debug!("Downloading {}", url);
        let resp = self.client.get(&url).send().await?;
        if resp.status().is_success() {
            let bytes = resp.bytes().await?;
            Ok(image::load_from_memory(&bytes)?)
        } else {
            Err(anyhow!("Failed to download tile {}: HTTP {}", url, resp.status()))
        }
    }

    /// Download all tiles covering a normalised bounding box, as rows from north to south
    pub async fn download_tiles(&self, bbox: (f64, f64, f64, f64), zoom: u32) -> Result<Vec<Vec<DynamicImage>>> {
        let (lat_min, lon_min, lat_max, lon_max) = bbox;

        let (x_start, y_start) = Self::lat_lon_to_tile(lat_max, lon_min, zoom);
        let (x_end, y_end) = Self::lat_lon_to_tile(lat_min, lon_max, zoom);

        let cols = (x_end - x_start + 1) as usize;
        let mut downloads = Vec::new();
        for y in y_start..=y_end {
            for x in x_start..=x_end {
                downloads.push(self.download_tile(zoom, x, y));
            }
        }
        info!("Downloading {} tiles at zoom {}", downloads.len(), zoom);

        let tiles_flat = try_join_all(downloads).await?;

        Ok(tiles_flat.chunks(cols).map(|row| row.to_vec()).collect())
    }

    /// Stitch tile rows into a single image
    pub fn stitch_tiles(tiles: &[Vec<DynamicImage>]) -> Result<DynamicImage> {
        let cols = tiles.first().map(|row| row.len()).unwrap_or(0);
        if cols == 0 {
            return Err(anyhow!("no tiles to stitch"));
        }
        let width = cols as u32 * TILE_SIZE;
        let height = tiles.len() as u32 * TILE_SIZE;

        let mut final_image = DynamicImage::new_rgb8(width, height);
        for (row_idx, row) in tiles.iter().enumerate() {
            for (col_idx, tile) in row.iter().enumerate() {
                final_image.copy_from(tile, col_idx as u32 * TILE_SIZE, row_idx as u32 * TILE_SIZE)?;
            }
        }
        Ok(final_image)
    }

    /// Download every tile touching `bbox` as one uncropped image
    pub async fn download_map(&self, bbox: (f64, f64, f64, f64), zoom: u32) -> Result<DynamicImage> {
        let tiles = self.download_tiles(normalize_bbox(bbox), zoom).await?;
        Self::stitch_tiles(&tiles)
    }

    /// Download a map covering `bbox`, cropped to exactly that box
    pub async fn download_cropped_map(&self, bbox: (f64, f64, f64, f64), zoom: u32) -> Result<MapImage> {
        let bbox = normalize_bbox(bbox);
        let (lat_min, lon_min, lat_max, lon_max) = bbox;

        let (left, top) = Self::lat_lon_to_pixel(lat_max, lon_min, zoom);
        let (right, bottom) = Self::lat_lon_to_pixel(lat_min, lon_max, zoom);
        let (tile_x, tile_y) = Self::lat_lon_to_tile(lat_max, lon_min, zoom);

        let offset_x = (left - tile_x as f64 * TILE_SIZE as f64).max(0.0);
        let offset_y = (top - tile_y as f64 * TILE_SIZE as f64).max(0.0);
        let width_px = (right - left).max(1.0) as u32;
        let height_px = (bottom - top).max(1.0) as u32;

        let tiles = self.download_tiles(bbox, zoom).await?;
        let stitched = Self::stitch_tiles(&tiles)?;
        let image = stitched.crop_imm(offset_x as u32, offset_y as u32, width_px, height_px);

        Ok(MapImage {
            image,
            origin: (left, top),
            zoom,
        })
    }
}

impl Default for OpenStreetMapAPI {
    fn default() -> Self {
        Self::new()
    }
}
