use crate::app::headless::HeadlessMap;
use crate::app::map_screen::{MapScreen, StationSource};
use crate::app::config::Config;
use crate::app::markers::{CoordKey, MarkerLayer, SyncReport};
use crate::app::viewport::BoundingBox;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One user interaction with the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MapEvent {
    Enter,
    Pan { bbox: [f64; 4] },
    Zoom { zoom: f64 },
    Press { lat: f64, lon: f64 },
}

/// A recorded session: starting viewport plus the events that followed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub bbox: [f64; 4],
    pub zoom: f64,
    pub events: Vec<MapEvent>,
}

/// What happened for each replayed event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum Step {
    Synced {
        #[serde(flatten)]
        report: SyncReport,
        markers: usize,
    },
    Selected {
        station_id: Option<String>,
        label: String,
    },
    Failed {
        error: String,
    },
}

pub fn load_session(path: &Path) -> Result<Session> {
    let content = std::fs::read_to_string(path).with_context(|| format!("cannot read session {:?}", path))?;
    let session = serde_json::from_str(&content).with_context(|| format!("invalid session {:?}", path))?;
    Ok(session)
}

/// Drive `screen` through `events`; store errors are recorded and replay carries on
pub fn replay<S: StationSource>(screen: &mut MapScreen<HeadlessMap, S>, events: &[MapEvent]) -> Vec<Step> {
    let mut steps = Vec::with_capacity(events.len());
    for event in events {
        debug!("replaying {:?}", event);
        let step = match event {
            MapEvent::Enter => {
                let result = screen.on_enter();
                sync_step(screen, result)
            }
            MapEvent::Pan { bbox } => {
                screen.view_mut().set_bbox(BoundingBox::from(*bbox));
                let result = screen.on_bbox_change();
                sync_step(screen, result)
            }
            MapEvent::Zoom { zoom } => {
                screen.view_mut().set_zoom(*zoom);
                let result = screen.on_zoom();
                sync_step(screen, result)
            }
            MapEvent::Press { lat, lon } => {
                let station_id = screen.on_marker_press(&CoordKey::new(*lat, *lon));
                Step::Selected {
                    station_id,
                    label: screen.station_label().to_string(),
                }
            }
        };
        if let Step::Failed { error } = &step {
            error!("{:?} failed: {}", event, error);
        }
        steps.push(step);
    }
    steps
}

fn sync_step<S: StationSource>(screen: &MapScreen<HeadlessMap, S>, result: Result<SyncReport>) -> Step {
    match result {
        Ok(report) => Step::Synced {
            report,
            markers: screen.view().recording().len(),
        },
        Err(e) => Step::Failed { error: format!("{:#}", e) },
    }
}

/// Build a headless screen positioned at the session's starting viewport
pub fn headless_screen<S: StationSource>(session: &Session, stations: S, config: &Config) -> MapScreen<HeadlessMap, S> {
    let view = HeadlessMap::new(BoundingBox::from(session.bbox), session.zoom);
    MapScreen::new(view, stations, config)
}
