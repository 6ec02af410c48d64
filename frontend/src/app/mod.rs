pub mod config;
pub mod forecast_screen;
pub mod headless;
pub mod map_screen;
pub mod markers;
pub mod plot;
pub mod replay;
pub mod snapshot;
pub mod viewport;
