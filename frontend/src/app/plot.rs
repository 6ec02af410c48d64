use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use hydroserver::TimeSeries;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

pub const PLOT_SIZE: (u32, u32) = (700, 600);
pub const X_LABEL: &str = "Date";
pub const Y_LABEL: &str = "Temp (Celcius Degrees)";

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Axis extents for a series; x is measured in days since the first sample
#[derive(Debug, Clone, PartialEq)]
pub struct PlotFrame {
    pub origin: NaiveDateTime,
    pub x: Range<f64>,
    pub y: Range<f64>,
}

impl PlotFrame {
    pub fn for_series(series: &TimeSeries) -> Result<Self> {
        let (start, end) = series
            .time_range()
            .ok_or_else(|| anyhow!("no values to plot for {}", series.site_code))?;
        let (low, high) = series
            .value_range()
            .ok_or_else(|| anyhow!("no values to plot for {}", series.site_code))?;

        let days = (end - start).num_seconds() as f64 / SECONDS_PER_DAY;
        let x = if days > 0.0 { 0.0..days } else { -0.5..0.5 };

        let pad = ((high - low) * 0.05).max(0.5);
        Ok(Self {
            origin: start,
            x,
            y: (low - pad)..(high + pad),
        })
    }

    pub fn x_of(&self, date_time: NaiveDateTime) -> f64 {
        (date_time - self.origin).num_seconds() as f64 / SECONDS_PER_DAY
    }

    pub fn date_label(&self, x: f64) -> String {
        let offset = chrono::Duration::seconds((x * SECONDS_PER_DAY).round() as i64);
        (self.origin + offset).format("%Y-%m-%d").to_string()
    }
}

/// Draw the series as a line with point markers and write it to `path` as PNG
pub fn render_plot(series: &TimeSeries, path: &Path, title: &str) -> Result<()> {
    let frame = PlotFrame::for_series(series)?;
    let points: Vec<(f64, f64)> = series
        .points
        .iter()
        .map(|p| (frame.x_of(p.date_time), p.value))
        .collect();

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("plot: {}", e))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28).into_font())
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(frame.x.clone(), frame.y.clone())
        .map_err(|e| anyhow!("plot: {}", e))?;

    let formatter = |x: &f64| frame.date_label(*x);
    chart
        .configure_mesh()
        .x_desc(X_LABEL)
        .y_desc(Y_LABEL)
        .x_labels(6)
        .x_label_formatter(&formatter)
        .draw()
        .map_err(|e| anyhow!("plot: {}", e))?;

    chart
        .draw_series(LineSeries::new(points.iter().copied(), &BLUE))
        .map_err(|e| anyhow!("plot: {}", e))?;
    chart
        .draw_series(points.iter().map(|&p| Circle::new(p, 3, BLUE.filled())))
        .map_err(|e| anyhow!("plot: {}", e))?;

    root.present().map_err(|e| anyhow!("plot: {}", e))?;
    debug!("rendered {} points to {:?}", points.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydroserver::DataPoint;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2005, 12, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn series(points: Vec<(NaiveDateTime, f64)>) -> TimeSeries {
        TimeSeries {
            site_code: "MWRA:36".to_string(),
            variable_code: "MWRA:Temp".to_string(),
            variable_name: None,
            unit: Some("degC".to_string()),
            no_data_value: None,
            points: points
                .into_iter()
                .map(|(date_time, value)| DataPoint { date_time, value })
                .collect(),
        }
    }

    #[test]
    fn test_frame_spans_series() {
        let frame = PlotFrame::for_series(&series(vec![(at(4, 0), -2.0), (at(6, 12), 18.0)])).unwrap();
        assert_eq!(frame.x, 0.0..2.5);
        assert_eq!(frame.y, -3.0..19.0);
        assert_eq!(frame.x_of(at(5, 0)), 1.0);
        assert_eq!(frame.date_label(2.0), "2005-12-06");
    }

    #[test]
    fn test_single_point_is_padded() {
        let frame = PlotFrame::for_series(&series(vec![(at(4, 0), 3.5)])).unwrap();
        assert_eq!(frame.x, -0.5..0.5);
        assert_eq!(frame.y, 3.0..4.0);
    }

    #[test]
    fn test_empty_series_is_an_error() {
        let err = PlotFrame::for_series(&series(vec![])).unwrap_err();
        assert!(err.to_string().contains("MWRA:36"));
    }

    #[test]
    fn test_render_plot_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecast.png");
        let series = series(vec![(at(4, 0), 3.5), (at(5, 0), 2.25), (at(7, 12), 4.0)]);
        render_plot(&series, &path, "Carson Beach Air Temp").unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), PLOT_SIZE);
    }

    #[test]
    fn test_render_empty_series_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        assert!(render_plot(&series(vec![]), &path, "empty").is_err());
        assert!(!path.exists());
    }
}
