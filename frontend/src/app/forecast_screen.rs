use crate::app::config::Config;
use crate::app::plot;
use anyhow::Result;
use futures::future::BoxFuture;
use hydroserver::{spawn_cancellable, FetchHandle, FetchOutcome, HydroServerAPI, TimeSeries, ValuesQuery};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tokio::runtime::Handle;

/// Anything that can produce a time series for a query
pub trait ValuesSource: Send + Sync + 'static {
    fn fetch_values(&self, query: ValuesQuery) -> BoxFuture<'static, Result<TimeSeries>>;
}

impl ValuesSource for HydroServerAPI {
    fn fetch_values(&self, query: ValuesQuery) -> BoxFuture<'static, Result<TimeSeries>> {
        let api = self.clone();
        Box::pin(async move { api.get_values(&query).await })
    }
}

/// Result of a background fetch, delivered to the screen's event loop
#[derive(Debug)]
pub enum ForecastMessage {
    Loaded(TimeSeries),
    Failed(String),
    Cancelled,
}

impl From<FetchOutcome<TimeSeries>> for ForecastMessage {
    fn from(outcome: FetchOutcome<TimeSeries>) -> Self {
        match outcome {
            FetchOutcome::Completed(series) => ForecastMessage::Loaded(series),
            FetchOutcome::Failed(e) => ForecastMessage::Failed(format!("{:#}", e)),
            FetchOutcome::TimedOut(t) => ForecastMessage::Failed(format!("request timed out after {:?}", t)),
            FetchOutcome::Cancelled => ForecastMessage::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForecastState {
    Idle,
    Loading,
    Ready,
    Error(String),
}

/// Where and how to draw the loaded series
#[derive(Debug, Clone)]
pub struct PlotSettings {
    pub path: PathBuf,
    pub title: String,
}

/// Temperature plot for one site; fetching never blocks the caller
pub struct ForecastScreen<S: ValuesSource> {
    source: std::sync::Arc<S>,
    query: ValuesQuery,
    timeout: Duration,
    runtime: Handle,
    /// Receives from the current visit's fetch only
    rx: Receiver<ForecastMessage>,
    pending: Option<FetchHandle>,
    series: Option<TimeSeries>,
    state: ForecastState,
    plot: Option<PlotSettings>,
}

impl<S: ValuesSource> ForecastScreen<S> {
    pub fn new(source: S, query: ValuesQuery, timeout: Duration, runtime: Handle) -> Self {
        let (_, rx) = mpsc::channel();
        Self {
            source: std::sync::Arc::new(source),
            query,
            timeout,
            runtime,
            rx,
            pending: None,
            series: None,
            state: ForecastState::Idle,
            plot: None,
        }
    }

    pub fn with_plot(mut self, settings: PlotSettings) -> Self {
        self.plot = Some(settings);
        self
    }

    pub fn state(&self) -> &ForecastState {
        &self.state
    }

    pub fn series(&self) -> Option<&TimeSeries> {
        self.series.as_ref()
    }

    /// Start loading the series; any earlier fetch is cancelled first.
    ///
    /// Each visit gets its own channel, so results of an earlier visit that
    /// were never polled are discarded with the old receiver.
    pub fn on_pre_enter(&mut self) {
        self.on_leave();

        let (tx, rx) = mpsc::channel();
        self.rx = rx;
        let source = self.source.clone();
        let query = self.query.clone();
        info!("Loading {} at {}", query.variable_code, query.site_code);

        let handle = spawn_cancellable(
            &self.runtime,
            async move { source.fetch_values(query).await },
            self.timeout,
            move |outcome| {
                // the screen may already be gone
                let _ = tx.send(ForecastMessage::from(outcome));
            },
        );
        self.pending = Some(handle);
        self.state = ForecastState::Loading;
    }

    /// Cancel the fetch tied to this visit of the screen
    pub fn on_leave(&mut self) {
        if let Some(mut handle) = self.pending.take() {
            if !handle.is_finished() {
                debug!("cancelling pending forecast fetch");
            }
            handle.cancel();
        }
    }

    fn handle_message(&mut self, message: ForecastMessage) {
        match message {
            ForecastMessage::Loaded(series) => {
                info!("Loaded {} values for {}", series.points.len(), series.site_code);
                self.pending = None;
                self.state = ForecastState::Ready;
                self.display_plot(&series);
                self.series = Some(series);
            }
            ForecastMessage::Failed(reason) => {
                error!("Failed to load forecast data: {}", reason);
                self.pending = None;
                self.state = ForecastState::Error(reason);
            }
            ForecastMessage::Cancelled => {
                debug!("forecast fetch cancelled");
                if self.pending.is_none() && self.state == ForecastState::Loading {
                    self.state = ForecastState::Idle;
                }
            }
        }
    }

    fn display_plot(&mut self, series: &TimeSeries) {
        let settings = match &self.plot {
            Some(settings) => settings.clone(),
            None => return,
        };
        match plot::render_plot(series, &settings.path, &settings.title) {
            Ok(()) => info!("Plot saved to {:?}", settings.path),
            Err(e) => {
                error!("Failed to render plot: {:#}", e);
                self.state = ForecastState::Error(format!("{:#}", e));
            }
        }
    }

    /// Apply every message that has arrived, without blocking
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Block until the current fetch reports or `timeout` elapses
    pub fn wait(&mut self, timeout: Duration) -> &ForecastState {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => self.handle_message(message),
            Err(RecvTimeoutError::Timeout) => warn!("no forecast result after {:?}", timeout),
            Err(RecvTimeoutError::Disconnected) => {}
        }
        &self.state
    }
}

impl ForecastScreen<HydroServerAPI> {
    /// Screen wired to the configured HydroServer
    pub fn from_config(config: &Config, runtime: Handle) -> Result<Self> {
        let api = HydroServerAPI::new(&config.hydroserver_url)?;
        let query = ValuesQuery::from_strings(
            &config.site_code,
            &config.variable_code,
            &config.start_date,
            &config.end_date,
        )?;
        Ok(Self::new(api, query, config.fetch_timeout(), runtime).with_plot(PlotSettings {
            path: config.plot_path.clone(),
            title: config.plot_title.clone(),
        }))
    }
}

impl<S: ValuesSource> Drop for ForecastScreen<S> {
    fn drop(&mut self) {
        self.on_leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hydroserver::DataPoint;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Series,
        Fail,
        FailThenSlow,
        Hang,
    }

    struct StubSource {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    fn one_point(query: ValuesQuery) -> TimeSeries {
        TimeSeries {
            site_code: query.site_code,
            variable_code: query.variable_code,
            variable_name: None,
            unit: None,
            no_data_value: None,
            points: vec![DataPoint {
                date_time: query.start_date.and_hms_opt(0, 0, 0).unwrap(),
                value: 3.5,
            }],
        }
    }

    impl ValuesSource for StubSource {
        fn fetch_values(&self, query: ValuesQuery) -> BoxFuture<'static, Result<TimeSeries>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Series => Box::pin(async move { Ok(one_point(query)) }),
                Behaviour::Fail => Box::pin(async { Err(anyhow::anyhow!("connection refused")) }),
                Behaviour::FailThenSlow if call == 0 => {
                    Box::pin(async { Err(anyhow::anyhow!("first visit failed")) })
                }
                Behaviour::FailThenSlow => Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(one_point(query))
                }),
                Behaviour::Hang => Box::pin(async {
                    std::future::pending::<()>().await;
                    unreachable!()
                }),
            }
        }
    }

    fn query() -> ValuesQuery {
        ValuesQuery::new(
            "MWRA:36",
            "MWRA:Temp",
            NaiveDate::from_ymd_opt(2005, 12, 4).unwrap(),
            NaiveDate::from_ymd_opt(2006, 7, 6).unwrap(),
        )
        .unwrap()
    }

    fn screen(runtime: &tokio::runtime::Runtime, behaviour: Behaviour, timeout: Duration) -> ForecastScreen<StubSource> {
        let source = StubSource {
            behaviour,
            calls: AtomicUsize::new(0),
        };
        ForecastScreen::new(source, query(), timeout, runtime.handle().clone())
    }

    #[test]
    fn test_loaded_series_is_delivered() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut screen = screen(&rt, Behaviour::Series, Duration::from_secs(5));
        screen.on_pre_enter();
        assert_eq!(screen.state(), &ForecastState::Loading);
        assert_eq!(screen.wait(Duration::from_secs(5)), &ForecastState::Ready);
        assert_eq!(screen.series().unwrap().values(), vec![3.5]);
    }

    #[test]
    fn test_failure_is_reported_not_fatal() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut screen = screen(&rt, Behaviour::Fail, Duration::from_secs(5));
        screen.on_pre_enter();
        match screen.wait(Duration::from_secs(5)) {
            ForecastState::Error(reason) => assert!(reason.contains("connection refused")),
            other => panic!("unexpected state: {:?}", other),
        }
        assert!(screen.series().is_none());
    }

    #[test]
    fn test_timeout_is_reported() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut screen = screen(&rt, Behaviour::Hang, Duration::from_millis(20));
        screen.on_pre_enter();
        match screen.wait(Duration::from_secs(5)) {
            ForecastState::Error(reason) => assert!(reason.contains("timed out")),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_leaving_cancels_the_fetch() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut screen = screen(&rt, Behaviour::Hang, Duration::from_secs(30));
        screen.on_pre_enter();
        screen.on_leave();
        assert_eq!(screen.wait(Duration::from_secs(5)), &ForecastState::Idle);
    }

    #[test]
    fn test_poll_without_messages_does_nothing() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut screen = screen(&rt, Behaviour::Hang, Duration::from_secs(30));
        assert_eq!(screen.poll(), 0);
        assert_eq!(screen.state(), &ForecastState::Idle);
    }

    #[test]
    fn test_reentry_ignores_unpolled_result_of_earlier_visit() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut screen = screen(&rt, Behaviour::FailThenSlow, Duration::from_secs(5));
        screen.on_pre_enter();
        // the first fetch fails and reports before anyone polls
        std::thread::sleep(Duration::from_millis(50));
        screen.on_pre_enter();

        assert_eq!(screen.wait(Duration::from_secs(5)), &ForecastState::Ready);
        assert_eq!(screen.series().unwrap().values(), vec![3.5]);
        assert_eq!(screen.poll(), 0);
        assert_eq!(screen.state(), &ForecastState::Ready);
    }

    #[test]
    fn test_loaded_series_is_plotted() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecast.png");
        let mut screen = screen(&rt, Behaviour::Series, Duration::from_secs(5)).with_plot(PlotSettings {
            path: path.clone(),
            title: "Carson Beach Air Temp".to_string(),
        });
        screen.on_pre_enter();
        assert_eq!(screen.wait(Duration::from_secs(5)), &ForecastState::Ready);
        assert!(path.exists());
    }
}
