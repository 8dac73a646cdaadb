pub mod errors;
pub mod models;
pub mod notify;
pub mod ordering;
pub mod reminders;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod store;
pub mod time_parsing;

use crate::errors::AppResult;
use crate::models::AppSettings;
use crate::notify::{sink_from_settings, NotificationSink};
use crate::reminders::ReminderEngine;
use crate::scheduler::{blocking_callback, IntervalTicker, Ticker};
use crate::service::TaskService;
use crate::store::TaskStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Everything a front end or the reminder loop needs, built from one data dir.
pub struct App {
    pub settings: AppSettings,
    pub store: Arc<TaskStore>,
    pub service: TaskService,
    pub engine: Arc<ReminderEngine>,
}

impl App {
    pub fn open(data_dir: &Path) -> AppResult<Self> {
        let settings = settings::load_settings(data_dir)?;
        let sink = sink_from_settings(&settings)?;
        Self::with_sink(data_dir, settings, sink)
    }

    pub fn with_sink(
        data_dir: &Path,
        settings: AppSettings,
        sink: Arc<dyn NotificationSink>,
    ) -> AppResult<Self> {
        let store = Arc::new(TaskStore::open(&settings::store_path(data_dir, &settings))?);
        Ok(Self {
            service: TaskService::new(store.clone()),
            engine: Arc::new(ReminderEngine::new(store.clone(), sink)),
            store,
            settings,
        })
    }

    /// Registers the reminder check on the ticker; checks run on the blocking pool.
    pub fn schedule_reminders(&self, ticker: &impl Ticker) {
        let engine = self.engine.clone();
        ticker.on_tick(blocking_callback(move || engine.check_reminders()));
    }
}

pub fn run() -> anyhow::Result<()> {
    let data_dir = settings::resolve_data_dir();
    std::fs::create_dir_all(&data_dir)?;
    init_tracing(&data_dir).map_err(anyhow::Error::msg)?;

    let app = App::open(&data_dir)?;
    tracing::info!(
        store = %app.store.path().to_string_lossy(),
        poll_interval_secs = app.settings.poll_interval_secs,
        "task reminder starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let ticker = IntervalTicker::new(Duration::from_secs(app.settings.poll_interval_secs));
        app.schedule_reminders(&ticker);
        let handle = ticker.start();

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown requested");
        ticker.shutdown();
        handle.await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "reminder.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
