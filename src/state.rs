use crate::error::AppError;
use crate::events::{SessionEvent, EVENT_CHANNEL_CAPACITY};
use crate::feed::FeedReconciler;
use crate::mode::ModeState;
use crate::sync::history::{ChartRange, PnlHistory};
use crate::sync::types::DashboardSnapshot;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8001";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 250;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;
pub const MIN_WRITE_TIMEOUT_MS: u64 = 100;
pub const MAX_WRITE_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_CHART_RANGE: ChartRange = ChartRange::D1;
pub const DEFAULT_INSTRUMENTS: [&str; 3] = ["NIFTY", "BANKNIFTY", "SENSEX"];

pub struct SyncLoopHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: tokio::task::JoinHandle<()>,
}

/// Raw, all-optional options the embedder hands over; normalized once
/// into a [`SyncConfig`].
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub instruments: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub write_timeout_ms: u64,
    pub instruments: Vec<String>,
}

impl SyncOptions {
    pub fn normalize(self) -> Result<SyncConfig, AppError> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(AppError::InvalidArgument(
                "baseUrl must start with http:// or https://".to_string(),
            ));
        }

        let poll_interval_ms = self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&poll_interval_ms) {
            return Err(AppError::InvalidArgument(format!(
                "pollIntervalMs must be between {MIN_POLL_INTERVAL_MS} and {MAX_POLL_INTERVAL_MS}"
            )));
        }

        let write_timeout_ms = self.write_timeout_ms.unwrap_or(DEFAULT_WRITE_TIMEOUT_MS);
        if !(MIN_WRITE_TIMEOUT_MS..=MAX_WRITE_TIMEOUT_MS).contains(&write_timeout_ms) {
            return Err(AppError::InvalidArgument(format!(
                "writeTimeoutMs must be between {MIN_WRITE_TIMEOUT_MS} and {MAX_WRITE_TIMEOUT_MS}"
            )));
        }

        let instruments = self.instruments.unwrap_or_else(|| {
            DEFAULT_INSTRUMENTS
                .iter()
                .map(|name| name.to_string())
                .collect()
        });
        let instruments = normalize_instruments(instruments)?;

        Ok(SyncConfig {
            base_url,
            poll_interval_ms,
            write_timeout_ms,
            instruments,
        })
    }
}

pub(crate) fn normalize_instruments(raw: Vec<String>) -> Result<Vec<String>, AppError> {
    let mut instruments = Vec::with_capacity(raw.len());
    for name in raw {
        let cleaned = name.trim().to_ascii_uppercase();
        if cleaned.is_empty() || !cleaned.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidArgument(
                "instruments must be non-empty alphanumeric ASCII".to_string(),
            ));
        }
        if !instruments.contains(&cleaned) {
            instruments.push(cleaned);
        }
    }
    Ok(instruments)
}

/// Session-scoped context: the single owner of everything the sync loop,
/// the mode machine and the reconciler share. One instance per
/// authenticated session, passed around by `Arc` — never a global.
pub struct SessionContext {
    pub started_at: Instant,
    pub config: SyncConfig,
    pub http: Client,
    pub snapshot: RwLock<DashboardSnapshot>,
    pub pnl_history: Mutex<PnlHistory>,
    pub reconciler: Mutex<FeedReconciler>,
    pub mode: RwLock<ModeState>,
    /// Mutual exclusion for the one outstanding mode-switch request.
    pub mode_in_flight: AtomicBool,
    /// Single-flight guard: a slow tick must not overlap the next one.
    pub tick_in_progress: AtomicBool,
    pub analytics_visible: AtomicBool,
    pub risk_panel_visible: AtomicBool,
    pub chart_range: RwLock<ChartRange>,
    pub monitored: RwLock<Vec<String>>,
    /// Kicks one immediate tick (mode switches resync without waiting).
    pub resync_notify: Notify,
    events: broadcast::Sender<SessionEvent>,
    pub(crate) sync_task: tokio::sync::Mutex<Option<SyncLoopHandle>>,
}

impl SessionContext {
    pub fn new(config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let monitored = config.instruments.clone();

        Self {
            started_at: Instant::now(),
            config,
            http: Client::new(),
            snapshot: RwLock::new(DashboardSnapshot::default()),
            pnl_history: Mutex::new(PnlHistory::default()),
            reconciler: Mutex::new(FeedReconciler::new()),
            mode: RwLock::new(ModeState::initial()),
            mode_in_flight: AtomicBool::new(false),
            tick_in_progress: AtomicBool::new(false),
            analytics_visible: AtomicBool::new(false),
            risk_panel_visible: AtomicBool::new(false),
            chart_range: RwLock::new(DEFAULT_CHART_RANGE),
            monitored: RwLock::new(monitored),
            resync_notify: Notify::new(),
            events,
            sync_task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Lossy by design: no subscribers means the event is dropped, and a
    /// lagging subscriber misses intermediate events, not the stream.
    pub(crate) fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub fn current_snapshot(&self) -> DashboardSnapshot {
        self.snapshot.read().clone()
    }
}
