use crate::error::AppError;
use crate::mode::{self, ExecutionMode, ModeSwitchOutcome};
use crate::state::{normalize_instruments, SessionContext, SyncConfig, SyncLoopHandle};
use crate::sync::backend;
use crate::sync::history::{downsample, ChartRange, ChartSeries};
use crate::sync::pipeline::run_sync_loop;
use crate::sync::types::RiskRules;
use chrono::Local;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    pub running: bool,
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub instruments: Vec<String>,
}

impl SyncSession {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            running: true,
            base_url: config.base_url.clone(),
            poll_interval_ms: config.poll_interval_ms,
            instruments: config.instruments.clone(),
        }
    }
}

/// Starts (or restarts) the sync loop for this session. An already
/// running loop is cancelled and awaited before the replacement spawns,
/// so there is never more than one loop per session.
pub async fn start_sync(ctx: &Arc<SessionContext>) -> SyncSession {
    let existing_handle = {
        let mut task_slot = ctx.sync_task.lock().await;
        task_slot.take()
    };
    if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
    }

    let cancellation_token = CancellationToken::new();
    let task_token = cancellation_token.clone();
    let loop_ctx = Arc::clone(ctx);
    let join_handle = tokio::spawn(async move {
        run_sync_loop(loop_ctx, task_token).await;
    });

    {
        let mut task_slot = ctx.sync_task.lock().await;
        *task_slot = Some(SyncLoopHandle {
            cancellation_token,
            join_handle,
        });
    }

    SyncSession::from_config(&ctx.config)
}

/// Stops the sync loop if one is running. Returns whether anything was
/// actually stopped.
pub async fn stop_sync(ctx: &SessionContext) -> bool {
    let existing_handle = {
        let mut task_slot = ctx.sync_task.lock().await;
        task_slot.take()
    };

    match existing_handle {
        Some(handle) => {
            handle.cancellation_token.cancel();
            let _ = handle.join_handle.await;
            true
        }
        None => false,
    }
}

/// Drops all accumulated analytics history. Nothing survives a session
/// reset; the next tick starts the buffer from scratch.
pub fn reset_session(ctx: &SessionContext) {
    ctx.pnl_history.lock().clear();
    info!("session history reset");
}

pub fn set_chart_range(ctx: &SessionContext, range: ChartRange) {
    *ctx.chart_range.write() = range;
}

pub fn set_analytics_visible(ctx: &SessionContext, visible: bool) {
    ctx.analytics_visible.store(visible, Ordering::Release);
}

pub fn set_risk_panel_visible(ctx: &SessionContext, visible: bool) {
    ctx.risk_panel_visible.store(visible, Ordering::Release);
}

/// Replaces the monitored instrument set and tells the backend to scope
/// its feed accordingly. The local list changes regardless of the POST
/// outcome; the next tick polls the new set either way.
pub async fn set_monitored_instruments(
    ctx: &SessionContext,
    instruments: Vec<String>,
) -> Result<(), AppError> {
    let cleaned = normalize_instruments(instruments)?;
    *ctx.monitored.write() = cleaned.clone();
    backend::post_monitor_instruments(
        &ctx.http,
        &ctx.config.base_url,
        &cleaned,
        ctx.config.write_timeout_ms,
    )
    .await
}

/// On-demand downsample of the P&L history for the selected range.
pub fn chart_series(ctx: &SessionContext) -> ChartSeries {
    let range = *ctx.chart_range.read();
    let history = ctx.pnl_history.lock();
    downsample(&history, range, Local::now().naive_local())
}

pub async fn request_mode_switch(
    ctx: &SessionContext,
    target: ExecutionMode,
    confirmed: bool,
) -> Result<ModeSwitchOutcome, AppError> {
    mode::request_switch(ctx, target, confirmed).await
}

pub async fn update_risk_settings(
    ctx: &SessionContext,
    rules: &RiskRules,
) -> Result<(), AppError> {
    if !rules.risk_per_trade_percent.is_finite()
        || !rules.max_daily_loss_percent.is_finite()
        || rules.risk_per_trade_percent < 0.0
        || rules.max_daily_loss_percent < 0.0
    {
        return Err(AppError::InvalidArgument(
            "risk percentages must be finite and non-negative".to_string(),
        ));
    }
    backend::post_risk_settings(
        &ctx.http,
        &ctx.config.base_url,
        rules,
        ctx.config.write_timeout_ms,
    )
    .await
}

pub async fn update_capital(ctx: &SessionContext, amount: f64) -> Result<(), AppError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::InvalidArgument(
            "capital must be a finite positive number".to_string(),
        ));
    }
    backend::post_capital(
        &ctx.http,
        &ctx.config.base_url,
        amount,
        ctx.config.write_timeout_ms,
    )
    .await
}
