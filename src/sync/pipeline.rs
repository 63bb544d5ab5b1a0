use crate::events::SessionEvent;
use crate::feed::QuoteOutcome;
use crate::state::SessionContext;
use crate::sync::backend;
use crate::sync::history::downsample;
use crate::sync::types::SystemHealth;
use chrono::Local;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timer-driven reconciliation against the backend. Runs until the
/// session cancels it; individual failures never stop the loop, the
/// next tick retries unconditionally. A mode switch can force an
/// immediate tick through the session's resync notifier.
pub async fn run_sync_loop(ctx: Arc<SessionContext>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_millis(ctx.config.poll_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        interval_ms = ctx.config.poll_interval_ms,
        "sync loop started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => run_tick(&ctx).await,
            _ = ctx.resync_notify.notified() => run_tick(&ctx).await,
        }
    }

    info!("sync loop stopped");
}

/// One tick: pull every read endpoint, merge whatever succeeded, leave
/// the rest of the snapshot untouched. Ticks are single-flight — if the
/// previous one is still running, this one is skipped, not queued.
pub async fn run_tick(ctx: &SessionContext) {
    if ctx
        .tick_in_progress
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        debug!("previous tick still in progress, skipping");
        return;
    }

    let client = &ctx.http;
    let base_url = ctx.config.base_url.as_str();
    let include_risk_rules = ctx.risk_panel_visible.load(Ordering::Relaxed);

    let (metrics, trades, logs, balance, agent_status, audit_trail) = tokio::join!(
        backend::fetch_metrics(client, base_url),
        backend::fetch_open_trades(client, base_url),
        backend::fetch_alert_logs(client, base_url),
        backend::fetch_balance(client, base_url),
        backend::fetch_agent_status(client, base_url),
        backend::fetch_audit_trail(client, base_url),
    );
    let risk_rules = if include_risk_rules {
        Some(backend::fetch_risk_rules(client, base_url).await)
    } else {
        None
    };

    let balance_value = match balance {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(%error, "balance fetch failed");
            None
        }
    };

    let now = Local::now().naive_local();
    let mut applied_pnl = None;
    let mut degraded = false;
    {
        let mut snapshot = ctx.snapshot.write();
        match metrics {
            Ok(frame) => {
                applied_pnl = Some(frame.daily_pnl);
                degraded = frame.system_health == SystemHealth::Degraded;
                snapshot.metrics = Some(frame);
            }
            Err(error) => warn!(%error, "metrics fetch failed"),
        }
        match trades {
            Ok(records) => snapshot.trades = records,
            Err(error) => warn!(%error, "open trades fetch failed"),
        }
        match logs {
            Ok(entries) => snapshot.logs = entries,
            Err(error) => warn!(%error, "alert logs fetch failed"),
        }
        if let Some(value) = balance_value {
            snapshot.balance = Some(value);
        }
        match agent_status {
            Ok(statuses) => snapshot.agent_status = statuses,
            Err(error) => warn!(%error, "agent status fetch failed"),
        }
        match audit_trail {
            Ok(events) => snapshot.audit_trail = events,
            Err(error) => warn!(%error, "audit trail fetch failed"),
        }
        if let Some(result) = risk_rules {
            match result {
                Ok(rules) => snapshot.risk_rules = Some(rules),
                Err(error) => warn!(%error, "risk rules fetch failed"),
            }
        }
    }

    // The history point rides the metrics apply: at most one per tick,
    // and none when the metrics fetch failed.
    if let Some(pnl) = applied_pnl {
        ctx.pnl_history.lock().push(pnl, now);
    }

    ctx.publish(SessionEvent::SnapshotUpdated);
    if let Some(value) = balance_value {
        ctx.publish(SessionEvent::BalanceUpdated(value));
    }
    if degraded {
        ctx.publish(SessionEvent::HealthWarning {
            message: "backend reports DEGRADED health".to_string(),
        });
    }

    if ctx.analytics_visible.load(Ordering::Relaxed) {
        let range = *ctx.chart_range.read();
        let series = {
            let history = ctx.pnl_history.lock();
            downsample(&history, range, now)
        };
        ctx.publish(SessionEvent::ChartUpdated(series));
    }

    let instruments = ctx.monitored.read().clone();
    for instrument in instruments {
        match backend::fetch_quote(client, base_url, &instrument).await {
            Ok(wire) => {
                let outcome = ctx.reconciler.lock().reconcile(&instrument, &wire);
                match outcome {
                    QuoteOutcome::Update(view) => ctx.publish(SessionEvent::QuoteUpdated(view)),
                    QuoteOutcome::Closed { instrument, .. } => {
                        ctx.publish(SessionEvent::MarketClosed { instrument })
                    }
                    QuoteOutcome::Unavailable { instrument, reason } => {
                        warn!(%instrument, %reason, "market data unavailable");
                        ctx.publish(SessionEvent::HealthWarning {
                            message: format!("{instrument}: {reason}"),
                        });
                    }
                }
            }
            Err(error) => warn!(%instrument, %error, "quote fetch failed"),
        }
    }

    ctx.tick_in_progress.store(false, Ordering::Release);
}
