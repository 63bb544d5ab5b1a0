use crate::error::AppError;
use crate::events::SessionEvent;
use crate::state::SessionContext;
use crate::sync::backend;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionMode {
    Mock,
    Simulation,
    Paper,
    Real,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "MOCK",
            Self::Simulation => "SIMULATION",
            Self::Paper => "PAPER",
            Self::Real => "REAL",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mock => "MOCK",
            Self::Simulation => "SIMULATION",
            Self::Paper => "PAPER TRADING",
            Self::Real => "LIVE EXECUTION",
        }
    }

    pub fn badge_class(self) -> &'static str {
        match self {
            Self::Mock => "badge-neutral",
            Self::Simulation => "badge-info",
            Self::Paper => "badge-warning",
            Self::Real => "badge-danger",
        }
    }

    pub fn accent_class(self) -> &'static str {
        match self {
            Self::Mock => "mode-mock",
            Self::Simulation => "mode-simulation",
            Self::Paper => "mode-paper",
            Self::Real => "mode-real",
        }
    }

    /// Feed caption shown next to the mode badge. MOCK and SIMULATION
    /// have fixed captions; live-capable modes echo the backend's own
    /// data status.
    pub fn feed_label(self, data_status: &str) -> &str {
        match self {
            Self::Mock => "INTERNAL FEED",
            Self::Simulation => "HISTORICAL REPLAY",
            Self::Paper | Self::Real => data_status,
        }
    }

    /// Switching here is destructive (live orders, real money) and needs
    /// an explicit confirmation from the operator.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, Self::Real)
    }
}

#[derive(Debug, Clone)]
pub struct ModeState {
    pub current: ExecutionMode,
    pub data_status: String,
}

impl ModeState {
    pub fn initial() -> Self {
        Self {
            current: ExecutionMode::Paper,
            data_status: "feed idle".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModeSwitchWire {
    pub status: String,
    pub mode: ExecutionMode,
    #[serde(default)]
    pub previous_mode: Option<ExecutionMode>,
    pub data_status: String,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModeSwitchOutcome {
    pub mode: ExecutionMode,
    pub previous_mode: ExecutionMode,
    pub data_status: String,
    pub feed_label: String,
}

/// Clears the in-flight flag on every exit path; the machine can never
/// stay locked after a switch attempt resolves.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Guarded transition between execution modes. At most one attempt in
/// flight; a concurrent request is rejected, not queued. REAL requires
/// `confirmed`; declining never reaches the network.
pub async fn request_switch(
    ctx: &SessionContext,
    target: ExecutionMode,
    confirmed: bool,
) -> Result<ModeSwitchOutcome, AppError> {
    let _guard =
        InFlightGuard::acquire(&ctx.mode_in_flight).ok_or(AppError::SwitchInFlight)?;

    if target.requires_confirmation() && !confirmed {
        return Err(AppError::ConfirmationRequired);
    }

    let previous = ctx.mode.read().current;
    ctx.publish(SessionEvent::ModeSwitchPending(target));

    let wire = send_switch(ctx, target).await?;

    {
        let mut mode = ctx.mode.write();
        mode.current = wire.mode;
        mode.data_status = wire.data_status.clone();
    }
    let feed_label = wire.mode.feed_label(&wire.data_status).to_string();
    info!(
        from = previous.as_str(),
        to = wire.mode.as_str(),
        "execution mode switched"
    );
    ctx.publish(SessionEvent::ModeChanged {
        mode: wire.mode,
        data_status: wire.data_status.clone(),
        feed_label: feed_label.clone(),
    });
    // Converge immediately instead of waiting out the poll interval.
    ctx.resync_notify.notify_one();

    Ok(ModeSwitchOutcome {
        mode: wire.mode,
        previous_mode: wire.previous_mode.unwrap_or(previous),
        data_status: wire.data_status,
        feed_label,
    })
}

/// One bounded attempt: the whole request (connect, send, body) races
/// the configured timeout, and a fired timeout cancels the request.
async fn send_switch(
    ctx: &SessionContext,
    target: ExecutionMode,
) -> Result<ModeSwitchWire, AppError> {
    let endpoint = backend::mode_endpoint(&ctx.config.base_url);
    let body = serde_json::json!({ "mode": target });
    let timeout_ms = ctx.config.write_timeout_ms;

    let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        let response = match ctx.http.post(&endpoint).json(&body).send().await {
            Ok(response) => response,
            Err(error) => return Err(AppError::WriteConnection(error.to_string())),
        };
        if !response.status().is_success() {
            return Err(backend::rejection_from(response).await);
        }
        response
            .json::<ModeSwitchWire>()
            .await
            .map_err(|error| AppError::WriteDecode(error.to_string()))
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => Err(AppError::WriteTimeout { millis: timeout_ms }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SyncConfig, SyncOptions};
    use httpmock::prelude::*;
    use serde_json::json;

    fn context_for(server: &MockServer) -> SessionContext {
        let config: SyncConfig = SyncOptions {
            base_url: Some(server.base_url()),
            write_timeout_ms: Some(500),
            ..SyncOptions::default()
        }
        .normalize()
        .expect("test options should be valid");
        SessionContext::new(config)
    }

    fn success_body(mode: &str, data_status: &str) -> serde_json::Value {
        json!({
            "status": "success",
            "mode": mode,
            "previous_mode": "PAPER",
            "data_status": data_status,
            "user_id": "tester",
            "timestamp": "2025-01-06T12:00:00"
        })
    }

    #[test]
    fn feed_labels_follow_display_contract() {
        assert_eq!(ExecutionMode::Mock.feed_label("ignored"), "INTERNAL FEED");
        assert_eq!(
            ExecutionMode::Simulation.feed_label("ignored"),
            "HISTORICAL REPLAY"
        );
        assert_eq!(
            ExecutionMode::Paper.feed_label("Live Data Enabled (Virtual Execution)"),
            "Live Data Enabled (Virtual Execution)"
        );
        assert_eq!(
            ExecutionMode::Real.feed_label("Live Data + Live Execution ACTIVE"),
            "Live Data + Live Execution ACTIVE"
        );
    }

    #[test]
    fn every_mode_has_distinct_visual_treatment() {
        let modes = [
            ExecutionMode::Mock,
            ExecutionMode::Simulation,
            ExecutionMode::Paper,
            ExecutionMode::Real,
        ];
        for (index, mode) in modes.iter().enumerate() {
            for other in &modes[index + 1..] {
                assert_ne!(mode.badge_class(), other.badge_class());
                assert_ne!(mode.accent_class(), other.accent_class());
            }
        }
    }

    #[tokio::test]
    async fn successful_switch_updates_mode_state() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/system/mode");
                then.status(200)
                    .json_body(success_body("SIMULATION", "Simulated Feed Active"));
            })
            .await;
        let ctx = context_for(&server);

        let outcome = request_switch(&ctx, ExecutionMode::Simulation, false)
            .await
            .expect("switch should succeed");

        assert_eq!(mock.hits_async().await, 1);
        assert_eq!(outcome.mode, ExecutionMode::Simulation);
        assert_eq!(outcome.previous_mode, ExecutionMode::Paper);
        assert_eq!(outcome.feed_label, "HISTORICAL REPLAY");
        let mode = ctx.mode.read();
        assert_eq!(mode.current, ExecutionMode::Simulation);
        assert_eq!(mode.data_status, "Simulated Feed Active");
        assert!(!ctx.mode_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn second_switch_while_in_flight_is_rejected_without_network() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/system/mode");
                then.status(200)
                    .json_body(success_body("MOCK", "Internal Mock Data (Isolated)"));
            })
            .await;
        let ctx = context_for(&server);

        ctx.mode_in_flight.store(true, Ordering::Release);
        let result = request_switch(&ctx, ExecutionMode::Mock, false).await;

        assert!(matches!(result, Err(AppError::SwitchInFlight)));
        assert_eq!(mock.hits_async().await, 0);
        // The rejected attempt must not clear the genuinely-outstanding flag.
        assert!(ctx.mode_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn real_mode_without_confirmation_never_reaches_network() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/system/mode");
                then.status(200)
                    .json_body(success_body("REAL", "Live Data + Live Execution ACTIVE"));
            })
            .await;
        let ctx = context_for(&server);

        let result = request_switch(&ctx, ExecutionMode::Real, false).await;

        assert!(matches!(result, Err(AppError::ConfirmationRequired)));
        assert_eq!(mock.hits_async().await, 0);
        assert_eq!(ctx.mode.read().current, ExecutionMode::Paper);
        assert!(!ctx.mode_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn confirmed_real_switch_proceeds() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/system/mode")
                    .json_body(json!({"mode": "REAL"}));
                then.status(200)
                    .json_body(success_body("REAL", "Live Data + Live Execution ACTIVE"));
            })
            .await;
        let ctx = context_for(&server);

        let outcome = request_switch(&ctx, ExecutionMode::Real, true)
            .await
            .expect("confirmed switch should succeed");

        assert_eq!(outcome.mode, ExecutionMode::Real);
        assert_eq!(ctx.mode.read().current, ExecutionMode::Real);
    }

    #[tokio::test]
    async fn backend_rejection_surfaces_detail_and_keeps_state() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/system/mode");
                then.status(403).json_body(json!({
                    "detail": "REAL mode requires valid broker API credentials."
                }));
            })
            .await;
        let ctx = context_for(&server);

        let result = request_switch(&ctx, ExecutionMode::Real, true).await;

        match result {
            Err(AppError::WriteRejected(detail)) => {
                assert_eq!(detail, "REAL mode requires valid broker API credentials.");
            }
            other => panic!("expected a backend rejection, got {other:?}"),
        }
        assert_eq!(ctx.mode.read().current, ExecutionMode::Paper);
        assert!(!ctx.mode_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn timeout_is_classified_and_clears_in_flight() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/system/mode");
                then.status(200)
                    .json_body(success_body("MOCK", "Internal Mock Data (Isolated)"))
                    .delay(Duration::from_millis(1_500));
            })
            .await;
        let ctx = context_for(&server);

        let result = request_switch(&ctx, ExecutionMode::Mock, false).await;

        assert!(matches!(result, Err(AppError::WriteTimeout { millis: 500 })));
        assert_eq!(ctx.mode.read().current, ExecutionMode::Paper);
        assert!(!ctx.mode_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_decode_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/system/mode");
                then.status(200).json_body(json!({"status": "success"}));
            })
            .await;
        let ctx = context_for(&server);

        let result = request_switch(&ctx, ExecutionMode::Mock, false).await;

        assert!(matches!(result, Err(AppError::WriteDecode(_))));
        assert_eq!(ctx.mode.read().current, ExecutionMode::Paper);
        assert!(!ctx.mode_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn connection_failure_is_classified() {
        // Nothing is listening on this port.
        let config: SyncConfig = SyncOptions {
            base_url: Some("http://127.0.0.1:1".to_string()),
            write_timeout_ms: Some(500),
            ..SyncOptions::default()
        }
        .normalize()
        .expect("test options should be valid");
        let ctx = SessionContext::new(config);

        let result = request_switch(&ctx, ExecutionMode::Mock, false).await;

        assert!(matches!(
            result,
            Err(AppError::WriteConnection(_)) | Err(AppError::WriteTimeout { .. })
        ));
        assert!(!ctx.mode_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn switch_publishes_pending_and_changed_events() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/system/mode");
                then.status(200)
                    .json_body(success_body("MOCK", "Internal Mock Data (Isolated)"));
            })
            .await;
        let ctx = context_for(&server);
        let mut events = ctx.subscribe();

        request_switch(&ctx, ExecutionMode::Mock, false)
            .await
            .expect("switch should succeed");

        let mut saw_pending = false;
        let mut saw_changed = false;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::ModeSwitchPending(ExecutionMode::Mock) => saw_pending = true,
                SessionEvent::ModeChanged { mode, feed_label, .. } => {
                    assert_eq!(mode, ExecutionMode::Mock);
                    assert_eq!(feed_label, "INTERNAL FEED");
                    saw_changed = true;
                }
                _ => {}
            }
        }
        assert!(saw_pending);
        assert!(saw_changed);
    }
}
