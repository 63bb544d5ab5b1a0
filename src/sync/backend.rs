use crate::error::AppError;
use crate::feed::QuoteWire;
use crate::sync::types::{
    AgentState, AuditEvent, BalanceWire, LogEntry, MetricsFrame, MetricsWire, RejectionWire,
    RiskRules, TradeRecord, TradeWire,
};
use reqwest::Client;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

fn metrics_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/dashboard/metrics")
}

fn open_trades_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/trades/open")
}

fn alert_logs_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/alerts/logs")
}

fn balance_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/account/balance")
}

fn agent_status_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/agents/status")
}

fn audit_trail_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/agents/audit")
}

fn risk_rules_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/risk/rules")
}

fn quote_endpoint(base_url: &str, instrument: &str) -> String {
    format!(
        "{base_url}/api/v1/market/data/{}",
        instrument.to_ascii_uppercase()
    )
}

pub(crate) fn mode_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/system/mode")
}

fn monitor_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/market/monitor")
}

fn risk_settings_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/settings/risk")
}

fn capital_settings_endpoint(base_url: &str) -> String {
    format!("{base_url}/api/v1/settings/capital")
}

pub async fn fetch_metrics(client: &Client, base_url: &str) -> Result<MetricsFrame, AppError> {
    let response = client
        .get(metrics_endpoint(base_url))
        .send()
        .await?
        .error_for_status()?;
    let wire = response.json::<MetricsWire>().await?;
    wire.try_into()
}

pub async fn fetch_open_trades(
    client: &Client,
    base_url: &str,
) -> Result<Vec<TradeRecord>, AppError> {
    let response = client
        .get(open_trades_endpoint(base_url))
        .send()
        .await?
        .error_for_status()?;
    let payload = response.json::<Vec<TradeWire>>().await?;

    let mut trades = Vec::with_capacity(payload.len());
    for wire in payload {
        trades.push(wire.try_into()?);
    }
    Ok(trades)
}

pub async fn fetch_alert_logs(client: &Client, base_url: &str) -> Result<Vec<LogEntry>, AppError> {
    let response = client
        .get(alert_logs_endpoint(base_url))
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json::<Vec<LogEntry>>().await?)
}

pub async fn fetch_balance(client: &Client, base_url: &str) -> Result<f64, AppError> {
    let response = client
        .get(balance_endpoint(base_url))
        .send()
        .await?
        .error_for_status()?;
    let wire = response.json::<BalanceWire>().await?;
    if !wire.balance.is_finite() {
        return Err(AppError::InvalidArgument(
            "balance must be a finite number".to_string(),
        ));
    }
    Ok(wire.balance)
}

pub async fn fetch_agent_status(
    client: &Client,
    base_url: &str,
) -> Result<BTreeMap<String, AgentState>, AppError> {
    let response = client
        .get(agent_status_endpoint(base_url))
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json::<BTreeMap<String, AgentState>>().await?)
}

pub async fn fetch_audit_trail(
    client: &Client,
    base_url: &str,
) -> Result<Vec<AuditEvent>, AppError> {
    let response = client
        .get(audit_trail_endpoint(base_url))
        .send()
        .await?
        .error_for_status()?;
    let events = response.json::<Vec<AuditEvent>>().await?;
    if events.iter().any(|event| !event.confidence.is_finite()) {
        return Err(AppError::InvalidArgument(
            "audit confidence must be a finite number".to_string(),
        ));
    }
    Ok(events)
}

pub async fn fetch_risk_rules(client: &Client, base_url: &str) -> Result<RiskRules, AppError> {
    let response = client
        .get(risk_rules_endpoint(base_url))
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json::<RiskRules>().await?)
}

pub async fn fetch_quote(
    client: &Client,
    base_url: &str,
    instrument: &str,
) -> Result<QuoteWire, AppError> {
    let response = client
        .get(quote_endpoint(base_url, instrument))
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json::<QuoteWire>().await?)
}

/// Maps a non-2xx write response to the backend's own reason, verbatim;
/// an undecodable rejection body is classified as a decode failure.
pub(crate) async fn rejection_from(response: reqwest::Response) -> AppError {
    match response.json::<RejectionWire>().await {
        Ok(wire) => AppError::WriteRejected(wire.detail),
        Err(error) => AppError::WriteDecode(error.to_string()),
    }
}

/// Shared write path: bounded by the configured timeout, transport and
/// rejection failures classified for the caller to surface.
async fn post_classified(
    client: &Client,
    endpoint: String,
    body: serde_json::Value,
    timeout_ms: u64,
) -> Result<reqwest::Response, AppError> {
    let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        let response = match client.post(&endpoint).json(&body).send().await {
            Ok(response) => response,
            Err(error) => return Err(AppError::WriteConnection(error.to_string())),
        };
        if !response.status().is_success() {
            return Err(rejection_from(response).await);
        }
        Ok(response)
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => Err(AppError::WriteTimeout { millis: timeout_ms }),
    }
}

pub async fn post_monitor_instruments(
    client: &Client,
    base_url: &str,
    instruments: &[String],
    timeout_ms: u64,
) -> Result<(), AppError> {
    post_classified(
        client,
        monitor_endpoint(base_url),
        json!({ "instruments": instruments }),
        timeout_ms,
    )
    .await?;
    Ok(())
}

pub async fn post_risk_settings(
    client: &Client,
    base_url: &str,
    rules: &RiskRules,
    timeout_ms: u64,
) -> Result<(), AppError> {
    post_classified(
        client,
        risk_settings_endpoint(base_url),
        serde_json::to_value(rules)?,
        timeout_ms,
    )
    .await?;
    Ok(())
}

pub async fn post_capital(
    client: &Client,
    base_url: &str,
    amount: f64,
    timeout_ms: u64,
) -> Result<(), AppError> {
    post_classified(
        client,
        capital_settings_endpoint(base_url),
        json!({ "amount": amount }),
        timeout_ms,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn read_endpoints_hit_versioned_paths() {
        let base = "http://127.0.0.1:8001";

        assert!(metrics_endpoint(base).ends_with("/api/v1/dashboard/metrics"));
        assert!(open_trades_endpoint(base).ends_with("/api/v1/trades/open"));
        assert!(alert_logs_endpoint(base).ends_with("/api/v1/alerts/logs"));
        assert!(balance_endpoint(base).ends_with("/api/v1/account/balance"));
        assert!(agent_status_endpoint(base).ends_with("/api/v1/agents/status"));
        assert!(audit_trail_endpoint(base).ends_with("/api/v1/agents/audit"));
        assert!(risk_rules_endpoint(base).ends_with("/api/v1/risk/rules"));
        assert!(mode_endpoint(base).ends_with("/api/v1/system/mode"));
        assert!(monitor_endpoint(base).ends_with("/api/v1/market/monitor"));
    }

    #[test]
    fn quote_endpoint_uppercases_instrument() {
        let endpoint = quote_endpoint("http://127.0.0.1:8001", "nifty");
        assert!(endpoint.ends_with("/api/v1/market/data/NIFTY"));
    }

    #[tokio::test]
    async fn fetch_balance_rejects_http_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/account/balance");
                then.status(500);
            })
            .await;

        let client = Client::new();
        let result = fetch_balance(&client, &server.base_url()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fetch_balance_parses_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/account/balance");
                then.status(200)
                    .json_body(serde_json::json!({"status": "success", "balance": 98500.5}));
            })
            .await;

        let client = Client::new();
        let balance = fetch_balance(&client, &server.base_url())
            .await
            .expect("balance should parse");
        assert_eq!(balance, 98500.5);
    }

    #[tokio::test]
    async fn write_rejection_surfaces_backend_detail_verbatim() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/settings/capital");
                then.status(400)
                    .json_body(serde_json::json!({"detail": "capital below exposure"}));
            })
            .await;

        let client = Client::new();
        let result = post_capital(&client, &server.base_url(), 100.0, 1_000).await;
        match result {
            Err(AppError::WriteRejected(detail)) => assert_eq!(detail, "capital below exposure"),
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_timeout_is_classified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/market/monitor");
                then.status(200)
                    .json_body(serde_json::json!({"status": "success"}))
                    .delay(Duration::from_millis(800));
            })
            .await;

        let client = Client::new();
        let instruments = vec!["NIFTY".to_string()];
        let result =
            post_monitor_instruments(&client, &server.base_url(), &instruments, 150).await;
        assert!(matches!(result, Err(AppError::WriteTimeout { millis: 150 })));
    }
}
