use crate::error::AppError;
use crate::mode::ExecutionMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The UI renders at most this many alert-log lines, regardless of how
/// many the backend retains.
pub const RENDERED_LOG_LINES: usize = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDirection {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentState {
    Running,
    Paused,
    Idle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemHealth {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataEngineStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Deserialize)]
pub struct MetricsFieldsWire {
    pub total_capital: f64,
    pub used_capital_amount: f64,
    pub daily_pnl: f64,
    pub max_drawdown: f64,
    pub risk_used_percent: f64,
    pub execution_mode: ExecutionMode,
    pub system_health: SystemHealth,
}

#[derive(Debug, Deserialize)]
pub struct MetricsWire {
    pub metrics: MetricsFieldsWire,
    pub is_running: bool,
    pub data_engine_status: DataEngineStatus,
    pub timestamp: f64,
}

/// Last successful metrics payload, validated at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsFrame {
    pub total_capital: f64,
    pub used_capital_amount: f64,
    pub daily_pnl: f64,
    pub max_drawdown: f64,
    pub risk_used_percent: f64,
    pub execution_mode: ExecutionMode,
    pub system_health: SystemHealth,
    pub data_engine_status: DataEngineStatus,
    pub is_running: bool,
}

impl TryFrom<MetricsWire> for MetricsFrame {
    type Error = AppError;

    fn try_from(value: MetricsWire) -> Result<Self, Self::Error> {
        let fields = value.metrics;
        let numbers = [
            fields.total_capital,
            fields.used_capital_amount,
            fields.daily_pnl,
            fields.max_drawdown,
            fields.risk_used_percent,
        ];
        if numbers.iter().any(|number| !number.is_finite()) {
            return Err(AppError::InvalidArgument(
                "metrics fields must be finite numbers".to_string(),
            ));
        }

        Ok(Self {
            total_capital: fields.total_capital,
            used_capital_amount: fields.used_capital_amount,
            daily_pnl: fields.daily_pnl,
            max_drawdown: fields.max_drawdown,
            risk_used_percent: fields.risk_used_percent,
            execution_mode: fields.execution_mode,
            system_health: fields.system_health,
            data_engine_status: value.data_engine_status,
            is_running: value.is_running,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TradeWire {
    pub id: u64,
    pub instrument: String,
    pub direction: TradeDirection,
    pub quantity: f64,
    pub lots: u32,
    pub entry_price: f64,
    pub current_price: f64,
    pub pnl: f64,
    pub status: PositionStatus,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub id: u64,
    pub instrument: String,
    pub direction: TradeDirection,
    pub quantity: f64,
    pub lots: u32,
    pub entry_price: f64,
    pub current_price: f64,
    pub pnl: f64,
    pub status: PositionStatus,
    pub timestamp: String,
}

impl TryFrom<TradeWire> for TradeRecord {
    type Error = AppError;

    fn try_from(value: TradeWire) -> Result<Self, Self::Error> {
        let numbers = [
            value.quantity,
            value.entry_price,
            value.current_price,
            value.pnl,
        ];
        if numbers.iter().any(|number| !number.is_finite()) {
            return Err(AppError::InvalidArgument(
                "trade price/quantity fields must be finite".to_string(),
            ));
        }
        if value.quantity < 0.0 {
            return Err(AppError::InvalidArgument(
                "trade quantity must be non-negative".to_string(),
            ));
        }

        Ok(Self {
            id: value.id,
            instrument: value.instrument,
            direction: value.direction,
            quantity: value.quantity,
            lots: value.lots,
            entry_price: value.entry_price,
            current_price: value.current_price,
            pnl: value.pnl,
            status: value.status,
            timestamp: value.timestamp,
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct BalanceWire {
    pub status: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub timestamp: String,
    pub agent: String,
    pub state: String,
    pub confidence: f64,
    #[serde(default)]
    pub reason: Option<String>,
    pub payload: Value,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskRules {
    pub max_trades_per_day: u32,
    pub risk_per_trade_percent: f64,
    pub max_daily_loss_percent: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RejectionWire {
    pub detail: String,
}

/// Last-known-good values across every polled endpoint. Fields are only
/// ever replaced wholesale by a successful fetch; a failed fetch leaves
/// the previous value in place (stale-over-blank).
#[derive(Debug, Clone, Default)]
pub struct DashboardSnapshot {
    pub metrics: Option<MetricsFrame>,
    pub trades: Vec<TradeRecord>,
    pub logs: Vec<LogEntry>,
    pub balance: Option<f64>,
    pub agent_status: BTreeMap<String, AgentState>,
    pub audit_trail: Vec<AuditEvent>,
    pub risk_rules: Option<RiskRules>,
}

impl DashboardSnapshot {
    /// Tail of the alert log, newest last. The backend keeps a longer
    /// ring; the UI only ever shows [`RENDERED_LOG_LINES`].
    pub fn recent_logs(&self, limit: usize) -> &[LogEntry] {
        let start = self.logs.len().saturating_sub(limit);
        &self.logs[start..]
    }

    /// Most recent audit event emitted by the named agent, if any.
    pub fn latest_audit_for(&self, agent: &str) -> Option<&AuditEvent> {
        self.audit_trail
            .iter()
            .rev()
            .find(|event| event.agent == agent)
    }
}
