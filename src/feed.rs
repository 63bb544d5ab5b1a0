use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw per-instrument quote payload. `status` is the top-level response
/// status ("success", or a short-circuit like MARKET_CLOSED /
/// DATA_UNAVAILABLE); `data_status` describes the feed for a normal
/// payload.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteWire {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub ltp: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub data_status: Option<String>,
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<u64>,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Loading,
    Live,
    Stale,
    Virtual,
    MarketClosed,
}

impl QuoteStatus {
    pub fn badge_class(self) -> &'static str {
        match self {
            Self::Loading => "badge-loading",
            Self::Live => "badge-live",
            Self::Stale => "badge-stale",
            Self::Virtual => "badge-virtual",
            Self::MarketClosed => "badge-closed",
        }
    }

    pub fn pulse_class(self) -> &'static str {
        match self {
            Self::Loading => "pulse-muted",
            Self::Live => "pulse-green",
            Self::Stale => "pulse-amber",
            Self::Virtual => "pulse-blue",
            Self::MarketClosed => "pulse-off",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PricePulse {
    Up,
    Down,
}

/// Render-ready state for one instrument tile.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuoteView {
    pub instrument: String,
    pub price: Option<f64>,
    pub change: f64,
    pub change_percent: Option<f64>,
    pub status: QuoteStatus,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open_interest: Option<u64>,
    pub data_source: Option<String>,
    /// One-shot visual cue versus the previously rendered price;
    /// cosmetic only, never feeds back into the numbers.
    pub pulse: Option<PricePulse>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuoteOutcome {
    Update(QuoteView),
    /// Whole-tile "closed" placeholder; no field updates this tick.
    Closed {
        instrument: String,
        reason: Option<String>,
    },
    /// Feed outage: surface a health warning but keep whatever was on
    /// screen (stale-over-blank).
    Unavailable {
        instrument: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default)]
struct InstrumentMemo {
    last_price: Option<f64>,
    last_status: Option<QuoteStatus>,
}

/// Per-instrument diff state. One memo per displayed instrument; a
/// closed market for one instrument never affects another.
#[derive(Debug, Default)]
pub struct FeedReconciler {
    memos: HashMap<String, InstrumentMemo>,
}

impl FeedReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status as of the most recent non-short-circuited tick.
    pub fn last_status(&self, instrument: &str) -> Option<QuoteStatus> {
        self.memos
            .get(instrument)
            .and_then(|memo| memo.last_status)
    }

    pub fn reconcile(&mut self, instrument: &str, wire: &QuoteWire) -> QuoteOutcome {
        match wire.status.as_deref() {
            Some("MARKET_CLOSED") => {
                return QuoteOutcome::Closed {
                    instrument: instrument.to_string(),
                    reason: wire.reason.clone(),
                };
            }
            Some("DATA_UNAVAILABLE") => {
                return QuoteOutcome::Unavailable {
                    instrument: instrument.to_string(),
                    reason: wire
                        .reason
                        .clone()
                        .unwrap_or_else(|| "live data temporarily unavailable".to_string()),
                };
            }
            _ => {}
        }

        // ltp == 0 means "no data yet", not a zero price.
        let price = wire.ltp.filter(|value| *value != 0.0 && value.is_finite());
        let status = if price.is_none() {
            QuoteStatus::Loading
        } else {
            classify(wire.data_status.as_deref())
        };

        let (change, change_percent) = match (price, wire.close) {
            (Some(last), Some(close)) if close.is_finite() => {
                let change = last - close;
                let percent = (close > 0.0).then(|| change / close * 100.0);
                (change, percent)
            }
            _ => (0.0, None),
        };

        let memo = self.memos.entry(instrument.to_string()).or_default();
        let pulse = match (price, memo.last_price) {
            (Some(current), Some(previous)) if current > previous => Some(PricePulse::Up),
            (Some(current), Some(previous)) if current < previous => Some(PricePulse::Down),
            _ => None,
        };
        if price.is_some() {
            memo.last_price = price;
        }
        memo.last_status = Some(status);

        QuoteOutcome::Update(QuoteView {
            instrument: instrument.to_string(),
            price,
            change,
            change_percent,
            status,
            bid: wire.bid,
            ask: wire.ask,
            open_interest: wire.open_interest,
            data_source: wire.data_source.clone(),
            pulse,
        })
    }
}

/// Display-status precedence: explicit LOADING beats staleness, which
/// beats VIRTUAL, with LIVE as the default for anything unrecognized.
fn classify(data_status: Option<&str>) -> QuoteStatus {
    match data_status {
        Some("LOADING") => QuoteStatus::Loading,
        Some("STALE") => QuoteStatus::Stale,
        Some("MARKET_CLOSED") => QuoteStatus::MarketClosed,
        Some("VIRTUAL") => QuoteStatus::Virtual,
        _ => QuoteStatus::Live,
    }
}
