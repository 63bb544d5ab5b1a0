use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Hard cap on retained P&L points; oldest dropped first once exceeded.
pub const MAX_HISTORY: usize = 900;
/// Below this many real points, non-intraday ranges fall back to a
/// synthetic placeholder series.
pub const SYNTHETIC_THRESHOLD: usize = 50;
pub const SYNTHETIC_POINT_COUNT: usize = 100;

const COMPACT_TIME_FORMAT: &str = "%H:%M:%S";
const FULL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only realized-P&L history for the analytics chart. Three
/// parallel sequences of equal length; compact timestamps feed axis
/// labels, full timestamps feed tooltips. Written by the sync loop only.
#[derive(Debug, Default)]
pub struct PnlHistory {
    values: Vec<f64>,
    compact_timestamps: Vec<String>,
    full_timestamps: Vec<String>,
}

impl PnlHistory {
    pub fn push(&mut self, value: f64, at: NaiveDateTime) {
        self.values.push(value);
        self.compact_timestamps
            .push(at.format(COMPACT_TIME_FORMAT).to_string());
        self.full_timestamps
            .push(at.format(FULL_TIME_FORMAT).to_string());

        if self.values.len() > MAX_HISTORY {
            let overflow = self.values.len() - MAX_HISTORY;
            self.values.drain(0..overflow);
            self.compact_timestamps.drain(0..overflow);
            self.full_timestamps.drain(0..overflow);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Session reset: history never survives past the current session.
    pub fn clear(&mut self) {
        self.values.clear();
        self.compact_timestamps.clear();
        self.full_timestamps.clear();
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChartRange {
    #[serde(rename = "1D")]
    D1,
    #[serde(rename = "5D")]
    D5,
    #[serde(rename = "1M")]
    M1,
    #[serde(rename = "3M")]
    M3,
    #[serde(rename = "6M")]
    M6,
    #[serde(rename = "1Y")]
    Y1,
}

impl ChartRange {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::D1 => "1D",
            Self::D5 => "5D",
            Self::M1 => "1M",
            Self::M3 => "3M",
            Self::M6 => "6M",
            Self::Y1 => "1Y",
        }
    }

    /// (point limit, stride) applied tail-first: the newest `limit`
    /// points are windowed, then every `stride`-th point survives.
    pub fn window(self) -> (usize, usize) {
        match self {
            Self::D1 => (500, 1),
            Self::D5 => (1_500, 2),
            Self::M1 => (3_000, 5),
            Self::M3 => (6_000, 15),
            Self::M6 => (9_000, 30),
            Self::Y1 => (12_000, 50),
        }
    }
}

/// Render-ready series: aligned labels, values and tooltip timestamps.
/// `synthetic` marks placeholder output generated when real history is
/// too sparse for the requested range.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub timestamps: Vec<String>,
    pub synthetic: bool,
}

/// Pure view of (buffer, range) — never mutates the buffer, identical
/// inputs produce identical output.
pub fn downsample(history: &PnlHistory, range: ChartRange, now: NaiveDateTime) -> ChartSeries {
    if history.len() < SYNTHETIC_THRESHOLD && range != ChartRange::D1 {
        return synthetic_series(now);
    }

    let (limit, stride) = range.window();
    let start = history.len().saturating_sub(limit);

    let mut labels = Vec::new();
    let mut values = Vec::new();
    let mut timestamps = Vec::new();
    for (offset, index) in (start..history.len()).enumerate() {
        if offset % stride != 0 {
            continue;
        }
        labels.push(history.compact_timestamps[index].clone());
        values.push(history.values[index]);
        timestamps.push(history.full_timestamps[index].clone());
    }

    ChartSeries {
        labels,
        values,
        timestamps,
        synthetic: false,
    }
}

/// Deterministic placeholder walk so long-range views are never empty
/// before enough history accumulates. Two incommensurate drift cycles
/// keep the shape from looking periodic; no RNG involved.
fn synthetic_series(now: NaiveDateTime) -> ChartSeries {
    let mut labels = Vec::with_capacity(SYNTHETIC_POINT_COUNT);
    let mut values = Vec::with_capacity(SYNTHETIC_POINT_COUNT);
    let mut timestamps = Vec::with_capacity(SYNTHETIC_POINT_COUNT);

    let mut level = 0.0_f64;
    for step in 0..SYNTHETIC_POINT_COUNT {
        let fast_drift = ((step % 7) as f64 - 3.0) * 35.0;
        let slow_drift = ((step % 13) as f64 - 6.0) * 12.0;
        level += fast_drift + slow_drift;

        let at = now - chrono::Duration::minutes((SYNTHETIC_POINT_COUNT - 1 - step) as i64);
        labels.push(at.format(COMPACT_TIME_FORMAT).to_string());
        values.push(level);
        timestamps.push(at.format(FULL_TIME_FORMAT).to_string());
    }

    ChartSeries {
        labels,
        values,
        timestamps,
        synthetic: true,
    }
}
