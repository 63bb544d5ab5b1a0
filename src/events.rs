use crate::feed::QuoteView;
use crate::mode::ExecutionMode;
use crate::sync::history::ChartSeries;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything the core can tell the presentation layer. The sync loop and
/// the mode machine publish; renderers subscribe through
/// [`crate::state::SessionContext::subscribe`] and never get called back
/// directly.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// One full tick has been merged into the snapshot store.
    SnapshotUpdated,
    /// Account balance refreshed; capital widgets can react without
    /// waiting for the next full snapshot read.
    BalanceUpdated(f64),
    /// Downsampled P&L series for the currently selected range.
    ChartUpdated(ChartSeries),
    QuoteUpdated(QuoteView),
    MarketClosed {
        instrument: String,
    },
    /// Passive degradation notice (backend health, unavailable feed).
    HealthWarning {
        message: String,
    },
    /// Optimistic selection: a switch request left for the backend.
    ModeSwitchPending(ExecutionMode),
    ModeChanged {
        mode: ExecutionMode,
        data_status: String,
        feed_label: String,
    },
}
