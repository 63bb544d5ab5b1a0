pub mod error;
pub mod events;
pub mod feed;
pub mod mode;
pub mod session;
pub mod state;
pub mod sync;

pub use error::AppError;
pub use events::SessionEvent;
pub use feed::{FeedReconciler, PricePulse, QuoteOutcome, QuoteStatus, QuoteView, QuoteWire};
pub use mode::{ExecutionMode, ModeSwitchOutcome};
pub use state::{SessionContext, SyncConfig, SyncOptions};
pub use sync::history::{downsample, ChartRange, ChartSeries, PnlHistory, MAX_HISTORY};
