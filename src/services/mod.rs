pub mod alerts;
pub mod margin;
pub mod margin_sweep;
pub mod market_data;
pub mod rate_limiter;
pub mod scheduler;
pub mod sqlite_store;
pub mod stores;

pub use alerts::{AlertBroadcaster, AlertError, AlertSink};
pub use margin::{evaluate, Evaluation, MarginService};
pub use margin_sweep::MarginSweepJob;
pub use market_data::MarketDataRefresher;
pub use rate_limiter::{RateDecision, RateLimiter};
pub use scheduler::{Job, PeriodicTask, TaskHandle, TickReport};
pub use sqlite_store::SqliteStore;
pub use stores::{blocking, MarginStore, PositionStore, PriceStore, StoreResult};
