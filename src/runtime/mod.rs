//! Runtime primitives shared by handlers: per-user locks and retry tickers.

pub mod locks;
pub mod ticker;

pub use locks::{LockKey, UserLockGuard, UserLocks};
pub use ticker::{RetryTicker, TickerRegistry};
