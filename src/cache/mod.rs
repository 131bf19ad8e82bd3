//! Moka-backed caches.
//!
//! `CacheRegistry` hands out named `TypedCache`s; `CacheConfig` has the
//! presets the bot uses (users, balances, session state).

mod config;
mod registry;
mod typed;

pub use config::CacheConfig;
pub use registry::CacheRegistry;
pub use typed::TypedCache;
