//! Interceptor pipeline: chains, the update context and the handler
//! registry.

pub mod chain;
pub mod context;
pub mod registry;

pub use chain::{ChainError, Interrupted, LogFields, Pipeline, Stage, Step};
pub use context::{ChatUpdate, UpdateContext};
pub use registry::{Endpoint, HandlerRegistry};
