//! Telegram side: dispatcher, interceptors and runners.

pub mod dispatcher;
pub mod interceptors;
mod runtime;
mod webhook;

pub use dispatcher::{build_dispatcher, AppState, ThrottledBot};
pub use runtime::run;
