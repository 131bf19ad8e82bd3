//! Invoice settlement events.

pub mod callbacks;
pub mod dispatcher;

pub use callbacks::invoice_dispatcher;
pub use dispatcher::{InvoiceDispatcher, Settlement};
