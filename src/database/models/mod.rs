//! Persisted models.

mod invoice_event;
mod transaction;
mod user;

pub use invoice_event::{CallbackKind, Invoice, InvoiceCallback, InvoiceEvent};
pub use transaction::{Transaction, TransactionType};
pub use user::{is_banned_key, LndParams, Wallet, WalletUser};
