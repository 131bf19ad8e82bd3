//! MongoDB persistence.

mod invoice_events;
mod models;
mod mongo;
mod transactions;
mod users;

pub use invoice_events::{InvoiceEventStore, MemoryInvoiceEvents, MongoInvoiceEvents};
pub use models::*;
pub use mongo::Database;
pub use transactions::TransactionRepo;
pub use users::UserRepo;
