//! Invoice event dispatcher.
//!
//! When the wallet service reports an invoice as paid, the stored event
//! for its hash is taken out of the store and handed to the handler
//! registered for its callback kind.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::database::{CallbackKind, InvoiceEvent, InvoiceEventStore};

pub type EventHandler = Arc<dyn Fn(InvoiceEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// What [`InvoiceDispatcher::settle`] did with a payment hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The handler for this kind ran.
    Dispatched(CallbackKind),
    /// No event stored, or it was already consumed.
    Unknown,
    /// Event consumed but nothing is registered for its kind.
    Unhandled(CallbackKind),
}

#[derive(Clone)]
pub struct InvoiceDispatcher {
    store: Arc<dyn InvoiceEventStore>,
    handlers: HashMap<CallbackKind, EventHandler>,
}

impl InvoiceDispatcher {
    pub fn new(store: Arc<dyn InvoiceEventStore>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `kind`, replacing any earlier one.
    #[must_use]
    pub fn on<F, Fut>(mut self, kind: CallbackKind, handler: F) -> Self
    where
        F: Fn(InvoiceEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: EventHandler =
            Arc::new(move |event| -> BoxFuture<'static, ()> { Box::pin(handler(event)) });
        self.handlers.insert(kind, boxed);
        self
    }

    /// Consume the event for `payment_hash` and run its handler.
    pub async fn settle(&self, payment_hash: &str) -> mongodb::error::Result<Settlement> {
        let Some(event) = self.store.take(payment_hash).await? else {
            debug!("No invoice event for {}", payment_hash);
            return Ok(Settlement::Unknown);
        };

        let kind = event.kind();
        let Some(handler) = self.handlers.get(&kind) else {
            warn!("No handler for {} event of invoice {}", kind, payment_hash);
            return Ok(Settlement::Unhandled(kind));
        };

        info!(
            "Invoice {} settled: {} sat for user {} ({})",
            payment_hash, event.invoice.amount, event.user_id, kind
        );
        handler(event).await;
        Ok(Settlement::Dispatched(kind))
    }
}
