//! Invoice event storage.
//!
//! Events are written when an invoice is created and taken exactly once
//! when it settles. `take` is an atomic load-and-delete so that duplicate
//! webhook deliveries find nothing the second time.

use async_trait::async_trait;
use dashmap::DashMap;
use mongodb::bson::doc;
use mongodb::options::ReplaceOptions;
use mongodb::Collection;
use tracing::debug;

use super::models::InvoiceEvent;
use super::Database;

#[async_trait]
pub trait InvoiceEventStore: Send + Sync {
    /// Store `event` under its key, replacing any previous one.
    async fn put(&self, event: &InvoiceEvent) -> mongodb::error::Result<()>;

    /// Remove and return the event for `payment_hash`.
    async fn take(&self, payment_hash: &str) -> mongodb::error::Result<Option<InvoiceEvent>>;
}

/// `invoice_events` collection, keyed by `_id = invoice:<hash>`.
#[derive(Clone)]
pub struct MongoInvoiceEvents {
    collection: Collection<InvoiceEvent>,
}

impl MongoInvoiceEvents {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("invoice_events"),
        }
    }
}

#[async_trait]
impl InvoiceEventStore for MongoInvoiceEvents {
    async fn put(&self, event: &InvoiceEvent) -> mongodb::error::Result<()> {
        self.collection
            .replace_one(doc! { "_id": &event.key }, event)
            .with_options(ReplaceOptions::builder().upsert(true).build())
            .await?;
        debug!("Stored invoice event {} ({})", event.key, event.kind());
        Ok(())
    }

    async fn take(&self, payment_hash: &str) -> mongodb::error::Result<Option<InvoiceEvent>> {
        self.collection
            .find_one_and_delete(doc! { "_id": InvoiceEvent::key_for(payment_hash) })
            .await
    }
}

/// Process-local store for tests and single-instance setups.
#[derive(Default)]
pub struct MemoryInvoiceEvents {
    events: DashMap<String, InvoiceEvent>,
}

impl MemoryInvoiceEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl InvoiceEventStore for MemoryInvoiceEvents {
    async fn put(&self, event: &InvoiceEvent) -> mongodb::error::Result<()> {
        self.events.insert(event.key.clone(), event.clone());
        Ok(())
    }

    async fn take(&self, payment_hash: &str) -> mongodb::error::Result<Option<InvoiceEvent>> {
        Ok(self
            .events
            .remove(&InvoiceEvent::key_for(payment_hash))
            .map(|(_, event)| event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Invoice, InvoiceCallback};

    fn event(hash: &str) -> InvoiceEvent {
        InvoiceEvent::new(
            Invoice {
                payment_hash: hash.into(),
                payment_request: format!("lnbc-{}", hash),
                amount: 100,
                memo: "coffee".into(),
            },
            42,
            42,
            InvoiceCallback::Generic,
        )
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = MemoryInvoiceEvents::new();
        store.put(&event("h1")).await.unwrap();

        assert_eq!(store.len(), 1);
        let taken = store.take("h1").await.unwrap();
        assert_eq!(taken.map(|e| e.invoice.amount), Some(100));
        assert!(store.take("h1").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_put_replaces_same_hash() {
        let store = MemoryInvoiceEvents::new();
        store.put(&event("h1")).await.unwrap();

        let mut relay = event("h1");
        relay.callback = InvoiceCallback::NodeRelay;
        store.put(&relay).await.unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.take("h1").await.unwrap().unwrap();
        assert_eq!(stored.callback, InvoiceCallback::NodeRelay);
    }
}
