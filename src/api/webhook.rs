//! LNbits settlement webhook.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info};

use super::error::{ApiError, ApiResult};
use crate::events::{InvoiceDispatcher, Settlement};

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub payment_hash: String,
    #[serde(default)]
    pub amount: Option<i64>,
}

/// LNbits posts here once an invoice with our webhook URL is paid.
/// Redeliveries of the same hash are acknowledged without dispatching.
pub async fn lnbits_webhook(
    State(dispatcher): State<Arc<InvoiceDispatcher>>,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<StatusCode> {
    let settlement = dispatcher
        .settle(&payload.payment_hash)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    match settlement {
        Settlement::Dispatched(kind) => info!(
            "Invoice {} settled ({} msat), ran {} callback",
            payload.payment_hash,
            payload.amount.unwrap_or_default(),
            kind
        ),
        Settlement::Unknown => debug!("Webhook for unknown invoice {}", payload.payment_hash),
        Settlement::Unhandled(kind) => debug!("No handler for {} invoice {}", kind, payload.payment_hash),
    }
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::database::{
        CallbackKind, Invoice, InvoiceCallback, InvoiceEvent, InvoiceEventStore, MemoryInvoiceEvents,
    };

    fn payload(hash: &str) -> Json<WebhookPayload> {
        Json(WebhookPayload {
            payment_hash: hash.to_string(),
            amount: Some(21_000),
        })
    }

    #[tokio::test]
    async fn test_unknown_invoice_is_acknowledged() {
        let dispatcher = Arc::new(InvoiceDispatcher::new(Arc::new(MemoryInvoiceEvents::new())));
        let status = lnbits_webhook(State(dispatcher), payload("missing")).await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_redelivery_runs_callback_once() {
        let store = Arc::new(MemoryInvoiceEvents::new());
        let event = InvoiceEvent::new(
            Invoice {
                payment_hash: "beef".into(),
                payment_request: "lnbc210n1".into(),
                amount: 21,
                memo: String::new(),
            },
            3,
            3,
            InvoiceCallback::Generic,
        );
        store.put(&event).await.unwrap();

        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        let dispatcher = Arc::new(InvoiceDispatcher::new(store.clone()).on(
            CallbackKind::Generic,
            move |_event| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        for _ in 0..2 {
            let status = lnbits_webhook(State(dispatcher.clone()), payload("beef")).await.unwrap();
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }
}
