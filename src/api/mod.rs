//! HTTP API: the LNbits settlement webhook and a small wallet API for
//! users who want to script their bot wallet.

mod auth;
mod error;
mod routes;
mod webhook;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::bot::AppState;
use crate::events::InvoiceDispatcher;

/// State shared by all API routes.
#[derive(Clone)]
pub struct ApiState {
    pub app: AppState,
    pub dispatcher: Arc<InvoiceDispatcher>,
}

impl FromRef<ApiState> for Arc<InvoiceDispatcher> {
    fn from_ref(state: &ApiState) -> Self {
        state.dispatcher.clone()
    }
}

pub fn router(state: ApiState) -> Router {
    let wallet_api = Router::new()
        .route("/api/v1/balance", get(routes::balance))
        .route("/api/v1/createinvoice", post(routes::create_invoice))
        .route("/api/v1/payinvoice", post(routes::pay_invoice))
        .route("/api/v1/paymentstatus/:payment_hash", get(routes::payment_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::authorize));

    Router::new()
        .route("/webhook/lnbits", post(webhook::lnbits_webhook))
        .merge(wallet_api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
