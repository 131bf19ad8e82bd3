//! Wallet API routes.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::auth::ApiUser;
use super::error::{ApiError, ApiResult};
use super::ApiState;
use crate::database::{InvoiceCallback, Wallet};
use crate::i18n;
use crate::lnbits::PaymentStatus;
use crate::plugins::invoice::invoice_memo;
use crate::runtime::LockKey;
use crate::utils::user_str;
use crate::wallet::{self, EventOrigin};

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub amount: i64,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateInvoiceResponse {
    pub payment_hash: String,
    pub payment_request: String,
}

#[derive(Debug, Deserialize)]
pub struct PayInvoiceRequest {
    pub pay_req: String,
}

fn wallet_of(caller: &ApiUser) -> ApiResult<&Wallet> {
    caller
        .user
        .wallet
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("user has no wallet".to_string()))
}

pub async fn balance(
    State(state): State<ApiState>,
    Extension(caller): Extension<ApiUser>,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = wallet::refresh_balance(&state.app, &caller.user)
        .await
        .map_err(|e| ApiError::request("balance check failed", e))?;

    info!("API balance check by {}: {} sat", user_str(&caller.user), balance);
    Ok(Json(BalanceResponse { balance }))
}

pub async fn create_invoice(
    State(state): State<ApiState>,
    Extension(caller): Extension<ApiUser>,
    Json(body): Json<CreateInvoiceRequest>,
) -> ApiResult<Json<CreateInvoiceResponse>> {
    if body.amount < 1 {
        return Err(ApiError::BadRequest("invalid amount".to_string()));
    }

    let user = &caller.user;
    let memo = invoice_memo(body.memo.as_deref(), &state.app.bot_username);
    let locale = i18n::resolve_locale(user.language_code.as_deref());
    let event = wallet::create_invoice_with_event(
        &state.app,
        user,
        body.amount,
        &memo,
        InvoiceCallback::Generic,
        EventOrigin {
            chat_id: user.telegram_id as i64,
            message_id: None,
            language_code: &locale,
        },
    )
    .await
    .map_err(|e| ApiError::request("could not create invoice", e))?;

    info!("API invoice of {} sat created for {}", body.amount, user_str(user));
    Ok(Json(CreateInvoiceResponse {
        payment_hash: event.invoice.payment_hash,
        payment_request: event.invoice.payment_request,
    }))
}

pub async fn pay_invoice(
    State(state): State<ApiState>,
    Extension(caller): Extension<ApiUser>,
    Json(body): Json<PayInvoiceRequest>,
) -> ApiResult<Json<PaymentStatus>> {
    if !caller.access.can_pay() {
        return Err(ApiError::Unauthorized);
    }
    let wallet = wallet_of(&caller)?;

    // Serialized with the user's chat updates.
    let _lock = state
        .app
        .locks
        .acquire(LockKey::user(caller.user.telegram_id))
        .await;

    let paid = state
        .app
        .lnbits
        .pay(wallet, &body.pay_req)
        .await
        .map_err(|e| ApiError::BadRequest(format!("could not pay invoice: {}", e)))?;

    // The payment went through; a failed status lookup doesn't change that.
    let status = state
        .app
        .lnbits
        .payment(wallet, &paid.payment_hash)
        .await
        .unwrap_or(PaymentStatus {
            paid: true,
            preimage: None,
        });

    if let Err(e) = wallet::refresh_balance(&state.app, &caller.user).await {
        debug!("Balance refresh after API payment failed: {}", e);
    }
    info!("API payment {} by {}", paid.payment_hash, user_str(&caller.user));
    Ok(Json(status))
}

pub async fn payment_status(
    State(state): State<ApiState>,
    Extension(caller): Extension<ApiUser>,
    Path(payment_hash): Path<String>,
) -> ApiResult<Json<PaymentStatus>> {
    let wallet = wallet_of(&caller)?;
    let status = state
        .app
        .lnbits
        .payment(wallet, &payment_hash)
        .await
        .map_err(|e| ApiError::request("could not get payment", e))?;

    info!(
        "API payment status {} for {}: paid={}",
        payment_hash,
        user_str(&caller.user),
        status.paid
    );
    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::api::auth::KeyAccess;
    use crate::bot::AppState;
    use crate::database::{MemoryInvoiceEvents, WalletUser};
    use crate::events::InvoiceDispatcher;

    fn caller(access: KeyAccess) -> ApiUser {
        ApiUser {
            user: WalletUser {
                telegram_id: 11,
                username: Some("alice".into()),
                username_display: Some("Alice".into()),
                first_name: "Alice".into(),
                language_code: None,
                lnbits_id: Some("u11".into()),
                wallet: Some(Wallet {
                    id: "w11".into(),
                    name: "11".into(),
                    adminkey: "adm1n".into(),
                    inkey: "1nv".into(),
                }),
                initialized: true,
                node: None,
                created_at: 0,
                updated_at: 0,
            },
            access,
        }
    }

    async fn api_state() -> ApiState {
        ApiState {
            app: AppState::for_tests().await,
            dispatcher: Arc::new(InvoiceDispatcher::new(Arc::new(MemoryInvoiceEvents::new()))),
        }
    }

    fn pay_request() -> Json<PayInvoiceRequest> {
        Json(PayInvoiceRequest {
            pay_req: "lnbc10n1test".to_string(),
        })
    }

    #[tokio::test]
    async fn test_invoice_key_cannot_pay() {
        let state = api_state().await;
        let result = pay_invoice(State(state), Extension(caller(KeyAccess::Invoice)), pay_request()).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_payment_waits_for_user_lock() {
        let state = api_state().await;
        let locks = state.app.locks.clone();
        let held = locks.acquire(LockKey::user(11)).await;

        let call = tokio::spawn(pay_invoice(
            State(state),
            Extension(caller(KeyAccess::Admin)),
            pay_request(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!call.is_finished());

        drop(held);
        let result = tokio::time::timeout(Duration::from_secs(10), call)
            .await
            .expect("payment should run once the lock is free")
            .unwrap();
        // The wallet service isn't reachable in tests.
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(locks.is_empty());
    }
}
