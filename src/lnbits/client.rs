//! HTTP client for the LNbits REST API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::models::*;
use super::WalletError;
use crate::database::Wallet;

const API_KEY_HEADER: &str = "X-Api-Key";
/// Error bodies are cut to this length before logging.
const MAX_ERROR_BODY: usize = 300;

#[derive(Clone)]
pub struct LnbitsClient {
    http: Client,
    base_url: String,
    admin_key: String,
    admin_id: String,
    webhook_url: Option<String>,
}

impl LnbitsClient {
    pub fn new(
        base_url: &str,
        admin_key: impl Into<String>,
        admin_id: impl Into<String>,
        webhook_url: Option<String>,
    ) -> Result<Self, WalletError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_key: admin_key.into(),
            admin_id: admin_id.into(),
            webhook_url,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create an LNbits user with one wallet through the usermanager
    /// extension.
    pub async fn create_user_with_wallet(&self, name: &str) -> Result<(LnbitsUser, Wallet), WalletError> {
        let request = self
            .http
            .post(self.url("/usermanager/api/v1/users"))
            .header(API_KEY_HEADER, &self.admin_key)
            .json(&CreateUserRequest {
                admin_id: &self.admin_id,
                user_name: name,
                wallet_name: name,
            });

        let user: LnbitsUser = send_json(request).await?;
        let wallet = user
            .wallets
            .first()
            .map(|w| Wallet {
                id: w.id.clone(),
                name: w.name.clone(),
                adminkey: w.adminkey.clone(),
                inkey: w.inkey.clone(),
            })
            .ok_or(WalletError::MissingWallet)?;

        debug!("Created LNbits user {} with wallet {}", user.id, wallet.id);
        Ok((user, wallet))
    }

    pub async fn wallet_info(&self, wallet: &Wallet) -> Result<WalletInfo, WalletError> {
        let request = self
            .http
            .get(self.url("/api/v1/wallet"))
            .header(API_KEY_HEADER, &wallet.inkey);
        send_json(request).await
    }

    /// Incoming invoice on `wallet`. LNbits calls the configured webhook
    /// when it gets paid.
    pub async fn create_invoice(
        &self,
        wallet: &Wallet,
        amount: i64,
        memo: &str,
    ) -> Result<CreatedInvoice, WalletError> {
        let params = InvoiceParams {
            out: false,
            amount,
            memo: memo.to_string(),
            webhook: self.webhook_url.clone(),
        };
        let request = self
            .http
            .post(self.url("/api/v1/payments"))
            .header(API_KEY_HEADER, &wallet.inkey)
            .json(&params);
        send_json(request).await
    }

    /// Pay `bolt11` from `wallet`. Needs the admin key.
    pub async fn pay(&self, wallet: &Wallet, bolt11: &str) -> Result<PaidInvoice, WalletError> {
        let request = self
            .http
            .post(self.url("/api/v1/payments"))
            .header(API_KEY_HEADER, &wallet.adminkey)
            .json(&PayParams { out: true, bolt11 });
        send_json(request).await
    }

    pub async fn payment(&self, wallet: &Wallet, payment_hash: &str) -> Result<PaymentStatus, WalletError> {
        let request = self
            .http
            .get(self.url(&format!("/api/v1/payments/{}", payment_hash)))
            .header(API_KEY_HEADER, &wallet.inkey);
        send_json(request).await
    }

    /// Payment history, newest first.
    pub async fn payments(&self, wallet: &Wallet) -> Result<Vec<Payment>, WalletError> {
        let request = self
            .http
            .get(self.url("/api/v1/payments"))
            .header(API_KEY_HEADER, &wallet.inkey);
        let mut payments: Vec<Payment> = send_json(request).await?;
        payments.sort_by(|a, b| b.time.cmp(&a.time));
        Ok(payments)
    }

    pub async fn decode(&self, wallet: &Wallet, bolt11: &str) -> Result<DecodedInvoice, WalletError> {
        let request = self
            .http
            .post(self.url("/api/v1/payments/decode"))
            .header(API_KEY_HEADER, &wallet.inkey)
            .json(&DecodeRequest { data: bolt11 });
        send_json(request).await
    }
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, WalletError> {
    let response = request.send().await?;
    let response = check_status(response).await?;
    Ok(response.json().await?)
}

async fn check_status(response: Response) -> Result<Response, WalletError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY)
        .collect();
    warn!("LNbits request failed ({}): {}", status, body);
    Err(WalletError::Api {
        status: status.as_u16(),
        body,
    })
}
