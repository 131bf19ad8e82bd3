//! LNbits request and response bodies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(super) struct CreateUserRequest<'a> {
    pub admin_id: &'a str,
    pub user_name: &'a str,
    pub wallet_name: &'a str,
}

/// Wallet as returned by the usermanager extension.
#[derive(Debug, Clone, Deserialize)]
pub struct UserWallet {
    pub id: String,
    pub name: String,
    pub adminkey: String,
    pub inkey: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LnbitsUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub wallets: Vec<UserWallet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletInfo {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    /// Balance in msat.
    pub balance: i64,
}

impl WalletInfo {
    pub fn balance_sat(&self) -> i64 {
        self.balance / 1000
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceParams {
    pub out: bool,
    /// Amount in sat.
    pub amount: i64,
    pub memo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedInvoice {
    pub payment_hash: String,
    pub payment_request: String,
}

#[derive(Debug, Serialize)]
pub(super) struct PayParams<'a> {
    pub out: bool,
    pub bolt11: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaidInvoice {
    pub payment_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub paid: bool,
    #[serde(default)]
    pub preimage: Option<String>,
}

/// One entry of the wallet's payment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub checking_id: String,
    pub pending: bool,
    /// msat; negative for outgoing.
    pub amount: i64,
    /// msat.
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub memo: Option<String>,
    /// Unix seconds.
    pub time: i64,
    #[serde(default)]
    pub bolt11: String,
    #[serde(default)]
    pub payment_hash: String,
}

#[derive(Debug, Serialize)]
pub(super) struct DecodeRequest<'a> {
    pub data: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedInvoice {
    pub payment_hash: String,
    pub amount_msat: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub expiry: Option<i64>,
}

impl DecodedInvoice {
    pub fn amount_sat(&self) -> i64 {
        self.amount_msat / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_list_parses_lnbits_shape() {
        let body = r#"[{
            "checking_id": "c1", "pending": false, "amount": -21000, "fee": -1000,
            "memo": "coffee", "time": 1700000000, "bolt11": "lnbc1", "payment_hash": "h1",
            "extra": {}, "wallet_id": "w1"
        }]"#;
        let payments: Vec<Payment> = serde_json::from_str(body).unwrap();
        assert_eq!(payments[0].amount, -21000);
        assert_eq!(payments[0].memo.as_deref(), Some("coffee"));
    }
}
