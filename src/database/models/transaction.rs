//! Internal transfer record (tips and sends).

use serde::{Deserialize, Serialize};

use super::Invoice;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Tip,
    Send,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub time: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub from_id: u64,
    pub to_id: u64,
    /// Display strings at the time of the transfer.
    pub from_user: String,
    pub to_user: String,
    pub from_wallet: String,
    pub to_wallet: String,
    pub amount: i64,
    pub chat_id: i64,
    pub chat_name: Option<String>,
    pub memo: String,
    pub success: bool,
    pub invoice: Option<Invoice>,
}
