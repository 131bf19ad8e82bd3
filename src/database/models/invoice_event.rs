//! Invoice events: what to do once an invoice gets paid.

use serde::{Deserialize, Serialize};

/// A Lightning invoice created on a user's wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub payment_hash: String,
    pub payment_request: String,
    /// Amount in sat.
    pub amount: i64,
    pub memo: String,
}

/// Handler that runs when the invoice settles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "func", rename_all = "snake_case")]
pub enum InvoiceCallback {
    /// Tell the user the money arrived.
    Generic,
    /// Forward the amount to the user's own node.
    NodeRelay,
}

/// Discriminant of [`InvoiceCallback`], used as dispatcher key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Generic,
    NodeRelay,
}

impl InvoiceCallback {
    pub fn kind(&self) -> CallbackKind {
        match self {
            InvoiceCallback::Generic => CallbackKind::Generic,
            InvoiceCallback::NodeRelay => CallbackKind::NodeRelay,
        }
    }
}

impl std::fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackKind::Generic => f.write_str("generic"),
            CallbackKind::NodeRelay => f.write_str("node_relay"),
        }
    }
}

/// Stored when an invoice is created, consumed when it settles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceEvent {
    /// `invoice:<payment_hash>`
    #[serde(rename = "_id")]
    pub key: String,
    pub invoice: Invoice,
    /// Telegram id of the user the invoice was created for.
    pub user_id: u64,
    /// Chat the invoice was posted in and the message showing it.
    pub chat_id: i64,
    pub message_id: Option<i32>,
    pub language_code: String,
    pub callback: InvoiceCallback,
    pub created_at: i64,
}

impl InvoiceEvent {
    pub fn new(invoice: Invoice, user_id: u64, chat_id: i64, callback: InvoiceCallback) -> Self {
        Self {
            key: Self::key_for(&invoice.payment_hash),
            invoice,
            user_id,
            chat_id,
            message_id: None,
            language_code: "en".to_string(),
            callback,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Attach the chat message that shows the invoice.
    #[must_use]
    pub fn with_message(mut self, message_id: Option<i32>) -> Self {
        self.message_id = message_id;
        self
    }

    /// Storage key for an invoice hash.
    pub fn key_for(payment_hash: &str) -> String {
        format!("invoice:{}", payment_hash)
    }

    pub fn kind(&self) -> CallbackKind {
        self.callback.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_serializes_with_func_tag() {
        let json = serde_json::to_value(InvoiceCallback::NodeRelay).unwrap();
        assert_eq!(json, serde_json::json!({ "func": "node_relay" }));

        let back: InvoiceCallback = serde_json::from_value(serde_json::json!({ "func": "generic" })).unwrap();
        assert_eq!(back.kind(), CallbackKind::Generic);
    }

    #[test]
    fn test_event_key_uses_hash() {
        let invoice = Invoice {
            payment_hash: "ab12".into(),
            payment_request: "lnbc1".into(),
            amount: 21,
            memo: String::new(),
        };
        let event = InvoiceEvent::new(invoice, 5, 5, InvoiceCallback::Generic);
        assert_eq!(event.key, "invoice:ab12");
        assert_eq!(event.message_id, None);
    }

    #[test]
    fn test_message_survives_storage_round() {
        let invoice = Invoice {
            payment_hash: "cd34".into(),
            payment_request: "lnbc2".into(),
            amount: 50,
            memo: "beer".into(),
        };
        let event = InvoiceEvent::new(invoice, 9, 9, InvoiceCallback::NodeRelay).with_message(Some(311));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["message_id"], 311);
        let back: InvoiceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.message_id, Some(311));
        assert_eq!(back.chat_id, 9);
    }
}
