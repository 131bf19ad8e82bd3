//! Wallet operations shared by chat handlers, invoice callbacks and the
//! REST API.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bot::AppState;
use crate::database::{
    Invoice, InvoiceCallback, InvoiceEvent, Transaction, TransactionType, WalletUser,
};
use crate::errors::{BotError, BotResult};
use crate::runtime::LockKey;
use crate::utils::user_str;

/// Current balance in sat. Refreshes the balance cache.
pub async fn refresh_balance(state: &AppState, user: &WalletUser) -> BotResult<i64> {
    let wallet = user.wallet.as_ref().ok_or(BotError::NoWallet)?;
    let info = state.lnbits.wallet_info(wallet).await?;
    let balance = info.balance_sat();

    state.balances.insert(user.telegram_id, balance);
    debug!("Balance of {} is {} sat", user_str(user), balance);
    Ok(balance)
}

/// Create an LNbits user and wallet for `user` and store the record.
///
/// Users that already have a wallet are returned as they are. Creation runs
/// under the user's wallet lock and re-reads the stored record first, so
/// two concurrent callers (a tip and the user's own `/start`) end up with
/// the same wallet.
pub async fn create_wallet(state: &AppState, user: WalletUser) -> BotResult<WalletUser> {
    if user.has_wallet() {
        return Ok(user);
    }

    let telegram_id = user.telegram_id;
    let load = move || async move {
        let stored = state.users.get(telegram_id).await?;
        Ok::<_, BotError>(stored.filter(WalletUser::has_wallet))
    };
    let create = move || async move {
        let mut user = user;
        let (lnbits_user, wallet) = state
            .lnbits
            .create_user_with_wallet(&telegram_id.to_string())
            .await?;
        user.lnbits_id = Some(lnbits_user.id);
        user.wallet = Some(wallet);
        state.users.save(&user).await?;

        info!("Created wallet for {}", user_str(&user));
        Ok::<_, BotError>(user)
    };

    state
        .locks
        .get_or_create(LockKey::wallet(telegram_id), load, create)
        .await
}

/// Where an invoice was asked for and how to answer there.
#[derive(Debug, Clone)]
pub struct EventOrigin<'a> {
    pub chat_id: i64,
    /// Message that shows the invoice. The settlement notice replies to it.
    pub message_id: Option<i32>,
    pub language_code: &'a str,
}

/// Invoice on `user`'s wallet, stored as an [`InvoiceEvent`] so the
/// settlement webhook knows what to do with it.
pub async fn create_invoice_with_event(
    state: &AppState,
    user: &WalletUser,
    amount: i64,
    memo: &str,
    callback: InvoiceCallback,
    origin: EventOrigin<'_>,
) -> BotResult<InvoiceEvent> {
    let wallet = user.wallet.as_ref().ok_or(BotError::NoWallet)?;
    let created = state.lnbits.create_invoice(wallet, amount, memo).await?;

    let invoice = Invoice {
        payment_hash: created.payment_hash,
        payment_request: created.payment_request,
        amount,
        memo: memo.to_string(),
    };
    let mut event = InvoiceEvent::new(invoice, user.telegram_id, origin.chat_id, callback)
        .with_message(origin.message_id);
    event.language_code = origin.language_code.to_string();
    state.invoice_events.put(&event).await?;

    debug!(
        "Created {} sat invoice {} for {} ({})",
        amount,
        event.invoice.payment_hash,
        user_str(user),
        event.kind()
    );
    Ok(event)
}

/// Record of one internal transfer.
pub struct Transfer<'a> {
    pub from: &'a WalletUser,
    pub to: &'a WalletUser,
    pub amount: i64,
    pub memo: String,
    pub kind: TransactionType,
    pub chat_id: i64,
    pub chat_name: Option<String>,
}

impl Transfer<'_> {
    /// Move `amount` sat: invoice on the receiver, paid by the sender.
    ///
    /// The attempt is logged in `transactions` whether it worked or not.
    pub async fn send(self, state: &AppState) -> BotResult<Transaction> {
        let mut tx = Transaction {
            id: Uuid::new_v4().to_string(),
            time: chrono::Utc::now().timestamp(),
            kind: self.kind,
            from_id: self.from.telegram_id,
            to_id: self.to.telegram_id,
            from_user: user_str(self.from),
            to_user: user_str(self.to),
            from_wallet: self.from.wallet.as_ref().map(|w| w.id.clone()).unwrap_or_default(),
            to_wallet: self.to.wallet.as_ref().map(|w| w.id.clone()).unwrap_or_default(),
            amount: self.amount,
            chat_id: self.chat_id,
            chat_name: self.chat_name.clone(),
            memo: self.memo.clone(),
            success: false,
            invoice: None,
        };

        let result = self.execute(state, &mut tx).await;
        tx.success = result.is_ok();

        if let Err(e) = state.transactions.save(&tx).await {
            warn!("Could not log transaction {}: {}", tx.id, e);
        }

        result.map(|()| tx)
    }

    async fn execute(&self, state: &AppState, tx: &mut Transaction) -> BotResult<()> {
        let from_wallet = self.from.wallet.as_ref().ok_or(BotError::NoWallet)?;
        let to_wallet = self.to.wallet.as_ref().ok_or(BotError::NoWallet)?;

        let balance = refresh_balance(state, self.from).await?;
        if balance < self.amount {
            warn!(
                "Balance of {} too low: {} < {}",
                tx.from_user, balance, self.amount
            );
            return Err(BotError::InsufficientBalance);
        }

        let invoice = state
            .lnbits
            .create_invoice(to_wallet, self.amount, &self.memo)
            .await?;
        tx.invoice = Some(Invoice {
            payment_hash: invoice.payment_hash.clone(),
            payment_request: invoice.payment_request.clone(),
            amount: self.amount,
            memo: self.memo.clone(),
        });

        state.lnbits.pay(from_wallet, &invoice.payment_request).await?;

        refresh_balance(state, self.from).await?;
        refresh_balance(state, self.to).await?;
        Ok(())
    }
}
