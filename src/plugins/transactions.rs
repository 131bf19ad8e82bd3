//! /transactions: paged wallet history.

use chrono::{TimeZone, Utc};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::debug;
use uuid::Uuid;

use crate::bot::interceptors::{answer_callback, lock, log_message, require_user, unlock};
use crate::bot::AppState;
use crate::cache::{CacheConfig, TypedCache};
use crate::errors::{BotError, BotResult};
use crate::intercept::{Endpoint, HandlerRegistry, LogFields, Pipeline, Step, UpdateContext};
use crate::lnbits::Payment;
use crate::utils::{html_escape, truncate};

pub const TX_PER_PAGE: usize = 20;
const MAX_MEMO: usize = 50;

/// History snapshot being paged through. Page 0 is the newest.
#[derive(Debug, Clone)]
pub struct TransactionList {
    pub id: String,
    pub payments: Vec<Payment>,
    pub page: usize,
}

impl TransactionList {
    pub fn new(payments: Vec<Payment>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            payments,
            page: 0,
        }
    }

    pub fn max_pages(&self) -> usize {
        self.payments.len().div_ceil(TX_PER_PAGE).max(1)
    }

    /// Move toward older entries. False on the last page.
    pub fn older(&mut self) -> bool {
        if self.page + 1 < self.max_pages() {
            self.page += 1;
            true
        } else {
            false
        }
    }

    /// Move toward newer entries. False on the first page.
    pub fn newer(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> &[Payment] {
        let start = (self.page * TX_PER_PAGE).min(self.payments.len());
        let end = (start + TX_PER_PAGE).min(self.payments.len());
        &self.payments[start..end]
    }

    pub fn render(&self, footer: &str) -> String {
        let mut out = String::new();
        for payment in self.current() {
            out.push_str(&render_payment(payment));
            out.push('\n');
        }
        out.push('\n');
        out.push_str(footer);
        out
    }
}

fn render_payment(p: &Payment) -> String {
    let mut line = String::from(if p.amount < 0 { "🔼" } else { "🔽" });
    if p.pending {
        line.push('🔄');
    }

    let time = Utc
        .timestamp_opt(p.time, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    line.push_str(&format!(" {}: {:+} sat", time, p.amount / 1000));

    if p.fee > 0 {
        line.push_str(&format!(" (fee: {} sat)", p.fee / 1000));
    }
    if let Some(memo) = p.memo.as_deref().filter(|m| !m.is_empty()) {
        line.push_str(&format!(" ✉️ {}", html_escape(&truncate(memo, MAX_MEMO))));
    }
    line
}

pub fn register(registry: &mut HandlerRegistry<UpdateContext>) {
    registry.register(
        &[Endpoint::command("transactions")],
        Pipeline::new(transactions_handler)
            .before(require_user)
            .before(log_message)
            .fields(LogFields::new("telegram", "transactionsHandler", "/transactions")),
    );
    registry.register(
        &[Endpoint::callback("tx_left")],
        Pipeline::new(older_handler)
            .before(lock)
            .before(require_user)
            .before(answer_callback)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "transactionsScrollLeftHandler", "tx_left")),
    );
    registry.register(
        &[Endpoint::callback("tx_right")],
        Pipeline::new(newer_handler)
            .before(lock)
            .before(require_user)
            .before(answer_callback)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "transactionsScrollRightHandler", "tx_right")),
    );
}

fn transaction_lists(state: &AppState) -> TypedCache<u64, TransactionList> {
    state.cache.get_or_create("transaction_lists", CacheConfig::session())
}

fn keyboard(list: &TransactionList) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("←", format!("tx_left:{}", list.id)),
        InlineKeyboardButton::callback("→", format!("tx_right:{}", list.id)),
    ]])
}

fn page_text(ctx: &UpdateContext, list: &TransactionList) -> String {
    let footer = ctx.t_with(
        "transactions.footer",
        &[
            ("total", &list.payments.len().to_string()),
            ("page", &(list.page + 1).to_string()),
            ("pages", &list.max_pages().to_string()),
        ],
    );
    list.render(&footer)
}

async fn transactions_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = transactions(&ctx).await;
    ctx.finish(result)
}

async fn transactions(ctx: &UpdateContext) -> BotResult<()> {
    let user = ctx.require_user()?;
    let wallet = user.wallet.as_ref().ok_or(BotError::NoWallet)?;

    let payments = ctx.state.lnbits.payments(wallet).await?;
    if payments.is_empty() {
        ctx.send_to_user(user.telegram_id, ctx.t("transactions.empty"))
            .await?;
        return Ok(());
    }

    let list = TransactionList::new(payments);
    ctx.send_html(
        teloxide::types::UserId(user.telegram_id),
        page_text(ctx, &list),
        Some(keyboard(&list)),
    )
    .await?;
    transaction_lists(&ctx.state).insert(user.telegram_id, list);
    Ok(())
}

async fn older_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = scroll(&ctx, TransactionList::older).await;
    ctx.finish(result)
}

async fn newer_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = scroll(&ctx, TransactionList::newer).await;
    ctx.finish(result)
}

async fn scroll(ctx: &UpdateContext, turn: fn(&mut TransactionList) -> bool) -> BotResult<()> {
    let user = ctx.require_user()?;
    let lists = transaction_lists(&ctx.state);

    let Some(mut list) = lists.get(&user.telegram_id) else {
        debug!("Transactions of {} not in cache anymore", user.telegram_id);
        return Ok(());
    };
    if ctx.callback_payload() != Some(list.id.as_str()) || !turn(&mut list) {
        return Ok(());
    }

    let message = ctx.message().ok_or(BotError::NoSender)?;
    ctx.edit_html(message.chat.id, message.id, page_text(ctx, &list), Some(keyboard(&list)))
        .await?;
    lists.insert(user.telegram_id, list);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(amount: i64, memo: &str) -> Payment {
        Payment {
            checking_id: String::new(),
            pending: false,
            amount,
            fee: 0,
            memo: Some(memo.to_string()),
            time: 1_640_000_000,
            bolt11: String::new(),
            payment_hash: String::new(),
        }
    }

    #[test]
    fn test_paging_bounds() {
        let mut list = TransactionList::new((0..45).map(|i| payment(i * 1000, "")).collect());
        assert_eq!(list.max_pages(), 3);
        assert_eq!(list.current().len(), 20);

        assert!(!list.newer());
        assert!(list.older());
        assert!(list.older());
        assert_eq!(list.current().len(), 5);
        assert!(!list.older());
        assert_eq!(list.page, 2);
    }

    #[test]
    fn test_single_page() {
        let list = TransactionList::new(vec![payment(1000, "")]);
        assert_eq!(list.max_pages(), 1);
    }

    #[test]
    fn test_render_payment() {
        let mut p = payment(-21_000, "<b>coffee</b>");
        p.fee = 2000;
        p.pending = true;
        let line = render_payment(&p);
        assert!(line.starts_with("🔼🔄 2021-12-20"));
        assert!(line.contains("-21 sat"));
        assert!(line.contains("(fee: 2 sat)"));
        assert!(line.contains("&lt;b&gt;coffee"));

        assert!(render_payment(&payment(5000, "")).contains("🔽"));
        assert!(render_payment(&payment(5000, "")).contains("+5 sat"));
    }

    #[test]
    fn test_long_memo_is_cut() {
        let line = render_payment(&payment(1000, &"m".repeat(80)));
        assert!(line.ends_with(&format!("{}...", "m".repeat(MAX_MEMO))));
    }
}
