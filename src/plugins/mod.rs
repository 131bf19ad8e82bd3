//! Chat commands.
//!
//! Every plugin exposes a `register` function that adds its pipelines to
//! the handler registry. Add new plugins by:
//! 1. Creating a new file in this directory
//! 2. Adding `pub mod your_plugin;` below
//! 3. Calling its `register` from [`register_all`]

pub mod balance;
pub mod help;
pub mod invoice;
pub mod node;
pub mod pay;
pub mod send;
pub mod start;
pub mod tip;
pub mod transactions;

use teloxide::utils::command::BotCommands;

use crate::bot::interceptors;
use crate::intercept::{HandlerRegistry, UpdateContext};

/// Commands shown in Telegram's command menu.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Create your wallet")]
    Start,
    #[command(description = "Read the help")]
    Help,
    #[command(description = "What is Bitcoin and Lightning")]
    Info,
    #[command(description = "Check your balance")]
    Balance,
    #[command(description = "Reply to a message to tip it")]
    Tip,
    #[command(description = "Send funds to a user")]
    Send,
    #[command(description = "Receive over Lightning")]
    Invoice,
    #[command(description = "Pay over Lightning")]
    Pay,
    #[command(description = "List your transactions")]
    Transactions,
    #[command(description = "Manage your own node")]
    Node,
}

/// Registry with every plugin's pipelines.
pub fn register_all() -> HandlerRegistry<UpdateContext> {
    let mut registry = HandlerRegistry::new().with_default_before(interceptors::localizer);

    start::register(&mut registry);
    help::register(&mut registry);
    balance::register(&mut registry);
    invoice::register(&mut registry);
    pay::register(&mut registry);
    tip::register(&mut registry);
    send::register(&mut registry);
    transactions::register(&mut registry);
    node::register(&mut registry);

    registry
}
