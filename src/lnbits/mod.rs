//! LNbits wallet service client.

mod client;
mod models;

pub use client::LnbitsClient;
pub use models::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LNbits answered {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LNbits returned a user without a wallet")]
    MissingWallet,
}
