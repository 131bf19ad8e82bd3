//! Wallet user repository, cache first.
//!
//! Two indexes live in moka: by Telegram id and lowercase username ->
//! id. Lookups by wallet key (REST API) always hit MongoDB and ignore case.

use mongodb::bson::{doc, Document};
use mongodb::options::{Collation, CollationStrength, ReplaceOptions};
use mongodb::Collection;
use tracing::debug;

use super::models::WalletUser;
use super::Database;
use crate::cache::{CacheConfig, CacheRegistry, TypedCache};

#[derive(Clone)]
pub struct UserRepo {
    collection: Collection<WalletUser>,
    cache_by_id: TypedCache<u64, WalletUser>,
    cache_by_username: TypedCache<String, u64>,
}

impl UserRepo {
    pub fn new(db: &Database, cache: &CacheRegistry) -> Self {
        Self {
            collection: db.collection("users"),
            cache_by_id: cache.get_or_create("users_by_id", CacheConfig::users()),
            cache_by_username: cache.get_or_create("users_by_username", CacheConfig::users()),
        }
    }

    pub async fn get(&self, telegram_id: u64) -> mongodb::error::Result<Option<WalletUser>> {
        if let Some(user) = self.cache_by_id.get(&telegram_id) {
            return Ok(Some(user));
        }

        let user = self
            .collection
            .find_one(doc! { "telegram_id": telegram_id as i64 })
            .await?;
        if let Some(user) = &user {
            self.remember(user);
        }
        Ok(user)
    }

    /// Case-insensitive, with or without the leading `@`.
    pub async fn get_by_username(&self, username: &str) -> mongodb::error::Result<Option<WalletUser>> {
        let username = username.trim_start_matches('@').to_lowercase();

        if let Some(id) = self.cache_by_username.get(&username) {
            return self.get(id).await;
        }

        let user = self.collection.find_one(doc! { "username": &username }).await?;
        if let Some(user) = &user {
            self.remember(user);
        }
        Ok(user)
    }

    /// User owning `key` as admin or invoice key, case-insensitively.
    pub async fn get_by_wallet_key(&self, key: &str) -> mongodb::error::Result<Option<WalletUser>> {
        self.collection
            .find_one(wallet_key_filter(key))
            .collation(case_insensitive())
            .await
    }

    /// Insert or replace the record and refresh both caches.
    pub async fn save(&self, user: &WalletUser) -> mongodb::error::Result<()> {
        if let Some(previous) = self.cache_by_id.get(&user.telegram_id)
            && let Some(old) = &previous.username
            && previous.username != user.username
        {
            self.cache_by_username.invalidate(old);
        }

        self.collection
            .replace_one(doc! { "telegram_id": user.telegram_id as i64 }, user)
            .with_options(ReplaceOptions::builder().upsert(true).build())
            .await?;
        self.remember(user);

        debug!("Saved user {} (@{:?})", user.telegram_id, user.username);
        Ok(())
    }

    fn remember(&self, user: &WalletUser) {
        self.cache_by_id.insert(user.telegram_id, user.clone());
        if let Some(username) = &user.username {
            self.cache_by_username.insert(username.clone(), user.telegram_id);
        }
    }
}

fn wallet_key_filter(key: &str) -> Document {
    doc! {
        "$or": [
            { "wallet.adminkey": key },
            { "wallet.inkey": key },
        ]
    }
}

/// Strength 2 compares base letters and accents but not case.
fn case_insensitive() -> Collation {
    Collation::builder()
        .locale("en")
        .strength(CollationStrength::Secondary)
        .build()
}
