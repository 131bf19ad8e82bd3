//! Tip and send records.

use mongodb::Collection;
use tracing::debug;

use super::models::Transaction;
use super::Database;

#[derive(Clone)]
pub struct TransactionRepo {
    collection: Collection<Transaction>,
}

impl TransactionRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("transactions"),
        }
    }

    pub async fn save(&self, tx: &Transaction) -> mongodb::error::Result<()> {
        self.collection.insert_one(tx).await?;
        debug!(
            "Logged {:?} {} -> {} ({} sat, success={})",
            tx.kind, tx.from_id, tx.to_id, tx.amount, tx.success
        );
        Ok(())
    }
}
