//! MongoDB connection.

use mongodb::bson::doc;
use mongodb::{options::ClientOptions, Client, Collection};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Database {
    db: mongodb::Database,
}

impl Database {
    /// Connect and ping so a bad URI fails at startup.
    pub async fn connect(uri: &str, db_name: &str) -> anyhow::Result<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("tipbot".to_string());
        let client = Client::with_options(options)?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        info!("Connected to MongoDB database {}", db_name);

        Ok(Self {
            db: client.database(db_name),
        })
    }

    /// Handle without the startup ping. The client connects on first use.
    #[cfg(test)]
    pub async fn lazy(uri: &str, db_name: &str) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            db: client.database(db_name),
        })
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }
}
