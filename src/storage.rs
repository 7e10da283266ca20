use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use std::path::Path;

// Define the database schema using CREATE TABLE IF NOT EXISTS statements
const MIGRATIONS_SQL: &str = "
-- Snapshot Table (Key-Value)
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
";

// The durable local store, consumed as a plain string key-value interface.
// The conversation store writes its whole state under a single fixed key;
// anything beyond get/set/delete is the engine's concern, not ours.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;

    /// Releases any underlying resources. Default is a no-op.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct StorageManager {
    pool: SqlitePool,
}

impl StorageManager {
    /// Creates a new StorageManager, connects to the database, and runs migrations.
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        log::info!("Connecting to database: {}", db_url);

        // Create the database file if it doesn't exist
        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            log::info!("Database file not found, creating...");
            Sqlite::create_database(&db_url)
                .await
                .context("Failed to create database")?;
        }

        // Connect to the database
        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        // Run migrations
        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies the database schema migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        log::info!("Running database migrations...");
        sqlx::query(MIGRATIONS_SQL)
            .execute(pool)
            .await
            .context("Failed to run database migrations")?;
        log::info!("Database migrations completed.");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KeyValueStore for StorageManager {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        log::debug!("Reading value for key: {}", key);
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read value from database")?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        log::debug!("Writing {} bytes for key: {}", value.len(), key);
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("Failed to write value to database")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        log::debug!("Deleting key: {}", key);
        let result = sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .context("Failed to delete value from database")?;

        if result.rows_affected() == 0 {
            log::debug!("Key {} was not present", key);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        log::info!("Closing database pool");
        self.pool.close().await;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(&dir.path().join("voicelog.sqlite"))
            .await
            .unwrap();

        assert_eq!(storage.get("state").await.unwrap(), None);

        storage.set("state", "{\"a\":1}").await.unwrap();
        assert_eq!(
            storage.get("state").await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );

        // Overwrite under the same key
        storage.set("state", "{\"a\":2}").await.unwrap();
        assert_eq!(
            storage.get("state").await.unwrap().as_deref(),
            Some("{\"a\":2}")
        );

        storage.delete("state").await.unwrap();
        assert_eq!(storage.get("state").await.unwrap(), None);

        // Deleting a missing key is not an error
        storage.delete("state").await.unwrap();

        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_sees_previous_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voicelog.sqlite");

        let storage = StorageManager::new(&path).await.unwrap();
        storage.set("k", "v").await.unwrap();
        storage.close().await.unwrap();

        let reopened = StorageManager::new(&path).await.unwrap();
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
