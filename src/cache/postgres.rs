use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::info;
use tokio_postgres::NoTls;

use crate::config::CacheSettings;

/// PostgreSQL-backed key-value cache with connection pooling.
///
/// Keys are plain strings, values are serialized record blobs. Uses
/// `deadpool-postgres` for connection management.
#[derive(Clone)]
pub struct PostgresCache {
    pub pool: Pool,
}

impl PostgresCache {
    pub async fn new(settings: &CacheSettings) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL cache");

        let mut retries = 0;
        let max_retries = 3;
        #[allow(unused_assignments)]
        let mut last_error: Option<anyhow::Error> = None;

        loop {
            let mut pg_config = tokio_postgres::Config::new();
            pg_config
                .host(&settings.host)
                .port(settings.port)
                .user(&settings.user)
                .password(&settings.password)
                .dbname(&settings.database);

            let mgr_config = ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            };

            let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
            let pool = Pool::builder(mgr)
                .max_size(settings.pool_size)
                .build()
                .context("Failed to create PostgreSQL connection pool")?;

            // Test the connection
            match pool.get().await {
                Ok(_conn) => {
                    info!("Successfully connected to PostgreSQL cache");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("{}", e));
                    retries += 1;

                    if retries >= max_retries {
                        break;
                    }

                    let delay = std::time::Duration::from_millis(100 * 2_u64.pow(retries));
                    log::warn!(
                        "Failed to connect to PostgreSQL (attempt {}/{}), retrying in {:?}...",
                        retries,
                        max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(anyhow::anyhow!(
            "Failed to connect to PostgreSQL after {} attempts: {}",
            max_retries,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        ))
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Running cache schema migration");
        let client = self.pool.get().await?;

        let schema = tokio::fs::read_to_string("schema/postgres.sql")
            .await
            .context("Failed to read schema/postgres.sql")?;

        client
            .batch_execute(&schema)
            .await
            .context("Failed to apply cache schema")?;

        info!("Cache schema applied successfully");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT value FROM casewatch.cache WHERE key = $1", &[&key])
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    pub async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO casewatch.cache (key, value, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (key) DO UPDATE SET
                    value = EXCLUDED.value,
                    updated_at = EXCLUDED.updated_at
                "#,
                &[&key, &value],
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute("DELETE FROM casewatch.cache WHERE key = $1", &[&key])
            .await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM casewatch.cache WHERE key = $1)",
                &[&key],
            )
            .await?;
        Ok(row.get(0))
    }

    /// Moves `from` to `to`, replacing any existing value at `to`.
    pub async fn rename(&self, from: &str, to: &str) -> anyhow::Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.execute("DELETE FROM casewatch.cache WHERE key = $1", &[&to])
            .await?;
        tx.execute(
            "UPDATE casewatch.cache SET key = $2 WHERE key = $1",
            &[&from, &to],
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// All keys starting with the given prefix, sorted.
    pub async fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let client = self.pool.get().await?;
        let pattern = format!("{prefix}%");
        let rows = client
            .query(
                "SELECT key FROM casewatch.cache WHERE key LIKE $1 ORDER BY key",
                &[&pattern],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get("key")).collect())
    }
}
