use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database file and schema. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // One table holds both logical indexes; `index_name` separates them.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_records (
            index_name TEXT NOT NULL,
            id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            text TEXT NOT NULL,
            fields_json TEXT NOT NULL,
            embedding BLOB,
            PRIMARY KEY (index_name, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            email TEXT PRIMARY KEY,
            record TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='index_records_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE index_records_fts USING fts5(
                index_name UNINDEXED,
                id UNINDEXED,
                owner_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_records_owner ON index_records(index_name, owner_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
