//! User profile store.
//!
//! Profiles are opaque JSON objects keyed by email. The pipeline never
//! reads them; they are stored alongside the indexes so the CLI and HTTP
//! surfaces can keep a user's record next to their ingested documents.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntry {
    pub email: String,
    pub record: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ProfileStore {
    pool: SqlitePool,
}

impl ProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the profile for `email`.
    pub async fn put(&self, email: &str, record: &Value) -> Result<ProfileEntry> {
        let email = normalize_email(email)?;
        if !record.is_object() {
            bail!("profile record must be a JSON object");
        }
        let updated_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO profiles (email, record, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                record = excluded.record,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&email)
        .bind(serde_json::to_string(record)?)
        .bind(updated_at.timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save profile {}", email))?;

        tracing::info!(email = %email, "profile saved");
        Ok(ProfileEntry {
            email,
            record: record.clone(),
            updated_at,
        })
    }

    pub async fn get(&self, email: &str) -> Result<Option<ProfileEntry>> {
        let email = normalize_email(email)?;
        let row = sqlx::query("SELECT email, record, updated_at FROM profiles WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| entry_from_row(&r)).transpose()
    }

    /// Returns `true` if a profile was removed.
    pub async fn delete(&self, email: &str) -> Result<bool> {
        let email = normalize_email(email)?;
        let result = sqlx::query("DELETE FROM profiles WHERE email = ?")
            .bind(&email)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&self) -> Result<Vec<ProfileEntry>> {
        let rows = sqlx::query("SELECT email, record, updated_at FROM profiles ORDER BY email")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProfileEntry> {
    let email: String = row.get("email");
    let record: String = row.get("record");
    let ts: i64 = row.get("updated_at");
    Ok(ProfileEntry {
        record: serde_json::from_str(&record)
            .with_context(|| format!("Corrupt profile record for {}", email))?,
        updated_at: DateTime::from_timestamp(ts, 0).unwrap_or_default(),
        email,
    })
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        bail!("email is required");
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use serde_json::json;

    async fn store(tmp: &tempfile::TempDir) -> ProfileStore {
        let mut config = Config::default();
        config.db.path = tmp.path().join("prag.sqlite");
        let pool = db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        ProfileStore::new(pool)
    }

    #[tokio::test]
    async fn test_put_get_replace() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(&tmp).await;

        store.put("Ana@Example.com", &json!({"name": "Ana"})).await.unwrap();
        store
            .put("ana@example.com", &json!({"name": "Ana", "title": "Engineer"}))
            .await
            .unwrap();

        let entry = store.get("ana@example.com").await.unwrap().unwrap();
        assert_eq!(entry.record["title"], "Engineer");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_missing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(&tmp).await;

        assert!(store.get("nobody@example.com").await.unwrap().is_none());
        store.put("a@x.io", &json!({})).await.unwrap();
        assert!(store.delete("a@x.io").await.unwrap());
        assert!(!store.delete("a@x.io").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_non_object_and_blank_email() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(&tmp).await;
        assert!(store.put("a@x.io", &json!([1, 2])).await.is_err());
        assert!(store.put("  ", &json!({})).await.is_err());
    }
}
