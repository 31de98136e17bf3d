
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

const SELECT_COLUMNS: &str =
    "SELECT id, source, fingerprint, chunk_count, char_count, ingested_at FROM ingested_documents";

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn get_by_source(pool: &SqlitePool, source: &str) -> Result<Option<IngestedDocument>> {
        let result = sqlx::query_as::<_, IngestedDocument>(&format!(
            "{} WHERE source = ?",
            SELECT_COLUMNS
        ))
        .bind(source)
        .fetch_optional(pool)
        .await
        .context("Failed to get ingested document by source")?;

        Ok(result)
    }

    /// Insert the document, or replace the row already recorded for its source
    #[inline]
    pub async fn upsert(
        pool: &SqlitePool,
        document: NewIngestedDocument,
    ) -> Result<IngestedDocument> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO ingested_documents (source, fingerprint, chunk_count, char_count, ingested_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(source) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                chunk_count = excluded.chunk_count,
                char_count = excluded.char_count,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&document.source)
        .bind(&document.fingerprint)
        .bind(document.chunk_count)
        .bind(document.char_count)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to record ingested document")?;

        debug!("Recorded manifest entry for {}", document.source);

        Self::get_by_source(pool, &document.source)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve recorded document"))
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<IngestedDocument>> {
        let documents =
            sqlx::query_as::<_, IngestedDocument>(&format!("{} ORDER BY source", SELECT_COLUMNS))
                .fetch_all(pool)
                .await
                .context("Failed to list ingested documents")?;

        Ok(documents)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingested_documents")
            .fetch_one(pool)
            .await
            .context("Failed to count ingested documents")?;

        Ok(count)
    }

    /// Remove every manifest entry; returns how many were removed
    #[inline]
    pub async fn clear(pool: &SqlitePool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM ingested_documents")
            .execute(pool)
            .await
            .context("Failed to clear ingested documents")?;

        Ok(result.rows_affected())
    }
}
