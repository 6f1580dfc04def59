use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{CursorStore, SourceRegistry};
use crate::diff::Cursor;
use crate::source::{db as source_db, types::SourceConfig};

/// Postgres-backed store over the `adwatch` schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl CursorStore for PgStore {
    async fn load(&self, source_id: i32) -> Result<Option<Cursor>> {
        let row = sqlx::query("SELECT recency_window FROM adwatch.cursor WHERE source_id = $1")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await
            .context("load cursor")?;
        match row {
            Some(r) => {
                let window: Vec<String> = r.try_get("recency_window")?;
                Ok(Some(Cursor::new(window)))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, source_id: i32, cursor: &Cursor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO adwatch.cursor (source_id, recency_window, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (source_id) DO UPDATE
              SET recency_window = EXCLUDED.recency_window,
                  updated_at     = now()
            "#,
        )
        .bind(source_id)
        .bind(cursor.window())
        .execute(&self.pool)
        .await
        .context("save cursor")?;
        Ok(())
    }

    async fn mark_delivered(&self, source_id: i32, identifier: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO adwatch.delivered (source_id, identifier)
            VALUES ($1, $2)
            ON CONFLICT (source_id, identifier) DO NOTHING
            "#,
        )
        .bind(source_id)
        .bind(identifier)
        .execute(&self.pool)
        .await
        .context("mark delivered")?;
        Ok(())
    }

    async fn is_delivered(&self, source_id: i32, identifier: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS hit FROM adwatch.delivered WHERE source_id = $1 AND identifier = $2")
            .bind(source_id)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .context("check delivered")?;
        Ok(row.is_some())
    }

    async fn has_any_delivered(&self, source_id: i32) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS hit FROM adwatch.delivered WHERE source_id = $1 LIMIT 1")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await
            .context("check any delivered")?;
        Ok(row.is_some())
    }

    async fn delivered_among(&self, source_id: i32, identifiers: &[String]) -> Result<HashSet<String>> {
        if identifiers.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(
            "SELECT identifier FROM adwatch.delivered WHERE source_id = $1 AND identifier = ANY($2)",
        )
        .bind(source_id)
        .bind(identifiers)
        .fetch_all(&self.pool)
        .await
        .context("select delivered subset")?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("identifier").map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl SourceRegistry for PgStore {
    async fn active_sources(&self) -> Result<Vec<SourceConfig>> {
        source_db::active_sources(&self.pool).await
    }
}
