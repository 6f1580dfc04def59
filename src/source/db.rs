use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use sqlx::postgres::PgRow;

use super::types::{SourceConfig, SourceKind, SourceRow, SourceStatus};

pub async fn insert_source(
    pool: &PgPool,
    kind: SourceKind,
    url: &str,
    destination: &str,
    filter_text: Option<&str>,
) -> Result<i32> {
    let row = sqlx::query(
        r#"
        INSERT INTO adwatch.source (kind, url, destination, filter_text, status)
        VALUES ($1, $2, $3, $4, 'active')
        RETURNING source_id
        "#,
    )
    .bind(kind.as_str())
    .bind(url)
    .bind(destination)
    .bind(filter_text)
    .fetch_one(pool)
    .await?;
    Ok(row.try_get("source_id")?)
}

/// Active sources in registration order; the scheduler re-reads these every cycle.
pub async fn active_sources(pool: &PgPool) -> Result<Vec<SourceConfig>> {
    let rows = sqlx::query(
        r#"
        SELECT source_id, kind, url, destination, filter_text, status
        FROM adwatch.source
        WHERE status = 'active'
        ORDER BY source_id
        "#,
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(source_from_row).collect()
}

pub async fn list_sources(pool: &PgPool, include_deleted: bool) -> Result<Vec<SourceRow>> {
    let rows = sqlx::query(
        r#"
        SELECT s.source_id, s.kind, s.url, s.destination, s.filter_text, s.status, s.added_at,
               COUNT(d.identifier)::bigint AS delivered
        FROM adwatch.source s
        LEFT JOIN adwatch.delivered d ON d.source_id = s.source_id
        WHERE ($1 OR s.status = 'active')
        GROUP BY s.source_id
        ORDER BY s.source_id
        "#,
    )
    .bind(include_deleted)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for r in &rows {
        let added_at: DateTime<Utc> = r.try_get("added_at")?;
        let delivered: i64 = r.try_get("delivered")?;
        out.push(SourceRow { source: source_from_row(r)?, delivered, added_at });
    }
    Ok(out)
}

/// Soft delete. Cursor and delivered rows are kept so a re-activated source does not re-flood.
pub async fn mark_deleted(pool: &PgPool, source_id: i32) -> Result<bool> {
    let res = sqlx::query("UPDATE adwatch.source SET status = 'deleted' WHERE source_id = $1 AND status = 'active'")
        .bind(source_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() == 1)
}

fn source_from_row(r: &PgRow) -> Result<SourceConfig> {
    let kind: String = r.try_get("kind")?;
    let status: String = r.try_get("status")?;
    let source_id: i32 = r.try_get("source_id")?;
    Ok(SourceConfig {
        source_id,
        kind: SourceKind::parse(&kind).with_context(|| format!("source {source_id}"))?,
        url: r.try_get("url")?,
        destination: r.try_get("destination")?,
        filter_text: r.try_get("filter_text")?,
        status: SourceStatus::parse(&status).with_context(|| format!("source {source_id}"))?,
    })
}
