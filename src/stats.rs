//! `lex stats`: what the store holds.
//!
//! Document count, database size, last update, and a per-category breakdown.

use anyhow::Result;
use serde::Serialize;

use lex_ingest_core::store::UpsertStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub db_bytes: u64,
    pub last_updated_ms: Option<i64>,
    pub categories: Vec<(String, i64)>,
}

pub async fn collect_stats(config: &Config) -> Result<StoreStats> {
    let store = SqliteStore::open(config).await?;

    let documents = store.count().await?;
    let categories = store.category_counts().await?;
    let last_updated_ms: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM documents")
        .fetch_one(store.pool())
        .await?;
    store.close().await;

    let db_bytes = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StoreStats {
        documents,
        db_bytes,
        last_updated_ms,
        categories,
    })
}

pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let stats = collect_stats(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("lex-ingest database stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(stats.db_bytes));
    println!("  Documents:   {}", stats.documents);
    println!(
        "  Last update: {}",
        stats
            .last_updated_ms
            .map(|ms| format_ts_relative(ms / 1000))
            .unwrap_or_else(|| "never".to_string())
    );

    if !stats.categories.is_empty() {
        println!();
        println!("  By category:");
        println!("  {:<36} {:>6}", "CATEGORY", "DOCS");
        println!("  {}", "-".repeat(43));
        for (category, n) in &stats.categories {
            println!("  {:<36} {:>6}", category, n);
        }
    }

    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Unix seconds as "3 hours ago", or a date once it is a month old.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        format!("{} min{} ago", delta / 60, plural(delta / 60))
    } else if delta < 86400 {
        format!("{} hour{} ago", delta / 3600, plural(delta / 3600))
    } else if delta < 86400 * 30 {
        format!("{} day{} ago", delta / 86400, plural(delta / 86400))
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
