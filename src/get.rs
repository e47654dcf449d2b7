//! `lex get <title>`: print one stored record as JSON.

use anyhow::{bail, Result};

use lex_ingest_core::models::DocumentRecord;
use lex_ingest_core::store::UpsertStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn get_document(config: &Config, title: &str) -> Result<DocumentRecord> {
    let store = SqliteStore::open(config).await?;
    let record = store.get_by_title(title).await?;
    store.close().await;

    match record {
        Some(r) => Ok(r),
        None => bail!("document not found: {}", title),
    }
}

pub async fn run_get(config: &Config, title: &str) -> Result<()> {
    let record = get_document(config, title).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
