//! Composition root: config in, fully wired [`SqliteLedger`] out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use domain_ledger_core::versioning::{jittered_backoff_ms, RetryPause};
use domain_ledger_core::{Ledger, LedgerOptions};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::migrate;
use crate::sqlite_store::{SqliteConventionStore, SqliteDocumentStore};

pub type SqliteLedger = Ledger<SqliteDocumentStore, SqliteConventionStore>;

/// Sleeps on the tokio timer between conflicting writes.
pub struct TokioRetryPause {
    base_ms: u64,
}

impl TokioRetryPause {
    pub fn new(base_ms: u64) -> Self {
        Self { base_ms }
    }

    fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(jittered_backoff_ms(self.base_ms, attempt))
    }
}

#[async_trait]
impl RetryPause for TokioRetryPause {
    async fn pause(&self, attempt: u32) {
        tokio::time::sleep(self.delay(attempt)).await;
    }
}

/// Connect, ensure the schema exists, build the configured provider and
/// assemble the ledger around both SQLite stores.
pub async fn open(config: &Config) -> Result<SqliteLedger> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let provider = embedding::create_provider(&config.embedding)?;
    if provider.is_none() {
        tracing::debug!("embedding provider disabled; writes will not be indexed");
    }

    let documents = Arc::new(SqliteDocumentStore::new(pool.clone()));
    let conventions = Arc::new(SqliteConventionStore::new(pool));

    Ok(Ledger::new(
        documents,
        conventions,
        provider,
        ledger_options(config),
    ))
}

fn ledger_options(config: &Config) -> LedgerOptions {
    let backoff_ms = config.versioning.retry_backoff_ms;
    let retry_pause: Option<Arc<dyn RetryPause>> =
        (backoff_ms > 0).then(|| Arc::new(TokioRetryPause::new(backoff_ms)) as Arc<dyn RetryPause>);
    LedgerOptions {
        max_write_attempts: config.versioning.max_write_attempts,
        retry_pause,
    }
}

/// Close the pool shared by both stores.
pub async fn close(ledger: SqliteLedger) {
    ledger.document_store().pool().close().await;
}
