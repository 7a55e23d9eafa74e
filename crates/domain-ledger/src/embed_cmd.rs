use anyhow::{bail, Result};

use domain_ledger_core::indexer::IndexReport;
use domain_ledger_core::store::AggregateStore;

use crate::app::{self, SqliteLedger};
use crate::config::Config;

/// Embed every active document and convention version that has no vector.
pub async fn run_embed_pending(config: &Config, limit: Option<usize>, dry_run: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let ledger = app::open(config).await?;

    if dry_run {
        let counts = pending_counts(&ledger, limit).await;
        app::close(ledger).await;
        let (documents, conventions) = counts?;
        println!("embed pending (dry-run)");
        println!("  documents needing embeddings: {}", documents);
        println!("  conventions needing embeddings: {}", conventions);
        return Ok(());
    }

    let report = ledger.reindex_pending(limit).await;
    app::close(ledger).await;
    let report = report?;

    if report.processed == 0 {
        println!("embed pending");
        println!("  all rows up to date");
        return Ok(());
    }

    println!("embed pending");
    print_report(&report);
    Ok(())
}

/// Rows a real run with `limit` would embed, per family. Documents are
/// taken first and the conventions get whatever is left of the limit.
async fn pending_counts(ledger: &SqliteLedger, limit: Option<usize>) -> Result<(usize, usize)> {
    let documents = ledger.document_store().find_unembedded(limit).await?.len();
    let remaining = limit.map(|l| l.saturating_sub(documents));
    let conventions = if remaining == Some(0) {
        0
    } else {
        ledger.convention_store().find_unembedded(remaining).await?.len()
    };
    Ok((documents, conventions))
}

/// Delete all vectors and regenerate them for every active version.
pub async fn run_embed_rebuild(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let ledger = app::open(config).await?;
    let report = ledger.rebuild_index().await;
    app::close(ledger).await;
    let report = report?;

    println!("embed rebuild");
    print_report(&report);
    Ok(())
}

fn print_report(report: &IndexReport) {
    println!("  total pending: {}", report.processed);
    println!("  embedded: {}", report.indexed);
    println!("  failed: {}", report.failed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_ledger_core::models::{ConventionDraft, DocumentDraft};

    fn document(domain: &str) -> DocumentDraft {
        DocumentDraft {
            project: "Ttutta".to_string(),
            service: "Auth".to_string(),
            domain: domain.to_string(),
            summary: format!("{} records", domain),
            properties: Vec::new(),
            policies: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    fn convention(title: &str) -> ConventionDraft {
        ConventionDraft {
            project: "Ttutta".to_string(),
            category: "NAMING".to_string(),
            title: title.to_string(),
            content: format!("{} rules", title),
            example_correct: None,
            example_incorrect: None,
        }
    }

    #[tokio::test]
    async fn test_pending_counts_share_one_limit() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config::minimal(tmp.path().join("ledger.sqlite"));
        let ledger = app::open(&config).await.unwrap();
        for domain in ["User", "Role"] {
            ledger.create_or_update_document(&document(domain)).await.unwrap();
        }
        for title in ["Variables", "Files"] {
            ledger.create_or_update_convention(&convention(title)).await.unwrap();
        }

        assert_eq!(pending_counts(&ledger, None).await.unwrap(), (2, 2));
        assert_eq!(pending_counts(&ledger, Some(3)).await.unwrap(), (2, 1));
        assert_eq!(pending_counts(&ledger, Some(2)).await.unwrap(), (2, 0));
        assert_eq!(pending_counts(&ledger, Some(1)).await.unwrap(), (1, 0));
        app::close(ledger).await;
    }
}
