//! `ledger search`: similarity search over documents and conventions.
//!
//! Limits default to the `[search]` config section; `--top-k` and
//! `--threshold` override them per invocation.
//!
//! # Usage
//!
//! ```bash
//! ledger search "user authentication policy"
//! ledger search "order lifecycle" --top-k 3 --threshold 0.2 --json
//! ```

use anyhow::{bail, Result};

use domain_ledger_core::models::AggregateKind;
use domain_ledger_core::search::{DocumentMatch, SearchResult};

use crate::app;
use crate::config::Config;

/// Run a search with config defaults for anything not overridden.
pub async fn search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    threshold: Option<f64>,
) -> Result<SearchResult> {
    if !config.embedding.is_enabled() {
        bail!("Search requires an embedding provider. Set [embedding] provider in config.");
    }

    let ledger = app::open(config).await?;
    let result = ledger
        .semantic_search(
            query,
            top_k.unwrap_or(config.search.top_k),
            threshold.unwrap_or(config.search.similarity_threshold),
        )
        .await;
    app::close(ledger).await;
    Ok(result?)
}

pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    threshold: Option<f64>,
    json: bool,
) -> Result<()> {
    let result = search(config, query, top_k, threshold).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.matches.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, m) in result.matches.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} {}",
            i + 1,
            m.similarity,
            m.document_type,
            match_label(m)
        );
        if let Some(text) = match_excerpt(m) {
            println!("    {}", text);
        }
        println!("    id: {}", m.document_id);
        println!();
    }

    Ok(())
}

/// `project/service/domain` or `project/category/title` of a hit.
fn match_label(m: &DocumentMatch) -> String {
    let fields: &[&str] = match m.document_type {
        AggregateKind::DomainDocument => &["project", "service", "domain"],
        AggregateKind::ProjectConvention => &["project", "category", "title"],
    };
    let parts: Vec<&str> = fields
        .iter()
        .map(|f| m.content.get(*f).and_then(|v| v.as_str()).unwrap_or("?"))
        .collect();
    let version = m.content.get("version").and_then(|v| v.as_i64()).unwrap_or(0);
    format!("{} (v{})", parts.join("/"), version)
}

fn match_excerpt(m: &DocumentMatch) -> Option<&str> {
    let field = match m.document_type {
        AggregateKind::DomainDocument => "summary",
        AggregateKind::ProjectConvention => "content",
    };
    m.content.get(field).and_then(|v| v.as_str())
}
