//! `ledger doc ...`: read, write and analyze domain documents.
//!
//! # Usage
//!
//! ```bash
//! ledger doc put --file user.json
//! ledger doc get ecommerce user-service User
//! ledger doc get ecommerce user-service User --version 1
//! ledger doc history ecommerce user-service User
//! ledger doc list ecommerce
//! ledger doc impact ecommerce user-service User
//! ledger doc delete ecommerce user-service User
//! ```
//!
//! `put` reads a JSON [`DocumentDraft`]; every other command addresses a
//! document by its logical key.

use std::path::Path;

use anyhow::{bail, Context, Result};

use domain_ledger_core::models::{DocumentDraft, DocumentKey, DomainDocument};

use crate::app;
use crate::config::Config;

/// Parse a draft from a JSON file.
pub fn read_draft(path: &Path) -> Result<DocumentDraft> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read draft file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid document draft: {}", path.display()))
}

pub async fn run_put(config: &Config, file: &Path, json: bool) -> Result<()> {
    let draft = read_draft(file)?;
    let ledger = app::open(config).await?;
    let saved = ledger.create_or_update_document(&draft).await;
    app::close(ledger).await;
    let saved = saved?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!(
            "saved {} v{} ({})",
            saved.key(),
            saved.version,
            saved.identifier
        );
    }
    Ok(())
}

pub async fn run_get(
    config: &Config,
    key: &DocumentKey,
    version: Option<i64>,
    json: bool,
) -> Result<()> {
    let ledger = app::open(config).await?;
    let doc = ledger.read_spec(key, version).await;
    app::close(ledger).await;

    let doc = match doc? {
        Some(doc) => doc,
        None => match version {
            Some(v) => bail!("document not found: {} v{}", key, v),
            None => bail!("document not found: {}", key),
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print_document(&doc);
    }
    Ok(())
}

pub async fn run_history(config: &Config, key: &DocumentKey, json: bool) -> Result<()> {
    let ledger = app::open(config).await?;
    let versions = ledger.document_history(key).await;
    app::close(ledger).await;
    let versions = versions?;

    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }

    if versions.is_empty() {
        println!("No versions of {}.", key);
        return Ok(());
    }
    for doc in &versions {
        println!(
            "v{}  {}  {}",
            doc.version,
            doc.created_at.format("%Y-%m-%d %H:%M:%S"),
            doc.identifier
        );
    }
    Ok(())
}

pub async fn run_list(config: &Config, project: &str, json: bool) -> Result<()> {
    let ledger = app::open(config).await?;
    let docs = ledger.latest_documents(project).await;
    app::close(ledger).await;
    let docs = docs?;

    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }

    if docs.is_empty() {
        println!("No documents in project {}.", project);
        return Ok(());
    }
    for doc in &docs {
        println!("{} (v{})  {}", doc.key(), doc.version, doc.summary);
    }
    Ok(())
}

pub async fn run_delete(config: &Config, key: &DocumentKey) -> Result<()> {
    let ledger = app::open(config).await?;
    let deleted = ledger.soft_delete_document(key).await;
    app::close(ledger).await;
    let deleted = deleted?;

    if deleted == 0 {
        println!("{}: nothing to delete", key);
    } else {
        println!("soft-deleted {} version(s) of {}", deleted, key);
    }
    Ok(())
}

pub async fn run_impact(config: &Config, key: &DocumentKey, json: bool) -> Result<()> {
    let ledger = app::open(config).await?;
    let report = ledger.analyze_impact(key).await;
    app::close(ledger).await;
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.describe());
    }
    Ok(())
}

fn print_document(doc: &DomainDocument) {
    println!("--- Domain Document ---");
    println!("key:          {}", doc.key());
    println!("version:      {}", doc.version);
    println!("id:           {}", doc.identifier);
    println!("created_at:   {}", doc.created_at);
    println!("summary:      {}", doc.summary);
    println!();

    if !doc.properties.is_empty() {
        println!("--- Properties ({}) ---", doc.properties.len());
        for p in &doc.properties {
            let mut flags = Vec::new();
            if p.is_required {
                flags.push("required");
            }
            if p.is_immutable {
                flags.push("immutable");
            }
            println!("{}: {} [{}] {}", p.name, p.data_type, flags.join(", "), p.description);
        }
        println!();
    }

    if !doc.policies.is_empty() {
        println!("--- Policies ({}) ---", doc.policies.len());
        for p in &doc.policies {
            match &p.subject {
                Some(subject) => println!("{} ({}): {}", p.category, subject, p.content),
                None => println!("{}: {}", p.category, p.content),
            }
        }
        println!();
    }

    if !doc.dependencies.is_empty() {
        println!("--- Dependencies ({}) ---", doc.dependencies.len());
        for d in &doc.dependencies {
            println!("{} [{}]: {}", d.target, d.relation_type, d.description);
        }
        println!();
    }
}
